//! Static domain policy for tool resolution.
//!
//! Tool names are `prefix.name` (e.g. `files.create_folder`). Each intent
//! declares the prefixes searched first, the prefixes a fallback search may
//! widen to, and the prefixes it may never touch.

use serde::Serialize;

use crate::core::types::Intent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IntentPolicy {
    /// Stage-1 search space.
    pub preferred: &'static [&'static str],
    /// Stage-2 search space. Empty means no fallback for this intent.
    pub fallback_whitelist: &'static [&'static str],
    /// Never offered, whatever the whitelist says.
    pub blacklist: &'static [&'static str],
}

pub fn policy_for(intent: Intent) -> IntentPolicy {
    match intent {
        Intent::FileCreate | Intent::FileDelete => IntentPolicy {
            preferred: &["files"],
            fallback_whitelist: &["files"],
            blacklist: &["input", "browser"],
        },
        Intent::FileOpen => IntentPolicy {
            preferred: &["files"],
            fallback_whitelist: &["files", "apps"],
            blacklist: &["input"],
        },
        Intent::FileList => IntentPolicy {
            preferred: &["files"],
            fallback_whitelist: &["files"],
            blacklist: &["input"],
        },
        Intent::BrowserNavigate | Intent::BrowserSearch => IntentPolicy {
            preferred: &["browser"],
            fallback_whitelist: &["browser", "apps"],
            blacklist: &["input", "shell"],
        },
        Intent::SystemSet => IntentPolicy {
            preferred: &["system", "audio", "display"],
            fallback_whitelist: &[],
            blacklist: &["input"],
        },
        Intent::SystemGet => IntentPolicy {
            preferred: &["system"],
            fallback_whitelist: &["system", "shell"],
            blacklist: &["input"],
        },
        Intent::ClipboardCopy => IntentPolicy {
            preferred: &["clipboard"],
            fallback_whitelist: &["clipboard", "input"],
            blacklist: &[],
        },
        Intent::ClipboardRead => IntentPolicy {
            preferred: &["clipboard"],
            fallback_whitelist: &["clipboard"],
            blacklist: &["input"],
        },
        Intent::ScreenCapture => IntentPolicy {
            preferred: &["screen"],
            fallback_whitelist: &["screen", "apps"],
            blacklist: &["input"],
        },
        Intent::AppLaunch => IntentPolicy {
            preferred: &["apps"],
            fallback_whitelist: &["apps", "shell"],
            blacklist: &["input", "browser"],
        },
        Intent::AppClose => IntentPolicy {
            preferred: &["apps"],
            fallback_whitelist: &["apps", "system"],
            blacklist: &["input"],
        },
    }
}

/// Domain prefix of a tool name (`files` for `files.create_folder`).
pub fn tool_prefix(name: &str) -> &str {
    name.split_once('.').map_or(name, |(prefix, _)| prefix)
}

pub fn has_prefix(name: &str, prefixes: &[&str]) -> bool {
    let prefix = tool_prefix(name);
    prefixes.iter().any(|candidate| *candidate == prefix)
}
