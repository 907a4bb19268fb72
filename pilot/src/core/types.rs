//! Closed vocabularies shared by every pipeline component.
//!
//! Domains, verbs, intents and action classes are reviewed, closed sets. They
//! are enums so the rule table and resolver policy tables get exhaustiveness
//! checking, and so backend output is rejected at the deserialization boundary
//! when it names something outside the vocabulary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What kind of thing a goal operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Files,
    Browser,
    System,
    Clipboard,
    Screen,
    Apps,
}

impl Domain {
    pub const ALL: [Domain; 6] = [
        Domain::Files,
        Domain::Browser,
        Domain::System,
        Domain::Clipboard,
        Domain::Screen,
        Domain::Apps,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Files => "files",
            Domain::Browser => "browser",
            Domain::System => "system",
            Domain::Clipboard => "clipboard",
            Domain::Screen => "screen",
            Domain::Apps => "apps",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Domain::ALL
            .into_iter()
            .find(|domain| domain.as_str() == s)
            .ok_or_else(|| format!("unknown domain '{s}'"))
    }
}

/// Operation requested on a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Create,
    Open,
    Delete,
    List,
    Navigate,
    Search,
    Set,
    Get,
    Capture,
    Copy,
    Launch,
    Close,
}

impl Verb {
    pub const ALL: [Verb; 12] = [
        Verb::Create,
        Verb::Open,
        Verb::Delete,
        Verb::List,
        Verb::Navigate,
        Verb::Search,
        Verb::Set,
        Verb::Get,
        Verb::Capture,
        Verb::Copy,
        Verb::Launch,
        Verb::Close,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Create => "create",
            Verb::Open => "open",
            Verb::Delete => "delete",
            Verb::List => "list",
            Verb::Navigate => "navigate",
            Verb::Search => "search",
            Verb::Set => "set",
            Verb::Get => "get",
            Verb::Capture => "capture",
            Verb::Copy => "copy",
            Verb::Launch => "launch",
            Verb::Close => "close",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Verb::ALL
            .into_iter()
            .find(|verb| verb.as_str() == s)
            .ok_or_else(|| format!("unknown verb '{s}'"))
    }
}

/// Effect class of a planned action. Used as a hard filter during tool resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionClass {
    /// Changes world state.
    Actuate,
    /// Reads world state without changing it.
    Observe,
    /// Answers a question from already-available data.
    Query,
}

impl ActionClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionClass::Actuate => "actuate",
            ActionClass::Observe => "observe",
            ActionClass::Query => "query",
        }
    }
}

impl fmt::Display for ActionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concrete step intent the tool resolver dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    FileCreate,
    FileOpen,
    FileDelete,
    FileList,
    BrowserNavigate,
    BrowserSearch,
    SystemSet,
    SystemGet,
    ClipboardCopy,
    ClipboardRead,
    ScreenCapture,
    AppLaunch,
    AppClose,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::FileCreate => "file_create",
            Intent::FileOpen => "file_open",
            Intent::FileDelete => "file_delete",
            Intent::FileList => "file_list",
            Intent::BrowserNavigate => "browser_navigate",
            Intent::BrowserSearch => "browser_search",
            Intent::SystemSet => "system_set",
            Intent::SystemGet => "system_get",
            Intent::ClipboardCopy => "clipboard_copy",
            Intent::ClipboardRead => "clipboard_read",
            Intent::ScreenCapture => "screen_capture",
            Intent::AppLaunch => "app_launch",
            Intent::AppClose => "app_close",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_and_verb_parse_their_own_names() {
        for domain in Domain::ALL {
            assert_eq!(domain.as_str().parse::<Domain>(), Ok(domain));
        }
        for verb in Verb::ALL {
            assert_eq!(verb.as_str().parse::<Verb>(), Ok(verb));
        }
        assert!("desktop".parse::<Domain>().is_err());
    }

    #[test]
    fn serde_names_match_display() {
        let json = serde_json::to_string(&Intent::BrowserNavigate).expect("serialize");
        assert_eq!(json, "\"browser_navigate\"");
        let class: ActionClass = serde_json::from_str("\"observe\"").expect("deserialize");
        assert_eq!(class, ActionClass::Observe);
    }
}
