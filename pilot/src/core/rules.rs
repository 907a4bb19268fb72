//! Static planning rule table keyed by capability.
//!
//! A capability is a plannable `(domain, verb)` pair. `Capability::rule` is an
//! exhaustive match, so adding a capability without a rule fails to compile.

use serde::Serialize;

use crate::core::types::{ActionClass, Domain, Intent, Verb};

/// Reserved goal param value asking the semantic-default authority for a value.
pub const USE_DEFAULT_TOKEN: &str = "@default";

/// Default location token resolved by the executor to the user's home.
pub const HOME_LOCATION: &str = "HOME";

/// Param filled from an upstream context frame when not given explicitly.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ContextSource {
    pub param: &'static str,
    pub domain: Domain,
    pub key: &'static str,
}

/// Template for one planned action.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StepTemplate {
    pub intent: Intent,
    pub action_class: ActionClass,
    /// Description with `{param}` placeholders.
    pub description: &'static str,
    /// Resolved params copied into the action's args.
    pub args: &'static [&'static str],
}

/// Context frame emitted by the final step for dependent goals.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Production {
    pub domain: Domain,
    /// Frame key to `{param}` template.
    pub data: &'static [(&'static str, &'static str)],
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Rule {
    /// Param filled by the goal's declared object when not given explicitly.
    pub object_param: Option<&'static str>,
    pub required: &'static [&'static str],
    pub defaults: &'static [(&'static str, &'static str)],
    pub allowed: &'static [(&'static str, &'static [&'static str])],
    /// Param filled by the goal's own scope anchor.
    pub anchor_param: Option<&'static str>,
    /// Context consumption; earlier entries for the same param win.
    pub consumes: &'static [ContextSource],
    pub steps: &'static [StepTemplate],
    pub produces: Option<Production>,
}

impl Rule {
    pub fn default_for(&self, param: &str) -> Option<&'static str> {
        self.defaults
            .iter()
            .find(|(key, _)| *key == param)
            .map(|(_, value)| *value)
    }

    pub fn allowed_for(&self, param: &str) -> Option<&'static [&'static str]> {
        self.allowed
            .iter()
            .find(|(key, _)| *key == param)
            .map(|(_, values)| *values)
    }

    /// Every param this rule can fill, in a stable order.
    pub fn known_params(&self) -> Vec<&'static str> {
        let mut params: Vec<&'static str> = Vec::new();
        let candidates = self
            .object_param
            .into_iter()
            .chain(self.required.iter().copied())
            .chain(self.defaults.iter().map(|(key, _)| *key))
            .chain(self.anchor_param)
            .chain(self.consumes.iter().map(|source| source.param));
        for param in candidates {
            if !params.contains(&param) {
                params.push(param);
            }
        }
        params
    }
}

/// Plannable `(domain, verb)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    FilesCreate,
    FilesOpen,
    FilesDelete,
    FilesList,
    BrowserNavigate,
    BrowserSearch,
    SystemSet,
    SystemGet,
    ClipboardCopy,
    ClipboardGet,
    ScreenCapture,
    AppsLaunch,
    AppsClose,
}

impl Capability {
    pub const ALL: [Capability; 13] = [
        Capability::FilesCreate,
        Capability::FilesOpen,
        Capability::FilesDelete,
        Capability::FilesList,
        Capability::BrowserNavigate,
        Capability::BrowserSearch,
        Capability::SystemSet,
        Capability::SystemGet,
        Capability::ClipboardCopy,
        Capability::ClipboardGet,
        Capability::ScreenCapture,
        Capability::AppsLaunch,
        Capability::AppsClose,
    ];

    /// Map a goal's pair onto the table. `None` means the pair is not plannable.
    pub fn from_pair(domain: Domain, verb: Verb) -> Option<Self> {
        let capability = match (domain, verb) {
            (Domain::Files, Verb::Create) => Capability::FilesCreate,
            (Domain::Files, Verb::Open) => Capability::FilesOpen,
            (Domain::Files, Verb::Delete) => Capability::FilesDelete,
            (Domain::Files, Verb::List) => Capability::FilesList,
            (Domain::Browser, Verb::Navigate | Verb::Open) => Capability::BrowserNavigate,
            (Domain::Browser, Verb::Search) => Capability::BrowserSearch,
            (Domain::System, Verb::Set) => Capability::SystemSet,
            (Domain::System, Verb::Get) => Capability::SystemGet,
            (Domain::Clipboard, Verb::Copy) => Capability::ClipboardCopy,
            (Domain::Clipboard, Verb::Get) => Capability::ClipboardGet,
            (Domain::Screen, Verb::Capture) => Capability::ScreenCapture,
            (Domain::Apps, Verb::Launch | Verb::Open) => Capability::AppsLaunch,
            (Domain::Apps, Verb::Close) => Capability::AppsClose,
            _ => return None,
        };
        Some(capability)
    }

    pub fn domain(&self) -> Domain {
        match self {
            Capability::FilesCreate
            | Capability::FilesOpen
            | Capability::FilesDelete
            | Capability::FilesList => Domain::Files,
            Capability::BrowserNavigate | Capability::BrowserSearch => Domain::Browser,
            Capability::SystemSet | Capability::SystemGet => Domain::System,
            Capability::ClipboardCopy | Capability::ClipboardGet => Domain::Clipboard,
            Capability::ScreenCapture => Domain::Screen,
            Capability::AppsLaunch | Capability::AppsClose => Domain::Apps,
        }
    }

    pub fn rule(&self) -> &'static Rule {
        match self {
            Capability::FilesCreate => &FILES_CREATE,
            Capability::FilesOpen => &FILES_OPEN,
            Capability::FilesDelete => &FILES_DELETE,
            Capability::FilesList => &FILES_LIST,
            Capability::BrowserNavigate => &BROWSER_NAVIGATE,
            Capability::BrowserSearch => &BROWSER_SEARCH,
            Capability::SystemSet => &SYSTEM_SET,
            Capability::SystemGet => &SYSTEM_GET,
            Capability::ClipboardCopy => &CLIPBOARD_COPY,
            Capability::ClipboardGet => &CLIPBOARD_GET,
            Capability::ScreenCapture => &SCREEN_CAPTURE,
            Capability::AppsLaunch => &APPS_LAUNCH,
            Capability::AppsClose => &APPS_CLOSE,
        }
    }
}

static FILES_CREATE: Rule = Rule {
    object_param: Some("name"),
    required: &["name"],
    defaults: &[("kind", "folder"), ("location", HOME_LOCATION)],
    allowed: &[("kind", &["folder", "file"])],
    anchor_param: Some("location"),
    consumes: &[ContextSource {
        param: "location",
        domain: Domain::Files,
        key: "path",
    }],
    steps: &[StepTemplate {
        intent: Intent::FileCreate,
        action_class: ActionClass::Actuate,
        description: "Create {kind} '{name}' in {location}",
        args: &["kind", "name", "location"],
    }],
    produces: Some(Production {
        domain: Domain::Files,
        data: &[("path", "{location}/{name}"), ("kind", "{kind}")],
    }),
};

static FILES_OPEN: Rule = Rule {
    object_param: Some("path"),
    required: &["path"],
    defaults: &[],
    allowed: &[],
    anchor_param: None,
    consumes: &[ContextSource {
        param: "path",
        domain: Domain::Files,
        key: "path",
    }],
    steps: &[StepTemplate {
        intent: Intent::FileOpen,
        action_class: ActionClass::Actuate,
        description: "Open {path}",
        args: &["path"],
    }],
    produces: None,
};

static FILES_DELETE: Rule = Rule {
    object_param: Some("path"),
    required: &["path"],
    defaults: &[],
    allowed: &[],
    anchor_param: None,
    consumes: &[ContextSource {
        param: "path",
        domain: Domain::Files,
        key: "path",
    }],
    steps: &[StepTemplate {
        intent: Intent::FileDelete,
        action_class: ActionClass::Actuate,
        description: "Delete {path}",
        args: &["path"],
    }],
    produces: None,
};

static FILES_LIST: Rule = Rule {
    object_param: Some("location"),
    required: &[],
    defaults: &[("location", HOME_LOCATION)],
    allowed: &[],
    anchor_param: Some("location"),
    consumes: &[ContextSource {
        param: "location",
        domain: Domain::Files,
        key: "path",
    }],
    steps: &[StepTemplate {
        intent: Intent::FileList,
        action_class: ActionClass::Observe,
        description: "List the contents of {location}",
        args: &["location"],
    }],
    produces: None,
};

static BROWSER_NAVIGATE: Rule = Rule {
    object_param: Some("url"),
    required: &["url"],
    defaults: &[],
    allowed: &[],
    anchor_param: None,
    consumes: &[ContextSource {
        param: "url",
        domain: Domain::Browser,
        key: "url",
    }],
    steps: &[StepTemplate {
        intent: Intent::BrowserNavigate,
        action_class: ActionClass::Actuate,
        description: "Navigate the browser to {url}",
        args: &["url"],
    }],
    produces: Some(Production {
        domain: Domain::Browser,
        data: &[("url", "{url}")],
    }),
};

static BROWSER_SEARCH: Rule = Rule {
    object_param: Some("query"),
    required: &["query"],
    defaults: &[("engine", "google")],
    allowed: &[("engine", &["google", "bing", "duckduckgo"])],
    anchor_param: None,
    consumes: &[],
    steps: &[
        StepTemplate {
            intent: Intent::BrowserNavigate,
            action_class: ActionClass::Actuate,
            description: "Open the {engine} search page",
            args: &["engine"],
        },
        StepTemplate {
            intent: Intent::BrowserSearch,
            action_class: ActionClass::Actuate,
            description: "Search {engine} for '{query}'",
            args: &["engine", "query"],
        },
    ],
    produces: Some(Production {
        domain: Domain::Browser,
        data: &[("engine", "{engine}"), ("query", "{query}")],
    }),
};

static SYSTEM_SET: Rule = Rule {
    object_param: Some("setting"),
    required: &["setting", "value"],
    defaults: &[],
    allowed: &[("setting", &["volume", "brightness"])],
    anchor_param: None,
    consumes: &[],
    steps: &[StepTemplate {
        intent: Intent::SystemSet,
        action_class: ActionClass::Actuate,
        description: "Set {setting} to {value}",
        args: &["setting", "value"],
    }],
    produces: None,
};

static SYSTEM_GET: Rule = Rule {
    object_param: Some("setting"),
    required: &["setting"],
    defaults: &[],
    allowed: &[("setting", &["volume", "brightness", "battery"])],
    anchor_param: None,
    consumes: &[],
    steps: &[StepTemplate {
        intent: Intent::SystemGet,
        action_class: ActionClass::Observe,
        description: "Read the current {setting}",
        args: &["setting"],
    }],
    produces: None,
};

static CLIPBOARD_COPY: Rule = Rule {
    object_param: Some("content"),
    required: &["content"],
    defaults: &[],
    allowed: &[],
    anchor_param: None,
    consumes: &[
        ContextSource {
            param: "content",
            domain: Domain::Screen,
            key: "path",
        },
        ContextSource {
            param: "content",
            domain: Domain::Files,
            key: "path",
        },
        ContextSource {
            param: "content",
            domain: Domain::Browser,
            key: "url",
        },
    ],
    steps: &[StepTemplate {
        intent: Intent::ClipboardCopy,
        action_class: ActionClass::Actuate,
        description: "Copy {content} to the clipboard",
        args: &["content"],
    }],
    produces: Some(Production {
        domain: Domain::Clipboard,
        data: &[("content", "{content}")],
    }),
};

static CLIPBOARD_GET: Rule = Rule {
    object_param: None,
    required: &[],
    defaults: &[],
    allowed: &[],
    anchor_param: None,
    consumes: &[],
    steps: &[StepTemplate {
        intent: Intent::ClipboardRead,
        action_class: ActionClass::Query,
        description: "Read the clipboard",
        args: &[],
    }],
    produces: None,
};

static SCREEN_CAPTURE: Rule = Rule {
    object_param: Some("region"),
    required: &[],
    defaults: &[("region", "full")],
    allowed: &[("region", &["full", "window"])],
    anchor_param: None,
    consumes: &[],
    steps: &[StepTemplate {
        intent: Intent::ScreenCapture,
        action_class: ActionClass::Observe,
        description: "Capture a {region} screenshot",
        args: &["region"],
    }],
    produces: Some(Production {
        domain: Domain::Screen,
        data: &[("path", "screenshot_{region}.png")],
    }),
};

static APPS_LAUNCH: Rule = Rule {
    object_param: Some("app"),
    required: &["app"],
    defaults: &[],
    allowed: &[],
    anchor_param: None,
    consumes: &[],
    steps: &[StepTemplate {
        intent: Intent::AppLaunch,
        action_class: ActionClass::Actuate,
        description: "Launch {app}",
        args: &["app"],
    }],
    produces: Some(Production {
        domain: Domain::Apps,
        data: &[("app", "{app}")],
    }),
};

static APPS_CLOSE: Rule = Rule {
    object_param: Some("app"),
    required: &["app"],
    defaults: &[],
    allowed: &[],
    anchor_param: None,
    consumes: &[ContextSource {
        param: "app",
        domain: Domain::Apps,
        key: "app",
    }],
    steps: &[StepTemplate {
        intent: Intent::AppClose,
        action_class: ActionClass::Actuate,
        description: "Close {app}",
        args: &["app"],
    }],
    produces: None,
};

#[cfg(test)]
mod tests {
    use super::*;

    fn placeholders(template: &str) -> Vec<&str> {
        template
            .split('{')
            .skip(1)
            .filter_map(|part| part.split_once('}').map(|(name, _)| name))
            .collect()
    }

    #[test]
    fn every_capability_has_steps_in_its_domain() {
        for capability in Capability::ALL {
            let rule = capability.rule();
            assert!(!rule.steps.is_empty(), "{capability:?} has no steps");
            if let Some(production) = rule.produces {
                assert_eq!(production.domain, capability.domain(), "{capability:?}");
            }
        }
    }

    #[test]
    fn templates_only_reference_fillable_params() {
        for capability in Capability::ALL {
            let rule = capability.rule();
            let known = rule.known_params();
            for step in rule.steps {
                for name in placeholders(step.description) {
                    assert!(known.contains(&name), "{capability:?}: {name}");
                }
                for arg in step.args {
                    assert!(known.contains(arg), "{capability:?}: arg {arg}");
                }
            }
            for (_, template) in rule.produces.iter().flat_map(|p| p.data.iter()) {
                for name in placeholders(template) {
                    assert!(known.contains(&name), "{capability:?}: {name}");
                }
            }
        }
    }

    #[test]
    fn static_defaults_are_allowed_values() {
        for capability in Capability::ALL {
            let rule = capability.rule();
            for (param, value) in rule.defaults {
                if let Some(allowed) = rule.allowed_for(param) {
                    assert!(allowed.contains(value), "{capability:?}: {param}={value}");
                }
            }
        }
    }

    #[test]
    fn pairs_map_to_capabilities_of_the_same_domain() {
        for domain in Domain::ALL {
            for verb in Verb::ALL {
                if let Some(capability) = Capability::from_pair(domain, verb) {
                    assert_eq!(capability.domain(), domain);
                }
            }
        }
        assert_eq!(Capability::from_pair(Domain::Screen, Verb::Delete), None);
    }
}
