//! The compiled mapping configuration.
//!
//! The configuration client parses the textual mapping language, compiles it
//! into this form and ships it over the control socket as an opaque blob (see
//! [`crate::protocol::codec`]). The daemon treats a decoded configuration as
//! well-formed: unknown key names, cyclic macros and similar mistakes are
//! rejected client-side before the blob is ever produced.
//!
//! A configuration is an ordered list of [`Context`]s. Order is significant:
//! when several contexts are active at once, a later context overrides an
//! earlier one for the same input. Which contexts are active is decided by
//! the client (it tracks the focused application) and updated through a
//! single `ActiveContexts` message.

use serde::{Deserialize, Serialize};

use crate::domain::key::KeySequence;

/// Predicate over grabbed device display names.
///
/// `Pattern` uses glob syntax with `*` (any run of characters) and `?` (any
/// single character); `Literal` requires an exact name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceFilter {
    Any,
    Literal(String),
    Pattern(String),
}

impl DeviceFilter {
    /// Evaluates the filter against a device display name.
    pub fn matches(&self, device_name: &str) -> bool {
        match self {
            DeviceFilter::Any => true,
            DeviceFilter::Literal(name) => name == device_name,
            DeviceFilter::Pattern(pattern) => glob_match(pattern, device_name),
        }
    }
}

/// Backtracking glob match; patterns are short enough that the quadratic
/// worst case is irrelevant.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let (mut star, mut star_ti) = (None, 0);
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            star_ti = ti;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            star_ti += 1;
            ti = star_ti;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

/// A named output sequence that mappings can reference indirectly, so that
/// contexts can override what the name produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub name: String,
    /// Output used when no active context overrides the command.
    pub output: KeySequence,
}

/// What firing a mapping produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MappingTarget {
    /// A literal output sequence.
    Keys(KeySequence),
    /// A command, resolved against the active contexts when the mapping
    /// fires.
    Command(u16),
    /// Request a graceful daemon exit instead of producing output.
    Exit,
}

/// One input pattern and its replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    /// The pattern matched against the rolling input window. Elements are
    /// key events whose state is `Down`, `Up` or `Not`, plus `AwaitInput`
    /// timeout markers.
    pub input: KeySequence,
    pub target: MappingTarget,
}

/// A conditional group of mappings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    pub device_filter: DeviceFilter,
    pub mappings: Vec<Mapping>,
    /// Replacement outputs for commands while this context is active, as
    /// `(command index, output)` pairs.
    pub command_overrides: Vec<(u16, KeySequence)>,
}

/// A complete compiled configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledConfig {
    pub commands: Vec<Command>,
    pub contexts: Vec<Context>,
}

impl CompiledConfig {
    /// Returns `true` when any mapping input involves a mouse button or
    /// wheel pseudo-key, in which case pointer devices must be grabbed too.
    pub fn has_mouse_mappings(&self) -> bool {
        self.contexts.iter().any(|context| {
            context
                .mappings
                .iter()
                .any(|mapping| mapping.input.iter().any(|ev| ev.key.is_pointer_key()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::codes;
    use crate::domain::key::{Key, KeyEvent};
    use smallvec::smallvec;

    fn single_mapping_config(input: KeySequence) -> CompiledConfig {
        CompiledConfig {
            commands: Vec::new(),
            contexts: vec![Context {
                device_filter: DeviceFilter::Any,
                mappings: vec![Mapping {
                    input,
                    target: MappingTarget::Keys(KeySequence::new()),
                }],
                command_overrides: Vec::new(),
            }],
        }
    }

    #[test]
    fn literal_filter_is_exact() {
        let filter = DeviceFilter::Literal("AT Translated Set 2 keyboard".into());
        assert!(filter.matches("AT Translated Set 2 keyboard"));
        assert!(!filter.matches("AT Translated Set 2 keyboar"));
    }

    #[test]
    fn pattern_filter_supports_globs() {
        let filter = DeviceFilter::Pattern("*Logitech*".into());
        assert!(filter.matches("Logitech G Pro"));
        assert!(filter.matches("USB Logitech Mouse"));
        assert!(!filter.matches("Apple Keyboard"));

        let filter = DeviceFilter::Pattern("usb-??".into());
        assert!(filter.matches("usb-01"));
        assert!(!filter.matches("usb-1"));
    }

    #[test]
    fn mouse_mapping_detection() {
        let plain = single_mapping_config(smallvec![KeyEvent::down(Key::Code(codes::KEY_A))]);
        assert!(!plain.has_mouse_mappings());

        let button = single_mapping_config(smallvec![KeyEvent::down(Key::Code(codes::BTN_SIDE))]);
        assert!(button.has_mouse_mappings());

        let wheel = single_mapping_config(smallvec![KeyEvent::down(Key::Code(codes::WHEEL_UP))]);
        assert!(wheel.has_mouse_mappings());
    }
}
