//! Matching one mapping pattern against the rolling input window.
//!
//! The window is the Stage's record of recent key activity: presses that are
//! still held (`Down` while undecided, `DownMatched` once they produced
//! output), releases that arrived while a pattern was still being assembled,
//! and elapsed-timeout markers reported back by the event loop.
//!
//! A pattern is matched from the start of the window. Entries that are
//! already resolved (`DownMatched`) may either satisfy a pattern element for
//! the same key — this is how a held modifier participates in several
//! matches — or be skipped. Undecided entries must be consumed strictly in
//! order; the first mismatch fails the pattern.

use std::time::Duration;

use smallvec::SmallVec;

use crate::domain::key::{Key, KeyEvent, KeyState};

/// Result of matching one pattern against the window.
#[derive(Debug)]
pub(crate) enum MatchResult {
    /// Every pattern element was satisfied.
    Match(MatchDetails),
    /// The window is a prefix of the pattern: more input (or, when `awaits`
    /// is set, a period of no input) could complete it.
    Partial { awaits: Option<Duration> },
    NoMatch,
}

#[derive(Debug)]
pub(crate) struct MatchDetails {
    /// Window indices the match consumes, ascending: undecided presses and
    /// releases plus any timeout markers passed over on the way.
    pub consumed: SmallVec<[usize; 8]>,
    /// Number of pattern elements paired with a window entry. A match
    /// reusing a held modifier pairs more elements than one that skips it,
    /// which makes it the more specific match.
    pub weight: usize,
    /// The key whose press completed the match; output held by the mapping
    /// is released when this key is released.
    pub trigger: Key,
}

/// Returns whether `key`'s most recent window entry is a press.
pub(crate) fn key_is_down(window: &[KeyEvent], key: Key) -> bool {
    window
        .iter()
        .rev()
        .find(|entry| entry.key == key)
        .map_or(false, |entry| {
            matches!(entry.state, KeyState::Down | KeyState::DownMatched)
        })
}

pub(crate) fn match_pattern(pattern: &[KeyEvent], window: &[KeyEvent]) -> MatchResult {
    let mut wi = 0;
    let mut consumed: SmallVec<[usize; 8]> = SmallVec::new();
    let mut matched_keys: SmallVec<[Key; 8]> = SmallVec::new();
    let mut weight = 0;
    let mut trigger = Key::None;

    for element in pattern {
        if element.key.is_timeout_key() {
            // The element succeeds only if at least `element.timeout` of
            // silence was observed at this point of the window.
            loop {
                let Some(entry) = window.get(wi) else {
                    return MatchResult::Partial {
                        awaits: Some(element.timeout),
                    };
                };
                if entry.state == KeyState::DownMatched {
                    wi += 1;
                    continue;
                }
                if entry.key.is_timeout_key() {
                    if entry.timeout >= element.timeout {
                        consumed.push(wi);
                        weight += 1;
                        wi += 1;
                        break;
                    }
                    return MatchResult::NoMatch;
                }
                // input arrived before the required silence
                return MatchResult::NoMatch;
            }
            continue;
        }

        match element.state {
            KeyState::Not => {
                if key_is_down(window, element.key) {
                    return MatchResult::NoMatch;
                }
            }
            KeyState::Down => loop {
                let Some(entry) = window.get(wi) else {
                    return MatchResult::Partial { awaits: None };
                };
                if entry.key.is_timeout_key() {
                    // a timer expired mid-pattern; irrelevant to this element
                    consumed.push(wi);
                    wi += 1;
                    continue;
                }
                match entry.state {
                    KeyState::DownMatched => {
                        if entry.key == element.key {
                            matched_keys.push(entry.key);
                            trigger = entry.key;
                            weight += 1;
                            wi += 1;
                            break;
                        }
                        // skip a held key that already produced output
                        wi += 1;
                    }
                    KeyState::Down => {
                        if entry.key == element.key {
                            consumed.push(wi);
                            matched_keys.push(entry.key);
                            trigger = entry.key;
                            weight += 1;
                            wi += 1;
                            break;
                        }
                        return MatchResult::NoMatch;
                    }
                    KeyState::Up => return MatchResult::NoMatch,
                    KeyState::Not => return MatchResult::NoMatch,
                }
            },
            KeyState::Up => loop {
                let Some(entry) = window.get(wi) else {
                    return MatchResult::Partial { awaits: None };
                };
                if entry.key.is_timeout_key() {
                    consumed.push(wi);
                    wi += 1;
                    continue;
                }
                match entry.state {
                    KeyState::DownMatched => {
                        wi += 1;
                    }
                    KeyState::Up => {
                        if entry.key == element.key && matched_keys.contains(&entry.key) {
                            consumed.push(wi);
                            weight += 1;
                            wi += 1;
                            break;
                        }
                        return MatchResult::NoMatch;
                    }
                    KeyState::Down | KeyState::Not => return MatchResult::NoMatch,
                }
            },
            // patterns contain Down, Up and Not elements only
            KeyState::DownMatched => return MatchResult::NoMatch,
        }
    }

    MatchResult::Match(MatchDetails {
        consumed,
        weight,
        trigger,
    })
}
