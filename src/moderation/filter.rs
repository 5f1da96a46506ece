use rand::Rng;
use regex::{Regex, RegexBuilder};
use std::sync::OnceLock;
use tracing::debug;

/// Which rule rejected a name. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    Pattern,
    Substring,
    Link,
    Repetition,
}

/// Outcome of moderating one normalised name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModerationDecision {
    pub allowed: bool,
    /// Set only when the name was disallowed and the replace policy is on.
    pub replacement_name: Option<String>,
}

/// Static rule set applied to normalised names.
#[derive(Debug, Clone)]
pub struct ModerationFilter {
    substrings: Vec<String>,
    pattern: Option<Regex>,
    replace_on_violation: bool,
}

/// Runs of this many identical characters are treated as spam.
const MAX_REPEAT_RUN: usize = 4;

fn link_pattern() -> &'static Regex {
    static LINK: OnceLock<Regex> = OnceLock::new();
    LINK.get_or_init(|| {
        Regex::new(r"https?://|www\.|\.(com|net|org|io)\b").expect("static link pattern")
    })
}

impl ModerationFilter {
    /// `pattern` is compiled case-insensitively.
    pub fn new(
        substrings: Vec<String>,
        pattern: Option<&str>,
        replace_on_violation: bool,
    ) -> Result<Self, regex::Error> {
        let pattern = pattern
            .map(|p| RegexBuilder::new(p).case_insensitive(true).build())
            .transpose()?;
        Ok(ModerationFilter {
            substrings: substrings
                .into_iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            pattern,
            replace_on_violation,
        })
    }

    /// First rule that `normalized` violates, checked in priority order.
    pub fn violation(&self, normalized: &str) -> Option<Violation> {
        if self.pattern.as_ref().is_some_and(|re| re.is_match(normalized)) {
            return Some(Violation::Pattern);
        }
        if self.substrings.iter().any(|s| normalized.contains(s.as_str())) {
            return Some(Violation::Substring);
        }
        if link_pattern().is_match(normalized) {
            return Some(Violation::Link);
        }
        if has_repeat_run(normalized, MAX_REPEAT_RUN) {
            return Some(Violation::Repetition);
        }
        None
    }

    pub fn decide(&self, normalized: &str) -> ModerationDecision {
        let Some(violation) = self.violation(normalized) else {
            return ModerationDecision {
                allowed: true,
                replacement_name: None,
            };
        };
        debug!("Name '{}' hit the {:?} rule", normalized, violation);

        ModerationDecision {
            allowed: false,
            replacement_name: self
                .replace_on_violation
                .then(|| anonymous_name(&mut rand::thread_rng())),
        }
    }
}

/// `Anonymous` followed by a number in 1000..=9999.
pub fn anonymous_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("Anonymous{}", rng.gen_range(1000..=9999))
}

fn has_repeat_run(s: &str, run: usize) -> bool {
    let mut prev = None;
    let mut count = 0;
    for c in s.chars() {
        if Some(c) == prev {
            count += 1;
        } else {
            prev = Some(c);
            count = 1;
        }
        if count >= run {
            return true;
        }
    }
    false
}
