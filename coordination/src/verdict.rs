//! Jury verdict line parsing.
//!
//! Wire contract (one line, found anywhere in free text):
//!
//! ```text
//! Verdict: <Guilty|Not Guilty|No Verdict>; Confidence: <digits>%
//! ```

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static VERDICT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Verdict:\s*(Guilty|Not Guilty|No Verdict)\s*;\s*Confidence:\s*(\d{1,3})%")
        .expect("VERDICT_LINE regex should compile")
});

/// Jury verdict vocabulary. No synonyms are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "Guilty")]
    Guilty,
    #[serde(rename = "Not Guilty")]
    NotGuilty,
    #[serde(rename = "No Verdict")]
    NoVerdict,
}

impl Verdict {
    /// Canonical label, as it appears on the wire.
    pub fn label(self) -> &'static str {
        match self {
            Self::Guilty => "Guilty",
            Self::NotGuilty => "Not Guilty",
            Self::NoVerdict => "No Verdict",
        }
    }

    /// Case-insensitive label lookup.
    pub fn from_label(label: &str) -> Option<Self> {
        [Self::Guilty, Self::NotGuilty, Self::NoVerdict]
            .into_iter()
            .find(|v| v.label().eq_ignore_ascii_case(label))
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Find the first verdict line in `text`.
///
/// Returns `None` when no labelled line matches. Confidence is returned as
/// written (0-999); range checks belong to the caller.
pub fn parse_verdict(text: &str) -> Option<(Verdict, u16)> {
    let caps = VERDICT_LINE.captures(text)?;
    let verdict = Verdict::from_label(caps.get(1)?.as_str())?;
    let confidence = caps.get(2)?.as_str().parse().ok()?;
    Some((verdict, confidence))
}
