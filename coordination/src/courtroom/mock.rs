//! Deterministic canned replies used when no capability is configured.
//!
//! Blocking and streaming mode share one script: the blocking reply is the
//! concatenation of the streamed fragments, so both modes produce identical
//! transcripts.

use super::state::Phase;

const OPPOSING_FRAGMENTS: &[&str] = &[
    "(mock) Opposing Counsel:",
    " The facts do not support that claim.",
    " Can you provide evidence of presence?",
];

const JUDGE_FRAGMENTS: &[&str] = &[
    "(mock) JUDGE: SUSTAINED -",
    " The objection is supported by the facts.",
];

const JURY_FRAGMENTS: &[&str] = &["Verdict: Guilty; ", "Confidence: 60%"];

/// Fixed mock script, one fragment list per phase.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockScript;

impl MockScript {
    /// Fragments streamed for `phase`.
    pub fn fragments(&self, phase: Phase) -> &'static [&'static str] {
        match phase {
            Phase::Opposing => OPPOSING_FRAGMENTS,
            Phase::Judge => JUDGE_FRAGMENTS,
            Phase::Jury => JURY_FRAGMENTS,
        }
    }

    /// Full reply for `phase`.
    pub fn reply(&self, phase: Phase) -> String {
        self.fragments(phase).concat()
    }
}
