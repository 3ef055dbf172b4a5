//! Phase prompt templates.
//!
//! Prompts are opaque to the rest of the engine; only their inputs matter:
//! Opposing sees the facts and the user's argument, Judge and Jury see the
//! facts and the transcript so far.

use super::state::Phase;

pub const OPPOSING_INSTRUCTIONS: &str = "\
You are Opposing Counsel. Challenge the user's argument using only the pinned case facts below.
Be adversarial but professional. Give either a short objection or one concise cross-examination \
question, followed by a 1-2 sentence critique of factual weaknesses or gaps.";

pub const JUDGE_INSTRUCTIONS: &str = "\
You are the Judge. Keep rulings short and base them only on the pinned case facts and the transcript.
Label your ruling as SUSTAINED or OVERRULED and give a one-sentence reason.";

pub const JURY_INSTRUCTIONS: &str = "\
You are the Jury. Based only on the pinned facts and the transcript, output a one-line verdict and a confidence percentage.
Return EXACTLY ONE LINE in the following strict format (no extra commentary):
Verdict: <Guilty|Not Guilty|No Verdict>; Confidence: <NN>%";

/// Opposing counsel prompt: facts plus the argument under challenge.
pub fn opposing_prompt(facts: &str, argument: &str) -> String {
    format!("{OPPOSING_INSTRUCTIONS}\n\nPinned facts:\n{facts}\n\nUser argument:\n{argument}\n")
}

/// Judge prompt: facts plus the rendered transcript.
pub fn judge_prompt(facts: &str, transcript: &str) -> String {
    format!("{JUDGE_INSTRUCTIONS}\nPinned facts:\n{facts}\nTranscript:\n{transcript}")
}

/// Jury prompt: facts plus the rendered transcript.
pub fn jury_prompt(facts: &str, transcript: &str) -> String {
    format!("{JURY_INSTRUCTIONS}\n\nFacts:\n{facts}\n\nTranscript:\n{transcript}\n")
}

/// Prompt for `phase`.
pub fn build_prompt(phase: Phase, facts: &str, argument: &str, transcript: &str) -> String {
    match phase {
        Phase::Opposing => opposing_prompt(facts, argument),
        Phase::Judge => judge_prompt(facts, transcript),
        Phase::Jury => jury_prompt(facts, transcript),
    }
}
