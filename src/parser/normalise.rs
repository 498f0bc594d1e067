//! Two-stage radiotelephony normalisation (§4.1 steps 2-3).
//!
//! Stage 1 is a deterministic substring rewrite of spoken digits, letters,
//! and directional suffixes and always runs. Stage 2 hands the stage-1
//! output to the LLM for a deeper, few-shot-style normalisation pass, but
//! only when the text looks like it needs it; on timeout or failure it
//! falls back to the stage-1 text unchanged.

use std::time::Duration;

use crate::llm::{CompletionOptions, LlmClient};

/// Spoken-digit / phonetic-alphabet substitutions applied in order
/// (§4.1 step 2, glossary "radiotelephony normalisation"). Longer spoken
/// forms are listed before shorter ones so they match first.
const SPOKEN_SUBSTITUTIONS: &[(&str, &str)] = &[
    ("幺两拐", "127"),
    ("洞", "0"),
    ("幺", "1"),
    ("两", "2"),
    ("拐", "7"),
    ("勾", "9"),
    ("左", "L"),
    ("右", "R"),
    ("中", "C"),
    ("alpha", "A"),
    ("bravo", "B"),
    ("charlie", "C"),
    ("delta", "D"),
];

/// Markers whose presence means the text likely still contains spoken-form
/// tokens that stage 1 rewrote, or aviation vocabulary dense enough to be
/// worth a deeper normalisation pass (§4.1 step 3 "skip condition").
const AVIATION_KEYWORDS: &[&str] = &[
    "跑道", "滑行道", "机位", "停机坪", "航班", "消防", "鸟击", "异物", "燃油", "液压", "滑油", "泄漏",
];
const SPOKEN_DIGIT_MARKERS: &[&str] = &["幺", "洞", "两", "拐", "勾"];

/// Deterministic rule-based rewrite. Runs unconditionally (§4.1 step 2).
pub fn stage1_normalise(text: &str) -> String {
    let mut out = text.to_string();
    for (from, to) in SPOKEN_SUBSTITUTIONS {
        out = out.replace(from, to);
    }
    out
}

/// Whether `text` looks plain enough that a deep LLM normalisation pass
/// would add nothing (§4.1 step 3: "skipped when the text is short and
/// contains no aviation keyword and no spoken-digit marker").
fn should_skip_stage2(original: &str) -> bool {
    const SHORT_THRESHOLD: usize = 12;
    let short = original.chars().count() < SHORT_THRESHOLD;
    let has_keyword = AVIATION_KEYWORDS.iter().any(|k| original.contains(k));
    let has_spoken_marker = SPOKEN_DIGIT_MARKERS.iter().any(|m| original.contains(m));
    short && !has_keyword && !has_spoken_marker
}

/// Deep normalisation via the LLM, 5s timeout, falling back to the stage-1
/// text on timeout, error, or when skipped (§4.1 step 3).
pub async fn stage2_normalise(llm: &dyn LlmClient, original: &str, stage1_output: &str) -> String {
    if should_skip_stage2(original) {
        return stage1_output.to_string();
    }

    let prompt = format!(
        "Rewrite the following airport radio transcript into clean, structured English/Chinese with explicit runway, stand, and taxiway identifiers. Reply with only the rewritten text.\n\nTranscript: {stage1_output}"
    );
    let options = CompletionOptions { timeout: Duration::from_secs(5), ..CompletionOptions::default() };

    match llm.complete(&prompt, options).await {
        Ok(rewritten) if !rewritten.trim().is_empty() => rewritten,
        _ => stage1_output.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::TemplateBackend;

    #[test]
    fn stage1_rewrites_spoken_digits_and_direction() {
        let result = stage1_normalise("跑道两拐左发现泄漏");
        assert_eq!(result, "跑道27L发现泄漏");
    }

    #[test]
    fn stage1_is_idempotent_on_plain_text() {
        assert_eq!(stage1_normalise("STAND 42 fuel spill"), "STAND 42 fuel spill");
    }

    #[tokio::test]
    async fn stage2_falls_back_when_llm_unavailable() {
        let backend = TemplateBackend;
        let original = "跑道27左发生大量燃油泄漏，发动机停车";
        let stage1 = stage1_normalise(original);
        let result = stage2_normalise(&backend, original, &stage1).await;
        assert_eq!(result, stage1);
    }

    #[tokio::test]
    async fn stage2_skips_short_plain_text() {
        let backend = TemplateBackend;
        let original = "ok thanks";
        let stage1 = stage1_normalise(original);
        let result = stage2_normalise(&backend, original, &stage1).await;
        assert_eq!(result, stage1);
    }
}
