// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Response text heuristics
//!
//! These tables decide whether a response declares completion, looks cut
//! off, or announces work it never does. They are approximate by nature:
//! whole-word matching over model prose, tuned on observed model output.
//! Keep every literal here so the heuristics can be reviewed and tested in
//! one place.

/// Sentinel the model emits to declare the task finished
pub const COMPLETION_MARKER: &str = "TASK_COMPLETE";

/// Phrases that announce an action (matched lowercase, on word boundaries)
pub const PENDING_INTENTION_PHRASES: &[&str] = &[
    "let me",
    "i'll check",
    "i will",
    "going to",
    "about to",
    "need to check",
    "let's check",
    "i should",
    "need to find",
    "let me see",
    "i'll look",
    "let me search",
    "let me find",
];

/// Phrases that start like an intention but only address the user
pub const INTENTION_EXCLUSIONS: &[&str] = &["let me know", "i should note", "i should mention"];

/// Filler and subject words allowed before an intention phrase opens a sentence
const LEAD_IN_WORDS: &[&str] = &[
    "now", "next", "first", "ok", "okay", "so", "then", "alright", "and", "i", "i'm", "we",
    "we're", "am",
];

/// Words that end a sentence describing work in progress
pub const ACTION_ENDINGS: &[&str] = &[
    "checking",
    "searching",
    "looking",
    "finding",
    "reading",
    "analyzing",
];

/// Trailing words that cannot end a finished sentence
const DANGLING_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "to", "of", "in", "on", "for", "with", "by", "from",
    "that", "which", "is", "are", "was", "be", "as", "at", "if", "then", "because",
];

/// Trailing characters that suggest the text was cut mid-expression
const DANGLING_CHARS: &[char] = &[',', ':', ';', '(', '[', '{', '-', '/', '\\', '=', '+', '&', '|'];

/// Characters that close a complete response
const TERMINAL_CHARS: &[char] = &['.', '!', '?', '`', ')', ']', '}', '"', '\'', '*', '>'];

/// Responses shorter than this are never flagged as truncated
const MIN_TRUNCATION_LENGTH: usize = 20;

/// Split off the completion marker.
///
/// The marker counts only at the start of a line. Returns whether it was
/// found and the text with it removed.
pub fn strip_completion_marker(text: &str) -> (bool, String) {
    let mut found = false;
    let mut kept: Vec<&str> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix(COMPLETION_MARKER) {
            found = true;
            let rest = rest.trim_start_matches(':').trim();
            if !rest.is_empty() {
                kept.push(rest);
            }
        } else {
            kept.push(line);
        }
    }

    if !found {
        return (false, text.to_string());
    }
    (true, kept.join("\n").trim().to_string())
}

pub fn has_completion_marker(text: &str) -> bool {
    text.lines()
        .any(|line| line.trim_start().starts_with(COMPLETION_MARKER))
}

/// Lowercase words of `text`, keeping inner apostrophes.
fn words(text: &str) -> Vec<String> {
    text.replace('\u{2019}', "'")
        .to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|word| word.trim_matches('\''))
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether `phrase` occupies `words` starting at index `at`.
fn phrase_at(words: &[String], at: usize, phrase: &str) -> bool {
    let mut matched = 0;
    for (offset, expected) in phrase.split_whitespace().enumerate() {
        match words.get(at + offset) {
            Some(word) if word == expected => matched += 1,
            _ => return false,
        }
    }
    matched > 0
}

/// An intention phrase at `at` that is not part of an excluded phrase.
fn intention_at(words: &[String], at: usize, phrase: &str) -> bool {
    phrase_at(words, at, phrase)
        && !INTENTION_EXCLUSIONS
            .iter()
            .any(|excluded| phrase_at(words, at, excluded))
}

/// Intention phrases present anywhere in `text` as whole words.
pub fn find_intention_phrases(text: &str) -> Vec<&'static str> {
    let words = words(text);
    PENDING_INTENTION_PHRASES
        .iter()
        .copied()
        .filter(|phrase| (0..words.len()).any(|at| intention_at(&words, at, phrase)))
        .collect()
}

/// Whether the text ends on an in-progress verb.
pub fn ends_with_action(text: &str) -> bool {
    words(text)
        .last()
        .is_some_and(|last| ACTION_ENDINGS.contains(&last.as_str()))
}

/// Whether the text announces an action it did not take.
///
/// Only the last sentence is inspected, and an intention phrase counts only
/// when it opens that sentence (after filler such as "Now I'm") or closes it.
/// A phrase in the middle of a sentence is narration.
pub fn declares_intention(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return false;
    }
    if ends_with_action(trimmed) {
        return true;
    }
    let body = trimmed.trim_end_matches(['.', '!', ':', '…']);
    let last_sentence = body
        .rsplit(['.', '!', '?', '\n'])
        .next()
        .unwrap_or(body);

    let words = words(last_sentence);
    let lead = words
        .iter()
        .take_while(|word| LEAD_IN_WORDS.contains(&word.as_str()))
        .count();
    PENDING_INTENTION_PHRASES.iter().any(|phrase| {
        let opens = (0..=lead).any(|at| intention_at(&words, at, phrase));
        let len = phrase.split_whitespace().count();
        let closes = words.len() >= len && intention_at(&words, words.len() - len, phrase);
        opens || closes
    })
}

/// Whether the text looks cut off mid-sentence.
pub fn appears_truncated(text: &str) -> bool {
    let trimmed = text.trim_end();
    if trimmed.len() < MIN_TRUNCATION_LENGTH {
        return false;
    }

    // Unclosed code fence
    if trimmed.matches("```").count() % 2 == 1 {
        return true;
    }

    if trimmed.ends_with("...") && !trimmed.ends_with("....") {
        return true;
    }

    let Some(last) = trimmed.chars().last() else {
        return false;
    };
    if DANGLING_CHARS.contains(&last) {
        return true;
    }
    if TERMINAL_CHARS.contains(&last) {
        return false;
    }

    let last_word = trimmed
        .rsplit(|c: char| c.is_whitespace())
        .next()
        .unwrap_or("")
        .to_lowercase();
    DANGLING_WORDS.contains(&last_word.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_completion_marker() {
        let (found, cleaned) = strip_completion_marker("TASK_COMPLETE\nAll tests pass.");
        assert!(found);
        assert_eq!(cleaned, "All tests pass.");

        let (found, cleaned) = strip_completion_marker("Done.\n  TASK_COMPLETE: fixed the bug");
        assert!(found);
        assert_eq!(cleaned, "Done.\nfixed the bug");
    }

    #[test]
    fn test_marker_must_start_a_line() {
        assert!(!has_completion_marker("I will print TASK_COMPLETE when done"));
        let (found, cleaned) = strip_completion_marker("say TASK_COMPLETE later");
        assert!(!found);
        assert_eq!(cleaned, "say TASK_COMPLETE later");
    }

    #[test]
    fn test_find_intention_phrases() {
        let found = find_intention_phrases("Let me search for the config loader.");
        assert!(found.contains(&"let me"));
        assert!(found.contains(&"let me search"));
        assert!(find_intention_phrases("The bug is fixed.").is_empty());
        assert!(find_intention_phrases("Outlet menus render fine.").is_empty());
        assert!(find_intention_phrases("Let me know if that works.").is_empty());
        assert_eq!(find_intention_phrases("I\u{2019}ll look at it."), vec!["i'll look"]);
    }

    #[test]
    fn test_declares_intention() {
        assert!(declares_intention("Let me check the tests."));
        assert!(declares_intention("I found the module. Now I'm going to read it"));
        assert!(declares_intention("Still searching"));
        assert!(!declares_intention(
            "I was going to refactor this, but it is fine. The fix is complete."
        ));
        assert!(!declares_intention(""));
    }

    #[test]
    fn test_narration_is_not_intention() {
        assert!(!declares_intention("The API will return 404 for missing keys."));
        assert!(!declares_intention(
            "The fix is in place. Let me know if anything else is needed."
        ));
        assert!(!declares_intention("Done. The CLI should now print the version."));
        assert!(!declares_intention("The parser is going to reject trailing commas."));
    }

    #[test]
    fn test_intention_after_lead_in() {
        assert!(declares_intention("Next, I will run the formatter."));
        assert!(declares_intention("Okay, let me find the caller."));
        assert!(declares_intention("I am going to rerun the tests"));
        assert!(declares_intention("The parser looks right, so next I need to check"));
    }

    #[test]
    fn test_ends_with_action() {
        assert!(ends_with_action("Now analyzing..."));
        assert!(ends_with_action("reading"));
        assert!(!ends_with_action("I finished reading it."));
        assert!(!ends_with_action("Still researching"));
    }

    #[test]
    fn test_appears_truncated() {
        assert!(appears_truncated("The function returns the value of the"));
        assert!(appears_truncated("Here is the updated code:\n```rust\nfn main() {"));
        assert!(appears_truncated("The remaining steps are as follows,"));
        assert!(appears_truncated("I'll summarize what happened next..."));
        assert!(!appears_truncated("The function returns the parsed value."));
        assert!(!appears_truncated("Short and"));
        assert!(!appears_truncated("See `src/lib.rs` for the `Settings` struct"));
    }
}
