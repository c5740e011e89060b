//! Heuristic answer lint.
//!
//! A coarse check, not a quality metric: length, presence of citation
//! brackets and any shared word with the question. The weights are fixed
//! (0.3 / 0.4 / 0.3) so scores stay comparable with stored history.

use std::collections::HashSet;

use serde_json::Value;

use super::types::{Chunk, EvaluationResult};

const MIN_ANSWER_CHARS: usize = 50;
const LENGTH_WEIGHT: f64 = 0.3;
const CITATION_WEIGHT: f64 = 0.4;
const OVERLAP_WEIGHT: f64 = 0.3;

pub const FEEDBACK_TOO_SHORT: &str = "Answer is too short.";
pub const FEEDBACK_NO_CITATIONS: &str = "No citations found.";
pub const FEEDBACK_LOW_OVERLAP: &str = "Low keyword overlap with query.";

/// Text of a model response value.
///
/// Strings pass through; arrays are joined with single spaces (text parts
/// contribute their `text`); null is empty; anything else is its JSON form.
pub fn coerce_answer(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Object(obj) => match obj.get("text").and_then(Value::as_str) {
                    Some(text) => text.to_string(),
                    None => item.to_string(),
                },
                other => coerce_answer(other),
            })
            .collect::<Vec<_>>()
            .join(" "),
        other => other.to_string(),
    }
}

pub fn evaluate(query: &str, answer: &str, _context: &[Chunk]) -> EvaluationResult {
    let mut score = 0.0;
    let mut feedback = Vec::new();

    if answer.chars().count() >= MIN_ANSWER_CHARS {
        score += LENGTH_WEIGHT;
    } else {
        feedback.push(FEEDBACK_TOO_SHORT.to_string());
    }

    if answer.contains('[') && answer.contains(']') {
        score += CITATION_WEIGHT;
    } else {
        feedback.push(FEEDBACK_NO_CITATIONS.to_string());
    }

    let query_lower = query.to_lowercase();
    let answer_lower = answer.to_lowercase();
    let query_words: HashSet<&str> = query_lower.split_whitespace().collect();
    let overlaps = answer_lower
        .split_whitespace()
        .any(|word| query_words.contains(word));
    if overlaps {
        score += OVERLAP_WEIGHT;
    } else {
        feedback.push(FEEDBACK_LOW_OVERLAP.to_string());
    }

    EvaluationResult {
        score: (score * 100.0_f64).round() / 100.0,
        feedback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn short_uncited_answer_with_one_shared_word() {
        // "is" is the only token shared with the question.
        let result = evaluate("What is GST?", "GST is a tax.", &[]);
        assert_eq!(result.score, 0.3);
        assert_eq!(result.feedback, vec![FEEDBACK_TOO_SHORT, FEEDBACK_NO_CITATIONS]);
    }

    #[test]
    fn fifty_characters_is_long_enough() {
        let forty_nine = "x".repeat(49);
        let fifty = "x".repeat(50);

        let short = evaluate("q", &forty_nine, &[]);
        assert!(short.feedback.contains(&FEEDBACK_TOO_SHORT.to_string()));
        assert_eq!(short.score, 0.0);

        let long = evaluate("q", &fifty, &[]);
        assert!(!long.feedback.contains(&FEEDBACK_TOO_SHORT.to_string()));
        assert_eq!(long.score, 0.3);
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let rupees = "₹".repeat(49);
        assert!(rupees.len() >= 50);
        assert!(evaluate("q", &rupees, &[])
            .feedback
            .contains(&FEEDBACK_TOO_SHORT.to_string()));
    }

    #[test]
    fn full_marks_and_zero() {
        let answer = "The repo rate is set by the RBI Monetary Policy Committee [1].";
        let result = evaluate("Who sets the repo rate", answer, &[]);
        assert_eq!(result.score, 1.0);
        assert!(result.feedback.is_empty());

        let result = evaluate("inflation", "", &[]);
        assert_eq!(result.score, 0.0);
        assert_eq!(
            result.feedback,
            vec![FEEDBACK_TOO_SHORT, FEEDBACK_NO_CITATIONS, FEEDBACK_LOW_OVERLAP]
        );
    }

    #[test]
    fn both_brackets_are_required() {
        let result = evaluate("q", "see [1", &[]);
        assert!(result.feedback.contains(&FEEDBACK_NO_CITATIONS.to_string()));
        // Order does not matter.
        let result = evaluate("q", "] then [", &[]);
        assert!(!result.feedback.contains(&FEEDBACK_NO_CITATIONS.to_string()));
    }

    #[test]
    fn overlap_is_case_insensitive_whole_tokens() {
        assert!(!evaluate("GST rates", "gst applies", &[])
            .feedback
            .contains(&FEEDBACK_LOW_OVERLAP.to_string()));
        assert!(evaluate("GST?", "gst applies", &[])
            .feedback
            .contains(&FEEDBACK_LOW_OVERLAP.to_string()));
    }

    #[test]
    fn evaluation_is_pure() {
        let a = evaluate("What is GST?", "GST is a tax [1] levied on supply of goods and services.", &[]);
        let b = evaluate("What is GST?", "GST is a tax [1] levied on supply of goods and services.", &[]);
        assert_eq!(a, b);
        assert_eq!(a.score, 1.0);
    }

    #[test]
    fn coerces_response_values() {
        assert_eq!(coerce_answer(&json!("plain")), "plain");
        assert_eq!(coerce_answer(&json!(["GST", "is", "a", "tax"])), "GST is a tax");
        assert_eq!(
            coerce_answer(&json!([{ "type": "text", "text": "A." }, { "text": "B." }])),
            "A. B."
        );
        assert_eq!(coerce_answer(&json!(42)), "42");
        assert_eq!(coerce_answer(&Value::Null), "");
    }
}
