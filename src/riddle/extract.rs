//! Pulls `label: NN%` pairs out of the vision model's free-text answer.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// How many similarities the reveal page lists.
pub const TOP_N: usize = 5;

pub const UNKNOWN_LABEL: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Similarity {
    pub label: String,
    pub percent: u32,
}

impl Similarity {
    pub fn new(label: impl Into<String>, percent: u32) -> Self {
        Self { label: label.into(), percent }
    }
}

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\w+): ([0-9]+)%").expect("static pattern compiles"))
}

/// Every `word: integer%` match, in order of appearance.
/// Only ASCII digits count as a percentage ("٩٠%" is skipped), while labels
/// may use any Unicode word characters. Percentages too large for a u32 saturate.
pub fn extract_similarities(text: &str) -> Vec<Similarity> {
    pattern()
        .captures_iter(text)
        .map(|caps| {
            let percent = caps[2].parse::<u32>().unwrap_or(u32::MAX);
            Similarity::new(&caps[1], percent)
        })
        .collect()
}

/// What the reveal page shows: the first five matches, or five "Unknown: 0%"
/// placeholders when the answer had none.
pub fn top_similarities(text: &str) -> Vec<Similarity> {
    let mut found = extract_similarities(text);
    if found.is_empty() {
        return vec![Similarity::new(UNKNOWN_LABEL, 0); TOP_N];
    }
    found.truncate(TOP_N);
    found
}
