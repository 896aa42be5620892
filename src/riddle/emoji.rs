use super::extract::Similarity;

const ANIMAL_EMOJIS: &[(&str, &str)] = &[
    ("dog", "🐕"),
    ("bird", "🐦"),
    ("cat", "🐈"),
    ("elephant", "🐘"),
    ("fish", "🐟"),
    ("fox", "🦊"),
    ("horse", "🐎"),
    ("lion", "🦁"),
    ("monkey", "🐒"),
    ("mouse", "🐁"),
    ("owl", "🦉"),
    ("panda", "🐼"),
    ("rabbit", "🐇"),
    ("snake", "🐍"),
    ("tiger", "🐅"),
    ("unicorn", "🦄"),
    ("dragon", "🐉"),
    ("swan", "🦢"),
];

/// Emoji for an animal label, case-insensitive. Empty for anything unknown.
pub fn emoji_for(label: &str) -> &'static str {
    let label = label.to_lowercase();
    ANIMAL_EMOJIS
        .iter()
        .find(|(name, _)| *name == label)
        .map(|(_, emoji)| *emoji)
        .unwrap_or("")
}

/// `"{index}. {emoji} {label}: {percent}%"`, index starting at 1.
pub fn ranked_line(index: usize, similarity: &Similarity) -> String {
    format!(
        "{}. {} {}: {}%",
        index,
        emoji_for(&similarity.label),
        similarity.label,
        similarity.percent
    )
}
