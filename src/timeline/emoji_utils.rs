/// Longest reaction key accepted, in bytes
const MAX_KEY_LEN: usize = 64;

const MODIFIERS: [char; 6] = [
    '\u{1F3FB}',
    '\u{1F3FC}',
    '\u{1F3FD}',
    '\u{1F3FE}',
    '\u{1F3FF}',
    '\u{FE0F}',
];

/// Validates and normalizes a reaction key.
///
/// Returns `None` for keys that cannot be displayed as a reaction.
pub fn normalize_reaction_key(key: &str, strip_modifiers: bool) -> Option<String> {
    let key = key.trim();
    match key {
        "+" => Some("👍".to_string()),
        "-" => Some("👎".to_string()),
        "" => None,
        key if key.len() > MAX_KEY_LEN => {
            tracing::debug!(
                target: "timeline_sync::reactions",
                "Ignoring oversized reaction key ({} bytes)",
                key.len()
            );
            None
        }
        key if strip_modifiers => {
            let stripped = strip_emoji_modifiers(key);
            // A key made only of modifiers keeps its original form
            if stripped.is_empty() {
                Some(key.to_string())
            } else {
                Some(stripped)
            }
        }
        key => Some(key.to_string()),
    }
}

/// Removes skin tone modifiers and variation selectors
pub fn strip_emoji_modifiers(emoji: &str) -> String {
    if !emoji.contains(MODIFIERS) {
        return emoji.to_string();
    }

    emoji.chars().filter(|c| !MODIFIERS.contains(c)).collect()
}
