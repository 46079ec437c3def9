use serde::{Deserialize, Deserializer};
use unicode_normalization::UnicodeNormalization;

/// Normalizes a location or itinerary name by stripping surrounding
/// whitespace and decomposing it into Unicode Normalization Form D, so
/// that names typed on different keyboards compare equal.
///
/// ```
/// use touris::normalization::normalize_name;
/// assert_eq!(normalize_name("  Café de Flore "), normalize_name("Cafe\u{301} de Flore"));
/// ```
pub fn normalize_name(name: impl AsRef<str>) -> String {
    name.as_ref().trim().nfd().to_string()
}

/// Normalizes free text: NFD, no trailing whitespace on any line, no
/// leading or trailing blank lines.
pub fn normalize_text(text: impl AsRef<str>) -> String {
    let lines = text
        .as_ref()
        .lines()
        .map(|line| line.trim_end().nfd().to_string())
        .collect::<Vec<_>>();

    lines.join("\n").trim_matches('\n').to_string()
}

/// Deserializes a `String` after running it through `normalize_name`.
pub fn deserialize_name<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Ok(normalize_name(s))
}

/// Deserializes a `String` after running it through `normalize_text`.
pub fn deserialize_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Ok(normalize_text(s))
}
