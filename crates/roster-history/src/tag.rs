//! PlayerTag: Stable identifier for an individual on the roster.
//!
//! Stored without the leading `#` but always displayed with it, so
//! `"#2pr8r8v8p"`, `" 2PR8R8V8P"` and `"#2PR8R8V8P"` all parse to the same tag.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

/// Characters the game uses when minting tags.
const TAG_ALPHABET: &str = "0289PYLQGRJCUV";

const MIN_TAG_LEN: usize = 3;
const MAX_TAG_LEN: usize = 14;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagError {
    #[error("Tag is empty")]
    Empty,
    #[error("Tag length {0} outside 3..=14")]
    InvalidLength(usize),
    #[error("Invalid character {0:?} in tag")]
    InvalidChar(char),
}

/// A normalized player tag.
///
/// # Examples
/// ```
/// use roster_history::PlayerTag;
///
/// let tag: PlayerTag = "#2pr8r8v8p".parse().unwrap();
/// assert_eq!(tag.to_string(), "#2PR8R8V8P");
/// assert!("INVALID123".parse::<PlayerTag>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlayerTag(String);

impl PlayerTag {
    /// Tag body without the `#` prefix.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PlayerTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl FromStr for PlayerTag {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let body = trimmed.strip_prefix('#').unwrap_or(trimmed);
        if body.is_empty() {
            return Err(TagError::Empty);
        }

        // Players routinely type the letter O for zero
        let normalized: String = body
            .chars()
            .map(|c| match c.to_ascii_uppercase() {
                'O' => '0',
                upper => upper,
            })
            .collect();

        if let Some(bad) = normalized.chars().find(|c| !TAG_ALPHABET.contains(*c)) {
            return Err(TagError::InvalidChar(bad));
        }

        let len = normalized.chars().count();
        if !(MIN_TAG_LEN..=MAX_TAG_LEN).contains(&len) {
            return Err(TagError::InvalidLength(len));
        }

        Ok(Self(normalized))
    }
}

impl TryFrom<String> for PlayerTag {
    type Error = TagError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// Serialize as the display form so JSON payloads stay human-readable
impl serde::Serialize for PlayerTag {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for PlayerTag {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_adds_hash() {
        let tag: PlayerTag = "2PR8R8V8P".parse().unwrap();
        assert_eq!(tag.to_string(), "#2PR8R8V8P");
        assert_eq!(tag.as_str(), "2PR8R8V8P");
    }

    #[test]
    fn test_parse_normalizes_case_and_prefix() {
        let a: PlayerTag = "#2pr8r8v8p".parse().unwrap();
        let b: PlayerTag = "  2PR8R8V8P ".parse().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_letter_o_becomes_zero() {
        let tag: PlayerTag = "#8OLQ".parse().unwrap();
        assert_eq!(tag.as_str(), "80LQ");
    }

    #[test]
    fn test_rejects_invalid_characters() {
        assert_eq!(
            "INVALID123".parse::<PlayerTag>(),
            Err(TagError::InvalidChar('I'))
        );
        assert!("#2PR8-R8V8P".parse::<PlayerTag>().is_err());
    }

    #[test]
    fn test_rejects_bad_length() {
        assert_eq!("".parse::<PlayerTag>(), Err(TagError::Empty));
        assert_eq!("#".parse::<PlayerTag>(), Err(TagError::Empty));
        assert_eq!("#29".parse::<PlayerTag>(), Err(TagError::InvalidLength(2)));
        assert!("2PR8R8V8P2PR8R8V".parse::<PlayerTag>().is_err());
    }

    #[test]
    fn test_serde_uses_display_form() {
        let tag: PlayerTag = "2pr8r8v8p".parse().unwrap();
        let json = serde_json::to_string(&tag).unwrap();
        assert_eq!(json, "\"#2PR8R8V8P\"");
        let parsed: PlayerTag = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, tag);
    }

    #[test]
    fn test_serde_rejects_invalid_tag() {
        assert!(serde_json::from_str::<PlayerTag>("\"#NOPE\"").is_err());
    }
}
