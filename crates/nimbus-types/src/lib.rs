//! Validated string types shared across the nimbus crates.
//!
//! - [`NonEmptyText`] for configuration values that must carry content.
//! - [`FileKey`] for the opaque handle a client uses to reference a stored file.

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
}

/// Errors that can occur when parsing a [`FileKey`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("key cannot be empty")]
    Empty,

    /// The key would resolve outside of a single directory entry.
    #[error("key is not a plain file name: {0}")]
    NotAFileName(String),
}

/// A string type that guarantees non-empty content.
///
/// This type wraps a `String` and ensures it contains at least one non-whitespace character.
/// The input is automatically trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// The input is trimmed of leading and trailing whitespace. If the trimmed
    /// result is empty, an error is returned.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Key of a stored file: the base name of its backing file.
///
/// A parsed key is always exactly one normal path component, so joining it onto a directory can
/// never address anything outside that directory. Unlike [`NonEmptyText`] the input is taken
/// verbatim; surrounding whitespace is part of the name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileKey(String);

impl FileKey {
    /// Parses a client-supplied key.
    ///
    /// # Errors
    ///
    /// Returns `KeyError::Empty` for an empty string and `KeyError::NotAFileName` for `.`, `..`,
    /// anything containing a `/` or `\` separator, or a NUL byte.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, KeyError> {
        let input = input.as_ref();
        if input.is_empty() {
            return Err(KeyError::Empty);
        }
        let forbidden = |c: char| matches!(c, '/' | '\\' | '\0');
        if input == "." || input == ".." || input.contains(forbidden) {
            return Err(KeyError::NotAFileName(input.to_owned()));
        }
        Ok(Self(input.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for FileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for FileKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for FileKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for FileKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for FileKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FileKey::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_empty_text_trims() {
        let text = NonEmptyText::new("  _file_ ").unwrap();
        assert_eq!(text.as_str(), "_file_");
    }

    #[test]
    fn test_non_empty_text_rejects_whitespace() {
        assert!(matches!(NonEmptyText::new("   "), Err(TextError::Empty)));
    }

    #[test]
    fn test_file_key_accepts_plain_names() {
        for name in ["a1b2c3.png", "noext", ".hidden", "dots..inside.txt"] {
            let key = FileKey::parse(name).unwrap();
            assert_eq!(key.as_str(), name);
        }
    }

    #[test]
    fn test_file_key_rejects_traversal() {
        assert_eq!(FileKey::parse(""), Err(KeyError::Empty));
        for name in [".", "..", "../etc/passwd", "a/b.png", "a\\b.png", "/abs.png", "nul\0.png"] {
            assert!(
                matches!(FileKey::parse(name), Err(KeyError::NotAFileName(_))),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_file_key_deserialize_validates() {
        let ok: FileKey = serde_json::from_str("\"abc.png\"").unwrap();
        assert_eq!(ok.as_str(), "abc.png");
        assert!(serde_json::from_str::<FileKey>("\"../abc.png\"").is_err());
    }
}
