use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{AppError, AppResult};

/// Fixed-width fingerprint of published comment text.
///
/// The canonical stored form is lowercase hex SHA-256, exactly 64 characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Computes the digest of one rendered comment body.
    #[must_use]
    pub fn of_text(text: &str) -> Self {
        Self(hex::encode(Sha256::digest(text.as_bytes())))
    }

    /// Parses a digest from its canonical hex form.
    pub fn parse(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.len() != 64 {
            return Err(AppError::Validation(format!(
                "content digest must be 64 hex characters, got {}",
                value.len()
            )));
        }

        if !value
            .bytes()
            .all(|byte| byte.is_ascii_digit() || (b'a'..=b'f').contains(&byte))
        {
            return Err(AppError::Validation(
                "content digest must be lowercase hex".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the canonical hex form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = AppError;

    fn try_from(value: String) -> AppResult<Self> {
        Self::parse(value)
    }
}

impl From<ContentDigest> for String {
    fn from(value: ContentDigest) -> Self {
        value.0
    }
}

impl Display for ContentDigest {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}
