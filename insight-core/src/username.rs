//! Usernames

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;
use validator::{Validate, ValidationError, ValidationErrors};

/// A validated username.
///
/// Usernames identify an account. They are case-sensitive and can't be
/// changed once claimed. Only ASCII letters, digits and underscores are
/// allowed, between 2 and 20 characters.
#[derive(Clone, ToSchema, Serialize, Deserialize, Validate, Eq, PartialEq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct Username {
    #[validate(length(min = 2, max = 20))]
    #[validate(custom = "allowed_characters")]
    inner: String,
}

impl std::fmt::Debug for Username {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Username").field(&self.inner).finish()
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::fmt::Display for Username {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_str().fmt(f)
    }
}

impl FromStr for Username {
    type Err = ValidationErrors;

    fn from_str(s: &str) -> Result<Self, ValidationErrors> {
        let username = Self {
            inner: s.to_string(),
        };
        username.validate()?;
        Ok(username)
    }
}

impl Username {
    /// Get a string reference of this username.
    pub fn as_str(&self) -> &str {
        self.inner.as_str()
    }

    /// Take the inner string
    pub fn into_string(self) -> String {
        self.inner
    }
}

/// Validator hook for plain `String` fields that should hold a username.
pub fn valid_username(s: &str) -> Result<(), ValidationError> {
    Username::from_str(s)
        .map(|_| ())
        .map_err(|_| ValidationError::new("username must be 2-20 letters, digits or underscores"))
}

fn allowed_characters(s: &str) -> Result<(), ValidationError> {
    if s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(ValidationError::new(
            "username must not contain special characters",
        ))
    }
}
