//! One-time email verification codes and their lifecycle states.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;

/// Number of digits in a verification code.
pub const CODE_LENGTH: usize = 6;

const CODE_SPACE: u32 = 1_000_000;

/// A numeric one-time code, always exactly [`CODE_LENGTH`] digits.
///
/// Leading zeros are significant: `"004217"` and `"4217"` are different codes,
/// and only the former is well-formed.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "String", into = "String")]
pub struct VerificationCode(String);

impl VerificationCode {
    /// Draw a fresh code uniformly from `000000..=999999`.
    pub fn generate() -> Self {
        Self::generate_with(&mut rand::thread_rng())
    }

    /// Draw a fresh code from the given RNG.
    pub fn generate_with(rng: &mut impl Rng) -> Self {
        let code = rng.gen_range(0..CODE_SPACE);
        Self(format!("{code:0>width$}", width = CODE_LENGTH))
    }

    /// The code as it is sent to and typed in by the user.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for VerificationCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("VerificationCode").field(&"******").finish()
    }
}

impl std::fmt::Display for VerificationCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Error parsing a [`VerificationCode`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("verification codes are exactly {CODE_LENGTH} digits")]
pub struct MalformedCode;

impl FromStr for VerificationCode {
    type Err = MalformedCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() == CODE_LENGTH && s.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(s.to_string()))
        } else {
            Err(MalformedCode)
        }
    }
}

impl TryFrom<String> for VerificationCode {
    type Error = MalformedCode;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VerificationCode> for String {
    fn from(code: VerificationCode) -> Self {
        code.0
    }
}

/// Where an account stands in the verification lifecycle.
///
/// `Expired` is never written anywhere, an account simply becomes expired
/// once its stored expiry lies in the past.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VerificationState {
    /// Waiting for the code, which can still be used
    Pending,
    /// Waiting for the code, but it can only be resent
    Expired,
    /// Email ownership proven. Terminal.
    Verified,
}

impl VerificationState {
    /// Classify an account at the instant `now`.
    pub fn of(verified: bool, expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        if verified {
            return Self::Verified;
        }

        match expires_at {
            Some(expires_at) if now <= expires_at => Self::Pending,
            _ => Self::Expired,
        }
    }
}

/// Why a submitted code was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CodeRejection {
    /// The stored code's expiry has passed (or there is no expiry)
    #[error("verification code has expired")]
    Expired,
    /// The submitted code is not the stored one
    #[error("incorrect verification code")]
    Mismatch,
}

/// Compare a submitted code against the stored one.
///
/// Expiry is checked first: a correct code past its expiry is still
/// [`CodeRejection::Expired`]. A missing stored code (e.g. one consumed by an
/// earlier successful verification) never matches.
pub fn check_code(
    stored: Option<&str>,
    expires_at: Option<DateTime<Utc>>,
    submitted: &str,
    now: DateTime<Utc>,
) -> Result<(), CodeRejection> {
    match expires_at {
        Some(expires_at) if now <= expires_at => {}
        _ => return Err(CodeRejection::Expired),
    }

    match stored {
        Some(stored) if stored == submitted => Ok(()),
        _ => Err(CodeRejection::Mismatch),
    }
}
