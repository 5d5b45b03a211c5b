//! User account model

use crate::db::schema::users;
use chrono::{DateTime, Utc};
use diesel::{pg::Pg, AsChangeset, Identifiable, Insertable, Queryable, Selectable};
use insight_core::{common::AccountResponse, verification::VerificationState};

/// User account record
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Identifiable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(Pg))]
pub struct UserRecord {
    /// Internal Database Identifier
    pub id: i32,

    /// Unique, case-sensitive username
    pub username: String,
    /// Email address the verification code goes to
    pub email: String,
    /// Argon2id PHC string
    pub password_hash: String,

    /// Whether the email address was verified
    pub verified: bool,
    /// The currently valid one-time code, if any
    pub verify_code: Option<String>,
    /// When `verify_code` stops being accepted
    pub verify_code_expires_at: Option<DateTime<Utc>>,
    /// When `verify_code` was issued
    pub verify_code_issued_at: Option<DateTime<Utc>>,

    /// Inserted at timestamp
    pub inserted_at: DateTime<Utc>,
    /// Updated at timestamp
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    /// Where this account stands in the verification lifecycle at `now`
    pub fn verification_state(&self, now: DateTime<Utc>) -> VerificationState {
        VerificationState::of(self.verified, self.verify_code_expires_at, now)
    }

    /// Public view of this account
    pub fn to_response(&self) -> AccountResponse {
        AccountResponse {
            username: self.username.clone(),
            email: self.email.clone(),
            verified: self.verified,
        }
    }
}

/// A pending account that wasn't added to the database yet
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(Pg))]
pub struct NewUser {
    /// Unique, case-sensitive username
    pub username: String,
    /// Email address the verification code goes to
    pub email: String,
    /// Argon2id PHC string
    pub password_hash: String,
    /// Always false for new accounts
    pub verified: bool,
}

impl NewUser {
    /// Create a new, unverified account
    pub fn new(username: String, email: String, password_hash: String) -> Self {
        Self {
            username,
            email,
            password_hash,
            verified: false,
        }
    }
}

/// A partial update to a [`UserRecord`].
///
/// `None` leaves a column untouched. For nullable columns, `Some(None)`
/// clears the value.
#[derive(Debug, Clone, Default, PartialEq, Eq, AsChangeset)]
#[diesel(table_name = users)]
pub struct UserPatch {
    /// New verification flag
    pub verified: Option<bool>,
    /// New verification code
    pub verify_code: Option<Option<String>>,
    /// New code expiry
    pub verify_code_expires_at: Option<Option<DateTime<Utc>>>,
    /// New code issuance time
    pub verify_code_issued_at: Option<Option<DateTime<Utc>>>,
}

impl UserPatch {
    /// Bind a freshly issued code to the account
    pub fn issue_code(code: &str, issued_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            verify_code: Some(Some(code.to_string())),
            verify_code_expires_at: Some(Some(expires_at)),
            verify_code_issued_at: Some(Some(issued_at)),
            ..Default::default()
        }
    }

    /// Mark the account verified and consume its code
    pub fn mark_verified() -> Self {
        Self {
            verified: Some(true),
            verify_code: Some(None),
            ..Default::default()
        }
    }

    /// Apply this patch to an in-memory record
    pub fn apply_to(&self, record: &mut UserRecord, now: DateTime<Utc>) {
        if let Some(verified) = self.verified {
            record.verified = verified;
        }
        if let Some(verify_code) = &self.verify_code {
            record.verify_code = verify_code.clone();
        }
        if let Some(expires_at) = self.verify_code_expires_at {
            record.verify_code_expires_at = expires_at;
        }
        if let Some(issued_at) = self.verify_code_issued_at {
            record.verify_code_issued_at = issued_at;
        }
        record.updated_at = now;
    }
}
