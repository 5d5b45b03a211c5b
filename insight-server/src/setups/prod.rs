//! Production server setup code

use crate::{
    db::{self, schema::users, Pool},
    models::user::{NewUser, UserPatch, UserRecord},
    settings,
    setups::{ServerSetup, StoreError, UniqueField, UserStore, VerificationCodeSender},
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use diesel::{
    result::{DatabaseErrorKind, Error as DieselError},
    ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper,
};
use diesel_async::RunQueryDsl;
use mailgun_rs::{EmailAddress, Mailgun, MailgunRegion, Message};
use std::collections::HashMap;

/// Production implementation of `ServerSetup`.
/// Persists to postgres and sends real emails, as configured in `settings.toml`.
#[derive(Clone, Debug, Default)]
pub struct ProdSetup;

impl ServerSetup for ProdSetup {
    type UserStore = PgUserStore;
    type VerificationCodeSender = EmailVerificationCodeSender;
}

/// A `UserStore` backed by the `users` postgres table.
#[derive(Clone)]
pub struct PgUserStore {
    pool: Pool,
}

impl std::fmt::Debug for PgUserStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgUserStore")
            .field("state", &self.pool.state())
            .finish()
    }
}

impl PgUserStore {
    /// Create a store on top of a connection pool
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

impl From<DieselError> for StoreError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => StoreError::NotFound,
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                match info.constraint_name() {
                    Some("users_username_key") => StoreError::Conflict {
                        field: UniqueField::Username,
                    },
                    Some("users_email_key") => StoreError::Conflict {
                        field: UniqueField::Email,
                    },
                    _ => StoreError::Backend(anyhow!(
                        "unique violation: {}",
                        info.details().unwrap_or(info.message())
                    )),
                }
            }
            err => StoreError::Backend(anyhow!(err)),
        }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        let conn = &mut db::connect(&self.pool).await?;

        Ok(users::table
            .filter(users::username.eq(username))
            .select(UserRecord::as_select())
            .first(conn)
            .await
            .optional()?)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let conn = &mut db::connect(&self.pool).await?;

        Ok(users::table
            .filter(users::email.eq(email))
            .select(UserRecord::as_select())
            .first(conn)
            .await
            .optional()?)
    }

    async fn insert(&self, user: NewUser) -> Result<UserRecord, StoreError> {
        let conn = &mut db::connect(&self.pool).await?;

        tracing::debug!(username = %user.username, "Inserting new user record");

        Ok(diesel::insert_into(users::table)
            .values(&user)
            .returning(UserRecord::as_select())
            .get_result(conn)
            .await?)
    }

    async fn update(&self, username: &str, patch: UserPatch) -> Result<UserRecord, StoreError> {
        let conn = &mut db::connect(&self.pool).await?;

        Ok(diesel::update(users::table.filter(users::username.eq(username)))
            .set(&patch)
            .returning(UserRecord::as_select())
            .get_result(conn)
            .await?)
    }

    async fn healthcheck(&self) -> Result<()> {
        let conn = &mut db::connect(&self.pool).await?;
        diesel::sql_query("SELECT 1").execute(conn).await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
/// Sends verification codes over email
pub struct EmailVerificationCodeSender {
    settings: settings::Mailgun,
}

impl EmailVerificationCodeSender {
    /// Create a new EmailVerificationCodeSender
    pub fn new(settings: settings::Mailgun) -> Self {
        Self { settings }
    }

    fn sender(&self) -> EmailAddress {
        EmailAddress::name_address(&self.settings.from_name, &self.settings.from_address)
    }

    fn message(&self, email: &str, code: &str) -> Message {
        let template_vars = HashMap::from_iter([("code".to_string(), code.to_string())]);

        Message {
            to: vec![EmailAddress::address(email)],
            subject: self.settings.subject.clone(),
            template: self.settings.template.clone(),
            template_vars,
            ..Default::default()
        }
    }
}

#[async_trait]
impl VerificationCodeSender for EmailVerificationCodeSender {
    async fn send_code(&self, email: &str, code: &str) -> Result<()> {
        let message = self.message(email, code);

        tracing::debug!(
            to = email,
            subject = %message.subject,
            template = %message.template,
            "Sending verification email"
        );

        let client = Mailgun {
            message,
            api_key: self.settings.api_key.clone(),
            domain: self.settings.domain.clone(),
        };

        client
            .async_send(MailgunRegion::US, &self.sender())
            .await
            .map_err(|e| anyhow!("mailgun rejected the verification email: {e}"))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> settings::Mailgun {
        settings::Mailgun {
            api_key: "key".into(),
            domain: "mg.example.com".into(),
            subject: "Your code".into(),
            from_address: "no-reply@example.com".into(),
            from_name: "Insight-Sphere".into(),
            template: "verification-code".into(),
        }
    }

    #[test]
    fn test_message_carries_code_as_template_var() {
        let sender = EmailVerificationCodeSender::new(settings());
        let message = sender.message("alice@example.com", "004217");

        assert_eq!(message.subject, "Your code");
        assert_eq!(message.template, "verification-code");
        assert_eq!(
            message.template_vars.get("code").map(String::as_str),
            Some("004217")
        );
        assert_eq!(message.to.len(), 1);
    }

    #[test]
    fn test_not_found_maps_to_store_not_found() {
        assert!(matches!(
            StoreError::from(DieselError::NotFound),
            StoreError::NotFound
        ));
    }
}
