//! Generic result/error resprentation(s).

use crate::{
    setups::{StoreError, UniqueField},
    verification::VerificationError,
};
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use utoipa::ToSchema;
use validator::ValidationErrors;

/// Standard return type out of routes / handlers
pub type AppResult<T> = std::result::Result<T, AppError>;

/// Encodes [JSONAPI error object responses](https://jsonapi.org/examples/#error-objects).
///
/// JSONAPI error object -  ALL Fields are technically optional.
///
/// This struct uses the following guidelines:
///
/// 1. Always encode the StatusCode of the response
/// 2. Set the title to the `canonical_reason` of the status code.
///    JSON:API says this should NOT change over time.
/// 3. For unrecoverable errors, encode the detail as the to_string of the error
#[derive(ToSchema, thiserror::Error, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct AppError {
    #[schema(value_type = u16, example = 404)]
    #[serde(with = "crate::error::serde_status_code")]
    pub(crate) status: StatusCode,
    #[schema(example = "User not found")]
    pub(crate) detail: Option<String>,
    #[schema(example = "Not Found")]
    pub(crate) title: Option<String>,
}

impl AppError {
    /// New instance of [AppError].
    pub fn new<M: ToString>(status_code: StatusCode, message: Option<M>) -> AppError {
        Self {
            status: status_code,
            title: Self::canonical_reason_to_string(&status_code),
            detail: message.map(|m| m.to_string()),
        }
    }

    /// The HTTP status this error is rendered with
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The human readable explanation, if any
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    fn canonical_reason_to_string(status_code: &StatusCode) -> Option<String> {
        status_code.canonical_reason().map(|r| r.to_string())
    }
}

#[derive(Debug, Deserialize, Serialize)]
/// Error in JSON API response format.
pub struct ErrorResponse {
    pub(crate) errors: Vec<AppError>,
}

impl From<AppError> for ErrorResponse {
    fn from(e: AppError) -> Self {
        Self { errors: vec![e] }
    }
}

impl From<AppError> for (StatusCode, Json<ErrorResponse>) {
    fn from(app_error: AppError) -> Self {
        (app_error.status, Json(app_error.into()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let error_response: (StatusCode, Json<ErrorResponse>) = self.into();
        error_response.into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        let err = match err.downcast::<VerificationError>() {
            Ok(err) => return Self::from(err),
            Err(e) => e,
        };

        let err = match err.downcast::<ValidationErrors>() {
            Ok(err) => return Self::from(err),
            Err(e) => e,
        };

        let err = match err.downcast::<diesel::result::Error>() {
            Ok(err) => return Self::from(err),
            Err(e) => e,
        };

        Self::new(StatusCode::INTERNAL_SERVER_ERROR, Some(err))
    }
}

impl From<VerificationError> for AppError {
    fn from(err: VerificationError) -> Self {
        match err {
            VerificationError::NotFound => Self::new(StatusCode::NOT_FOUND, Some("User not found")),
            VerificationError::AlreadyVerified => Self::new(
                StatusCode::CONFLICT,
                Some("Account is already verified"),
            ),
            VerificationError::CodeExpired => Self::new(
                StatusCode::BAD_REQUEST,
                Some("Verification code has expired. Please request a new code."),
            ),
            VerificationError::CodeMismatch => {
                Self::new(StatusCode::BAD_REQUEST, Some("Incorrect verification code"))
            }
            VerificationError::ResendTooSoon { retry_after } => Self::new(
                StatusCode::TOO_MANY_REQUESTS,
                Some(format!(
                    "Please wait {} seconds before requesting a new code",
                    retry_after.num_seconds().max(1)
                )),
            ),
            VerificationError::DeliveryFailed(_) => Self::new(
                StatusCode::BAD_GATEWAY,
                Some("Failed to send verification email. Please request a new code."),
            ),
            VerificationError::Persistence(err) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, Some(err))
            }
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict {
                field: UniqueField::Username,
            } => Self::new(StatusCode::CONFLICT, Some("Username is already taken")),
            StoreError::Conflict {
                field: UniqueField::Email,
            } => Self::new(
                StatusCode::CONFLICT,
                Some("User already exists with this email"),
            ),
            StoreError::NotFound => Self::new(StatusCode::NOT_FOUND, Some("User not found")),
            StoreError::Backend(err) => Self::new(StatusCode::INTERNAL_SERVER_ERROR, Some(err)),
        }
    }
}

impl From<diesel::result::Error> for AppError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::NotFound => {
                Self::new(StatusCode::NOT_FOUND, Some("Resource Not Found"))
            }
            diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                info,
            ) => Self::new(
                StatusCode::CONFLICT,
                Some(match info.details() {
                    Some(details) => format!("{} ({details})", info.message()),
                    None => info.message().to_string(),
                }),
            ),
            _ => Self::new(StatusCode::INTERNAL_SERVER_ERROR, Some(err)),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        Self::new(StatusCode::BAD_REQUEST, Some(err))
    }
}

impl From<JsonRejection> for AppError {
    fn from(value: JsonRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, Some(value.body_text()))
    }
}

impl From<QueryRejection> for AppError {
    fn from(value: QueryRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, Some(value.body_text()))
    }
}

impl From<Infallible> for AppError {
    fn from(the_impossible: Infallible) -> Self {
        match the_impossible {}
    }
}

/// Serialize/Deserializer for status codes.
///
/// JSON:API requires the status code to
/// be encoded as a STRING.
///
/// We could have used http_serde, but it encodes the status code as a NUMBER.
pub mod serde_status_code {
    use http::StatusCode;
    use serde::{de::Unexpected, Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize [StatusCode]s.
    pub fn serialize<S: Serializer>(status: &StatusCode, ser: S) -> Result<S::Ok, S::Error> {
        String::serialize(&status.as_u16().to_string(), ser)
    }

    /// Deserialize [StatusCode]s.
    pub fn deserialize<'de, D>(de: D) -> Result<StatusCode, D::Error>
    where
        D: Deserializer<'de>,
    {
        let str = String::deserialize(de)?;
        StatusCode::from_bytes(str.as_bytes()).map_err(|_| {
            serde::de::Error::invalid_value(
                Unexpected::Str(str.as_str()),
                &"A valid http status code",
            )
        })
    }
}

// Needed to support thiserror::Error, outputs debug for AppError
impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[cfg(test)]
/// Parse the app error out of the json body
pub async fn parse_error(response: Response) -> AppError {
    let body_bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let mut err_response: ErrorResponse = serde_json::from_slice(&body_bytes).unwrap();
    err_response.errors.remove(0)
}
