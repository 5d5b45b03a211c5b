//! Request and response data types that are common and useful between clients of and the insight server

use crate::username::valid_username;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// Sign-up request struct
#[derive(Deserialize, Serialize, Validate, Clone, ToSchema)]
pub struct SignUpRequest {
    /// The username to claim
    #[validate(custom = "valid_username")]
    pub username: String,
    /// The email address the verification code is sent to
    #[validate(email)]
    pub email: String,
    /// The account password in plain text
    #[validate(length(min = 6, message = "password must be at least 6 characters"))]
    pub password: String,
}

impl std::fmt::Debug for SignUpRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignUpRequest")
            .field("username", &self.username)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Verification request struct
#[derive(Deserialize, Serialize, Validate, Clone, Debug, ToSchema)]
pub struct VerifyCodeRequest {
    /// The username that signed up
    pub username: String,
    /// The code that was emailed to the user
    #[validate(length(equal = 6))]
    pub code: String,
}

/// Request for a fresh verification code
#[derive(Deserialize, Serialize, Clone, Debug, ToSchema)]
pub struct ResendCodeRequest {
    /// The username that signed up
    pub username: String,
}

/// Query parameters for the username availability check
#[derive(Deserialize, Serialize, Validate, Clone, Debug, IntoParams)]
pub struct UsernameQuery {
    /// The username to check
    #[validate(custom = "valid_username")]
    pub username: String,
}

/// Sign-in request struct
#[derive(Deserialize, Serialize, Clone, ToSchema)]
pub struct SignInRequest {
    /// Username or email address
    pub identifier: String,
    /// The account password in plain text
    pub password: String,
}

impl std::fmt::Debug for SignInRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignInRequest")
            .field("identifier", &self.identifier)
            .finish_non_exhaustive()
    }
}

/// Generic response carrying a human-readable message
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ToSchema)]
pub struct ApiResponse {
    /// Whether the request was successful
    pub success: bool,
    /// Message meant for display
    pub message: String,
}

impl ApiResponse {
    /// A successful response with the given message
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

/// Response to a sign-up
#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
pub struct SignUpResponse {
    /// Whether the sign-up was successful
    pub success: bool,
    /// Message meant for display
    pub message: String,
    /// The username the code was issued for.
    ///
    /// This differs from the requested username when the email address
    /// already belonged to a pending account.
    pub username: String,
}

/// Information about an account
#[derive(Deserialize, Serialize, Clone, Debug, ToSchema)]
pub struct AccountResponse {
    /// The account's username
    pub username: String,
    /// The account's email address
    pub email: String,
    /// Whether the email address was verified
    pub verified: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sign_up_validation() {
        let valid = SignUpRequest {
            username: "alice".into(),
            email: "alice@example.com".into(),
            password: "hunter22".into(),
        };
        assert!(valid.validate().is_ok());

        let bad_username = SignUpRequest {
            username: "al ice".into(),
            ..valid.clone()
        };
        assert!(bad_username.validate().is_err());

        let bad_email = SignUpRequest {
            email: "not-an-email".into(),
            ..valid.clone()
        };
        assert!(bad_email.validate().is_err());

        let short_password = SignUpRequest {
            password: "12345".into(),
            ..valid
        };
        assert!(short_password.validate().is_err());
    }

    #[test]
    fn test_sign_up_debug_hides_password() {
        let request = SignUpRequest {
            username: "alice".into(),
            email: "alice@example.com".into(),
            password: "hunter22".into(),
        };
        assert!(!format!("{request:?}").contains("hunter22"));
    }

    #[test]
    fn test_verify_code_validation() {
        let request = VerifyCodeRequest {
            username: "alice".into(),
            code: "123456".into(),
        };
        assert!(request.validate().is_ok());

        let request = VerifyCodeRequest {
            username: "alice".into(),
            code: "12345".into(),
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_api_response_shape() {
        assert_eq!(
            serde_json::to_value(ApiResponse::success("Valid username")).unwrap(),
            json!({ "success": true, "message": "Valid username" })
        );
    }
}
