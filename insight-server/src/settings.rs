//! Settings / Configuration.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::{path::PathBuf, time::Duration};

/// Names of environments for insight-server.
/// Overrides serialization to force lower case in settings and
/// environment variables
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AppEnvironment {
    /// Local environment (local testing).
    Local,
    /// Official Develop environment.
    Dev,
    /// Official environment.
    Staging,
    /// Official Production environment.
    Prod,
}

/// Implement display to force environment to lower case
impl std::fmt::Display for AppEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format!("{self:?}").to_lowercase())
    }
}

impl AppEnvironment {
    /// Whether logs should be emitted as JSON lines
    pub fn json_logs(&self) -> bool {
        matches!(self, Self::Staging | Self::Prod)
    }
}

/// Database settings.
#[derive(Clone, Debug, Deserialize)]
pub struct Database {
    /// Database URL
    pub url: String,
    /// Connect Timeout
    pub connect_timeout: u64,
}

/// Server settings.
#[derive(Clone, Debug, Deserialize)]
pub struct Server {
    /// Server [AppEnvironment].
    pub environment: AppEnvironment,
    /// Server port.
    pub port: u16,
    /// Server metrics port.
    pub metrics_port: u16,
    /// Server timeout in milliseconds.
    pub timeout_ms: u64,
}

/// [Mailgun] settings.
///
/// [Mailgun]: https://www.mailgun.com/
#[derive(Clone, Deserialize)]
pub struct Mailgun {
    /// Mailgun API key.
    pub api_key: String,
    /// Mailgun domain.
    pub domain: String,
    /// Mailgun Subject
    pub subject: String,
    /// Mailgun From Address
    pub from_address: String,
    /// Mailgun From Name
    pub from_name: String,
    /// Mailgun Template
    pub template: String,
}

impl std::fmt::Debug for Mailgun {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("Mailgun")
            .field("domain", &self.domain)
            .field("subject", &self.subject)
            .field("from_address", &self.from_address)
            .field("from_name", &self.from_name)
            .field("template", &self.template)
            .finish_non_exhaustive()
    }
}

/// Verification code settings.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Verification {
    /// How long an issued code stays valid, in seconds.
    #[serde(default = "default_code_ttl_secs")]
    pub code_ttl_secs: u64,
    /// Minimum time between two issuances for the same account, in seconds.
    /// `0` disables the cooldown.
    #[serde(default = "default_resend_cooldown_secs")]
    pub resend_cooldown_secs: u64,
}

fn default_code_ttl_secs() -> u64 {
    60 * 60
}

fn default_resend_cooldown_secs() -> u64 {
    59
}

impl Default for Verification {
    fn default() -> Self {
        Self {
            code_ttl_secs: default_code_ttl_secs(),
            resend_cooldown_secs: default_resend_cooldown_secs(),
        }
    }
}

impl Verification {
    /// Convert `code_ttl_secs` to a [chrono::Duration].
    pub fn code_ttl(&self) -> chrono::Duration {
        seconds(self.code_ttl_secs)
    }

    /// Convert `resend_cooldown_secs` to a [chrono::Duration].
    pub fn resend_cooldown(&self) -> chrono::Duration {
        seconds(self.resend_cooldown_secs)
    }
}

fn seconds(secs: u64) -> chrono::Duration {
    chrono::Duration::from_std(Duration::from_secs(secs)).unwrap_or(chrono::Duration::max_value())
}

#[derive(Clone, Debug, Deserialize)]
/// Application settings.
pub struct Settings {
    /// Database settings
    pub database: Database,
    /// Server settings
    pub server: Server,
    /// Mailgun settings
    pub mailgun: Mailgun,
    /// Verification code settings
    #[serde(default)]
    pub verification: Verification,
    /// The path where the settings file resides.
    /// This can't actually be configured in the settings file itself, for obvious reasons.
    #[serde(skip)]
    pub path: Option<PathBuf>,
}

impl Settings {
    /// Load settings.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = config_path
            .unwrap_or(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/settings.toml"));
        let s = Config::builder()
            .add_source(File::with_name(&path.as_path().display().to_string()))
            .add_source(environment())
            .build()?;
        let mut settings: Self = s.try_deserialize()?;
        settings.path = Some(path);
        Ok(settings)
    }
}

/// Environment variables override settings file keys. Sections are split
/// with a double underscore so multi-word keys stay intact.
/// e.g. [verification] code_ttl_secs=60
/// is injected with INSIGHT_SERVER_VERIFICATION__CODE_TTL_SECS=60
fn environment() -> Environment {
    Environment::with_prefix("INSIGHT_SERVER")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use testresult::TestResult;

    #[test]
    fn test_default_verification_settings() {
        let settings = Verification::default();

        assert_eq!(settings.code_ttl(), chrono::Duration::hours(1));
        assert_eq!(settings.resend_cooldown(), chrono::Duration::seconds(59));
    }

    #[test]
    fn test_load_bundled_settings() -> TestResult {
        let settings = Settings::load(None)?;

        assert_eq!(settings.server.environment, AppEnvironment::Local);
        assert_eq!(settings.verification, Verification::default());
        assert!(settings.path.is_some());

        Ok(())
    }

    #[test]
    fn test_environment_overrides_multi_word_keys() -> TestResult {
        let vars = [
            ("INSIGHT_SERVER_VERIFICATION__CODE_TTL_SECS", "600"),
            ("INSIGHT_SERVER_VERIFICATION__RESEND_COOLDOWN_SECS", "0"),
            ("INSIGHT_SERVER_SERVER__METRICS_PORT", "9999"),
            ("INSIGHT_SERVER_DATABASE__URL", "postgres://db/insight"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/settings.toml");
        let settings: Settings = Config::builder()
            .add_source(File::from(path))
            .add_source(environment().source(Some(vars)))
            .build()?
            .try_deserialize()?;

        assert_eq!(settings.verification.code_ttl(), chrono::Duration::minutes(10));
        assert_eq!(settings.verification.resend_cooldown(), chrono::Duration::zero());
        assert_eq!(settings.server.metrics_port, 9999);
        assert_eq!(settings.database.url, "postgres://db/insight");

        Ok(())
    }

    #[test]
    fn test_mailgun_debug_hides_api_key() {
        let mailgun = Mailgun {
            api_key: "key-secret".into(),
            domain: "mg.example.com".into(),
            subject: "Verify".into(),
            from_address: "no-reply@example.com".into(),
            from_name: "Insight Sphere".into(),
            template: "verification-code".into(),
        };

        assert!(!format!("{mailgun:?}").contains("key-secret"));
    }

    #[test]
    fn test_environment_display() {
        assert_eq!(AppEnvironment::Staging.to_string(), "staging");
        assert!(AppEnvironment::Prod.json_logs());
        assert!(!AppEnvironment::Local.json_logs());
    }
}
