//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Backend selection
//! - `VINTAGE_BACKEND` - `firebase` (default) or `memory`
//!
//! ## Required for `firebase`
//! - `FIREBASE_API_KEY` - Web API key of the Firebase project
//! - `FIREBASE_PROJECT_ID` - Project id (e.g. vintage-app-1aeb6)
//!
//! ## Optional
//! - `FIREBASE_DATABASE` - Firestore database id (default: `(default)`)
//! - `FIREBASE_AUTH_URL` - Identity Toolkit base URL (emulator override)
//! - `FIREBASE_TOKEN_URL` - Secure Token base URL (emulator override)
//! - `FIREBASE_FIRESTORE_URL` - Firestore base URL (emulator override)
//! - `VINTAGE_SESSION_FILE` - Where the signed-in session is kept
//!   (default: `.vintage-session.json`)
//! - `VINTAGE_HTTP_TIMEOUT_SECS` - Per-request timeout (default: 15)
//! - `VINTAGE_LOG_FORMAT` - `pretty` (default) or `json`
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

const DEFAULT_AUTH_URL: &str = "https://identitytoolkit.googleapis.com/v1/";
const DEFAULT_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1/";
const DEFAULT_FIRESTORE_URL: &str = "https://firestore.googleapis.com/v1/";
const DEFAULT_SESSION_FILE: &str = ".vintage-session.json";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;

const MIN_API_KEY_LENGTH: usize = 30;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "paste",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Which backend the store talks to.
#[derive(Debug, Clone)]
pub enum BackendKind {
    Firebase(FirebaseConfig),
    Memory,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Storefront client configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Backend selection and its settings
    pub backend: BackendKind,
    /// Where the signed-in session is persisted between runs
    pub session_file: PathBuf,
    /// Per-request HTTP timeout
    pub http_timeout: Duration,
    /// Log output format
    pub log_format: LogFormat,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Firebase project configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct FirebaseConfig {
    /// Web API key
    pub api_key: SecretString,
    /// Project id
    pub project_id: String,
    /// Firestore database id
    pub database: String,
    /// Identity Toolkit base URL (ends with `/`)
    pub auth_url: Url,
    /// Secure Token base URL (ends with `/`)
    pub token_url: Url,
    /// Firestore base URL (ends with `/`)
    pub firestore_url: Url,
}

impl std::fmt::Debug for FirebaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseConfig")
            .field("api_key", &"[REDACTED]")
            .field("project_id", &self.project_id)
            .field("database", &self.database)
            .field("auth_url", &self.auth_url.as_str())
            .field("token_url", &self.token_url.as_str())
            .field("firestore_url", &self.firestore_url.as_str())
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the API key fails validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let backend = match get_env_or_default("VINTAGE_BACKEND", "firebase")
            .to_lowercase()
            .as_str()
        {
            "firebase" => BackendKind::Firebase(FirebaseConfig::from_env()?),
            "memory" => BackendKind::Memory,
            other => {
                return Err(ConfigError::InvalidEnvVar(
                    "VINTAGE_BACKEND".to_string(),
                    format!("unknown backend '{other}' (expected firebase or memory)"),
                ));
            }
        };

        let session_file =
            PathBuf::from(get_env_or_default("VINTAGE_SESSION_FILE", DEFAULT_SESSION_FILE));

        let timeout_secs = get_env_or_default(
            "VINTAGE_HTTP_TIMEOUT_SECS",
            &DEFAULT_HTTP_TIMEOUT_SECS.to_string(),
        )
        .parse::<u64>()
        .map_err(|e| {
            ConfigError::InvalidEnvVar("VINTAGE_HTTP_TIMEOUT_SECS".to_string(), e.to_string())
        })?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "VINTAGE_HTTP_TIMEOUT_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let log_format = parse_log_format(&get_env_or_default("VINTAGE_LOG_FORMAT", "pretty"))?;

        Ok(Self {
            backend,
            session_file,
            http_timeout: Duration::from_secs(timeout_secs),
            log_format,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// A configuration for the in-memory backend with defaults everywhere.
    #[must_use]
    pub fn memory() -> Self {
        Self {
            backend: BackendKind::Memory,
            session_file: PathBuf::from(DEFAULT_SESSION_FILE),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            log_format: LogFormat::Pretty,
            sentry_dsn: None,
            sentry_environment: None,
        }
    }
}

impl FirebaseConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let auth_url = get_optional_env("FIREBASE_AUTH_URL");
        // Emulators accept any key, so only production endpoints get the
        // strength check.
        let api_key = if auth_url.is_some() {
            get_required_secret("FIREBASE_API_KEY")?
        } else {
            get_validated_api_key("FIREBASE_API_KEY")?
        };

        Ok(Self {
            api_key,
            project_id: get_required_env("FIREBASE_PROJECT_ID")?,
            database: get_env_or_default("FIREBASE_DATABASE", "(default)"),
            auth_url: parse_base_url(
                "FIREBASE_AUTH_URL",
                auth_url.as_deref().unwrap_or(DEFAULT_AUTH_URL),
            )?,
            token_url: parse_base_url(
                "FIREBASE_TOKEN_URL",
                &get_env_or_default("FIREBASE_TOKEN_URL", DEFAULT_TOKEN_URL),
            )?,
            firestore_url: parse_base_url(
                "FIREBASE_FIRESTORE_URL",
                &get_env_or_default("FIREBASE_FIRESTORE_URL", DEFAULT_FIRESTORE_URL),
            )?,
        })
    }

    /// Configuration pointing at the production Firebase endpoints.
    ///
    /// # Panics
    ///
    /// Never: the default endpoint URLs are constants known to parse.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn production(project_id: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            api_key,
            project_id: project_id.into(),
            database: "(default)".to_string(),
            auth_url: Url::parse(DEFAULT_AUTH_URL).expect("valid default auth URL"),
            token_url: Url::parse(DEFAULT_TOKEN_URL).expect("valid default token URL"),
            firestore_url: Url::parse(DEFAULT_FIRESTORE_URL).expect("valid default firestore URL"),
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required environment variable as a secret.
fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    Ok(SecretString::from(value))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse a base URL, making sure it ends with `/` so relative joins append.
fn parse_base_url(var_name: &str, value: &str) -> Result<Url, ConfigError> {
    let normalized = if value.ends_with('/') {
        value.to_string()
    } else {
        format!("{value}/")
    };
    let url = Url::parse(&normalized)
        .map_err(|e| ConfigError::InvalidEnvVar(var_name.to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            var_name.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    Ok(url)
}

fn parse_log_format(value: &str) -> Result<LogFormat, ConfigError> {
    match value.to_lowercase().as_str() {
        "pretty" | "" => Ok(LogFormat::Pretty),
        "json" => Ok(LogFormat::Json),
        other => Err(ConfigError::InvalidEnvVar(
            "VINTAGE_LOG_FORMAT".to_string(),
            format!("unknown format '{other}' (expected pretty or json)"),
        )),
    }
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a key is not a placeholder, is long enough, and has
/// sufficient entropy.
fn validate_api_key(key: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = key.expose_secret();
    let lower = value.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    if value.len() < MIN_API_KEY_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {MIN_API_KEY_LENGTH} characters (got {})",
                value.len()
            ),
        ));
    }

    let entropy = shannon_entropy(value);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Copy the key from the Firebase console."
            ),
        ));
    }

    Ok(())
}

/// Load and validate an API key from environment.
fn get_validated_api_key(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_secret(key)?;
    validate_api_key(&value, key)?;
    Ok(value)
}
