//! Service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `IDENTITY_DATABASE_URL` - `PostgreSQL` connection string
//! - `IDENTITY_SERVICE_TOKEN` - Bearer token for callable endpoints
//!   (min 32 chars, high entropy)
//!
//! ## Optional
//! - `IDENTITY_HOST` - Bind address (default: 127.0.0.1)
//! - `IDENTITY_PORT` - Listen port (default: 3002)
//! - `PREMIUM_WEBHOOK_SECRET` - Shared secret for `X-HO-Signature`
//!   verification. When unset, the webhook endpoint fails closed.
//! - `PROVIDER_TIMEOUT_SECS` - Bound on provider HTTP calls (default: 15)
//! - `VERIFICATION_COUNTRY` - ISO2 country hint sent to providers
//!   (default: AR)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//!
//! ## Optional (document tier - enables OCR/vision analysis)
//! - `DOCUMENT_AI_ENDPOINT` - OCR/vision provider URL
//! - `DOCUMENT_AI_API_KEY` - OCR/vision provider API key
//!
//! ## Optional (heuristic tier - enables consistency checks)
//! - `HEURISTIC_ENDPOINT` - Consistency-check provider URL
//! - `HEURISTIC_API_KEY` - Consistency-check provider API key
//!
//! ## Optional (premium tier - enables biometric verification)
//! - `PREMIUM_ENDPOINT` - Premium biometric provider URL
//! - `PREMIUM_API_KEY` - Premium biometric provider API key

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_SERVICE_TOKEN_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 15;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
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

/// Identity service configuration.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Bearer token required on callable endpoints
    pub service_token: SecretString,
    /// Shared secret for webhook signature verification (fail closed if absent)
    pub webhook_secret: Option<SecretString>,
    /// Bound on provider HTTP calls
    pub provider_timeout: Duration,
    /// ISO2 country hint forwarded to providers
    pub country: String,
    /// Document tier provider (optional - tier degrades to manual review)
    pub document_ai: Option<DocumentAiConfig>,
    /// Heuristic tier provider (optional - tier degrades to manual review)
    pub heuristic: Option<HeuristicConfig>,
    /// Premium biometric provider (optional - tier degrades to manual review)
    pub premium: Option<PremiumConfig>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "staging", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate for performance monitoring (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
}

/// OCR/vision provider configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct DocumentAiConfig {
    /// Provider endpoint URL
    pub endpoint: String,
    /// Provider API key
    pub api_key: SecretString,
}

impl std::fmt::Debug for DocumentAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentAiConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl DocumentAiConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        load_provider_pair("DOCUMENT_AI_ENDPOINT", "DOCUMENT_AI_API_KEY").map(|pair| {
            pair.map(|(endpoint, api_key)| Self { endpoint, api_key })
        })
    }
}

/// Heuristic consistency-check provider configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct HeuristicConfig {
    /// Provider endpoint URL
    pub endpoint: String,
    /// Provider API key
    pub api_key: SecretString,
}

impl std::fmt::Debug for HeuristicConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeuristicConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl HeuristicConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        load_provider_pair("HEURISTIC_ENDPOINT", "HEURISTIC_API_KEY")
            .map(|pair| pair.map(|(endpoint, api_key)| Self { endpoint, api_key }))
    }
}

/// Premium biometric provider configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct PremiumConfig {
    /// Provider endpoint URL
    pub endpoint: String,
    /// Provider API key
    pub api_key: SecretString,
}

impl std::fmt::Debug for PremiumConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PremiumConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl PremiumConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        load_provider_pair("PREMIUM_ENDPOINT", "PREMIUM_API_KEY")
            .map(|pair| pair.map(|(endpoint, api_key)| Self { endpoint, api_key }))
    }
}

impl IdentityConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("IDENTITY_DATABASE_URL")?;
        let host = get_env_or_default("IDENTITY_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("IDENTITY_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("IDENTITY_PORT", "3002")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("IDENTITY_PORT".to_string(), e.to_string()))?;

        let service_token = get_validated_secret("IDENTITY_SERVICE_TOKEN")?;
        validate_token_length(&service_token, "IDENTITY_SERVICE_TOKEN")?;

        // The webhook secret is optional at load time: the endpoint fails
        // closed when it is absent rather than the whole service refusing to
        // boot (tiers 1-2 keep working without the premium provider).
        let webhook_secret = match get_optional_env("PREMIUM_WEBHOOK_SECRET") {
            Some(value) => {
                validate_secret_strength(&value, "PREMIUM_WEBHOOK_SECRET")?;
                Some(SecretString::from(value))
            }
            None => None,
        };

        let provider_timeout_secs = get_optional_env("PROVIDER_TIMEOUT_SECS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PROVIDER_TIMEOUT_SECS);

        let country = get_env_or_default("VERIFICATION_COUNTRY", "AR");

        let document_ai = DocumentAiConfig::from_env()?;
        let heuristic = HeuristicConfig::from_env()?;
        let premium = PremiumConfig::from_env()?;

        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);

        Ok(Self {
            database_url,
            host,
            port,
            service_token,
            webhook_secret,
            provider_timeout: Duration::from_secs(provider_timeout_secs),
            country,
            document_ai,
            heuristic,
            premium,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Load an endpoint/API-key provider pair; both must be set together.
fn load_provider_pair(
    endpoint_key: &str,
    api_key_key: &str,
) -> Result<Option<(String, SecretString)>, ConfigError> {
    let endpoint = get_optional_env(endpoint_key);
    let api_key = get_optional_env(api_key_key);

    match (endpoint, api_key) {
        (Some(endpoint), Some(key)) => {
            validate_secret_strength(&key, api_key_key)?;
            Ok(Some((endpoint, SecretString::from(key))))
        }
        (None, None) => Ok(None),
        _ => Err(ConfigError::InvalidEnvVar(
            format!("{endpoint_key}/{api_key_key}"),
            "both endpoint and API key must be set together".to_string(),
        )),
    }
}

/// Validate that the service token meets minimum length requirements.
fn validate_token_length(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SERVICE_TOKEN_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SERVICE_TOKEN_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
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

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    // Check blocklist
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    // Check entropy (real secrets like API keys have high entropy)
    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// A config literal for tests that never touches the environment.
    fn test_config() -> IdentityConfig {
        IdentityConfig {
            database_url: SecretString::from("postgres://localhost/test"),
            host: "127.0.0.1".parse().unwrap(),
            port: 3002,
            service_token: SecretString::from("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6d"),
            webhook_secret: Some(SecretString::from("wH8@kD3$nV6!qR1%tZ5&mB9*xF2^cJ7e")),
            provider_timeout: Duration::from_secs(15),
            country: "AR".to_string(),
            document_ai: None,
            heuristic: None,
            premium: None,
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 1.0,
        }
    }

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_single_char() {
        // All same character = 0 entropy
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_high() {
        let entropy = shannon_entropy("aB3$xY9!mK2@nL5#");
        assert!(entropy > 3.3);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-webhook-key-here", "TEST_VAR");
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        let result = validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_token_length_too_short() {
        let secret = SecretString::from("short");
        assert!(validate_token_length(&secret, "TEST_TOKEN").is_err());
    }

    #[test]
    fn test_socket_addr() {
        let config = test_config();
        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 3002);
    }

    #[test]
    fn test_provider_config_debug_redacts_secrets() {
        let config = DocumentAiConfig {
            endpoint: "https://vision.example.net/v1/analyze".to_string(),
            api_key: SecretString::from("super_secret_provider_key"),
        };

        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("vision.example.net"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_provider_key"));
    }

    #[test]
    fn test_premium_config_debug_redacts_secrets() {
        let config = PremiumConfig {
            endpoint: "https://biometrics.example.net/start".to_string(),
            api_key: SecretString::from("super_secret_biometric_key"),
        };

        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("biometrics.example.net"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_biometric_key"));
    }
}
