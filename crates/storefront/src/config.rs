//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Optional service credentials
//! - `RESEND_API_KEY` - Resend API key for access-code email
//! - `RESEND_FROM` - From address for access-code email (default: `Brisco <access@brisclothing.com>`)
//! - `SUPABASE_URL` - Supabase project URL for lead capture
//! - `SUPABASE_ANON_KEY` - Supabase anon key for lead capture
//! - `STRIPE_SECRET_KEY` - Stripe secret key for payment
//!
//! A service with missing credentials is disabled, not fatal: the engines
//! treat email-send and lead-capture failures as soft, and the payment
//! route reports the gateway as unavailable.
//!
//! ## Optional server settings
//! - `BRISCO_HOST` - Bind address (default: 127.0.0.1)
//! - `BRISCO_PORT` - Listen port (default: 3000)
//! - `BRISCO_BASE_URL` - Public URL (default: http://localhost:3000)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment tag

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

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

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct BriscoConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: String,
    /// Resend configuration, if the access-code mailer is enabled
    pub resend: Option<ResendConfig>,
    /// Supabase configuration, if lead capture is enabled
    pub supabase: Option<SupabaseConfig>,
    /// Stripe configuration, if the payment gateway is enabled
    pub stripe: Option<StripeConfig>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag (e.g., production, staging)
    pub sentry_environment: Option<String>,
}

/// Resend access-code email configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct ResendConfig {
    /// Resend API key
    pub api_key: SecretString,
    /// From address for access-code email
    pub from: String,
}

impl std::fmt::Debug for ResendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResendConfig")
            .field("api_key", &"[REDACTED]")
            .field("from", &self.from)
            .finish()
    }
}

/// Supabase lead-capture configuration.
#[derive(Clone)]
pub struct SupabaseConfig {
    /// Supabase project URL (e.g., <https://abc.supabase.co>)
    pub url: String,
    /// Supabase anon key
    pub anon_key: SecretString,
}

impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("anon_key", &"[REDACTED]")
            .finish()
    }
}

/// Stripe payment configuration.
#[derive(Clone)]
pub struct StripeConfig {
    /// Stripe secret key
    pub secret_key: SecretString,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

impl BriscoConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if present variables are invalid or if
    /// secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = get_env_or_default("BRISCO_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("BRISCO_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("BRISCO_PORT", "3000")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("BRISCO_PORT".to_string(), e.to_string()))?;
        let base_url = get_env_or_default("BRISCO_BASE_URL", "http://localhost:3000");

        Ok(Self {
            host,
            port,
            base_url,
            resend: ResendConfig::from_env()?,
            supabase: SupabaseConfig::from_env()?,
            stripe: StripeConfig::from_env()?,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl ResendConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(api_key) = get_optional_secret("RESEND_API_KEY")? else {
            return Ok(None);
        };
        Ok(Some(Self {
            api_key,
            from: get_env_or_default("RESEND_FROM", "Brisco <access@brisclothing.com>"),
        }))
    }
}

impl SupabaseConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(url) = get_optional_env("SUPABASE_URL") else {
            return Ok(None);
        };
        let Some(anon_key) = get_optional_secret("SUPABASE_ANON_KEY")? else {
            return Err(ConfigError::MissingEnvVar("SUPABASE_ANON_KEY".to_string()));
        };
        Ok(Some(Self { url, anon_key }))
    }
}

impl StripeConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        Ok(get_optional_secret("STRIPE_SECRET_KEY")?.map(|secret_key| Self { secret_key }))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
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

/// Load and validate an optional secret from environment.
fn get_optional_secret(key: &str) -> Result<Option<SecretString>, ConfigError> {
    let Some(value) = get_optional_env(key) else {
        return Ok(None);
    };
    validate_secret_strength(&value, key)?;
    Ok(Some(SecretString::from(value)))
}
