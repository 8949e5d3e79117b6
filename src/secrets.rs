//! Exchange credential handling
//!
//! Credentials are read from the environment (a `.env` file is loaded at
//! startup) and held in `Zeroizing` buffers so they are wiped on drop.

use std::env;
use std::fmt;
use tracing::info;
use zeroize::Zeroizing;

pub const API_KEY_VAR: &str = "COINDCX_API_KEY";
pub const API_SECRET_VAR: &str = "COINDCX_API_SECRET";

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("Environment variable not set: {0}")]
    EnvVarNotSet(String),

    #[error("Secret validation failed: {0}")]
    ValidationFailed(String),
}

/// API key pair for the signed exchange endpoints
#[derive(Clone)]
pub struct ApiCredentials {
    pub api_key: Zeroizing<String>,
    pub api_secret: Zeroizing<String>,
}

impl ApiCredentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: Zeroizing::new(api_key.into()),
            api_secret: Zeroizing::new(api_secret.into()),
        }
    }
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// Load a non-empty secret from an environment variable
pub fn load_from_env(env_var_name: &str) -> Result<Zeroizing<String>, SecretError> {
    let value = env::var(env_var_name)
        .map(Zeroizing::new)
        .map_err(|_| SecretError::EnvVarNotSet(env_var_name.to_string()))?;
    if value.trim().is_empty() {
        return Err(SecretError::ValidationFailed(format!(
            "{} is empty",
            env_var_name
        )));
    }
    Ok(value)
}

/// Load the exchange key pair
pub fn load_credentials() -> Result<ApiCredentials, SecretError> {
    let api_key = load_from_env(API_KEY_VAR)?;
    let api_secret = load_from_env(API_SECRET_VAR)?;
    info!("✓ Loaded exchange credentials from environment");
    Ok(ApiCredentials {
        api_key,
        api_secret,
    })
}
