//! Secure credential storage via the system keychain.
//!
//! At startup, [`populate_env_from_keychain`] copies any stored credentials
//! into environment variables so [`crate::config::fetch_config`] picks them
//! up the same way as values exported in the shell.

use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Keychain service name used for all stored credentials.
const SERVICE: &str = "klinefeed";

/// Credentials managed by this module.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialKey {
    ApiToken,
    UserId,
}

impl CredentialKey {
    /// Returns the keychain entry identifier.
    pub fn keyring_id(self) -> &'static str {
        match self {
            Self::ApiToken => "api_token",
            Self::UserId => "user_id",
        }
    }

    /// Returns the environment variable name for this credential.
    pub fn env_var(self) -> &'static str {
        match self {
            Self::ApiToken => "KLINE_API_TOKEN",
            Self::UserId => "KLINE_USER_ID",
        }
    }

    pub const ALL: [CredentialKey; 2] = [Self::ApiToken, Self::UserId];
}

/// Loads a credential from the keychain, returning `None` if not set.
pub fn load(key: CredentialKey) -> Option<Zeroizing<String>> {
    let entry = keyring::Entry::new(SERVICE, key.keyring_id()).ok()?;
    match entry.get_password() {
        Ok(password) => Some(Zeroizing::new(password)),
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            warn!(key = key.keyring_id(), error = %e, "failed to read keychain entry");
            None
        }
    }
}

/// Populates environment variables from the keychain for any
/// credentials not already set in the environment.
///
/// Call this at startup before [`crate::config::fetch_config`].
pub fn populate_env_from_keychain() {
    for key in CredentialKey::ALL {
        if std::env::var(key.env_var()).is_err()
            && let Some(value) = load(key)
        {
            debug!(key = key.env_var(), "loaded credential from keychain");
            // SAFETY: called at startup before any task reads the environment
            unsafe {
                std::env::set_var(key.env_var(), value.as_str());
            }
        }
    }
}
