use super::schema::Config;
use anyhow::{Context, Result};
#[cfg(feature = "keyring-store")]
use tracing::debug;

macro_rules! define_credentials {
    ($( $name:literal, $env:literal => $($path:ident).+ );* $(;)?) => {
        /// All known credential slot names.
        pub const CREDENTIAL_NAMES: &[&str] = &[$($name),*];

        /// (slot name, env var name) pairs.
        pub const CREDENTIAL_ENV_VARS: &[(&str, &str)] = &[$(($name, $env)),*];

        /// Get a mutable reference to a credential field by slot name.
        pub fn get_credential_field<'a>(config: &'a mut Config, name: &str) -> Option<&'a mut String> {
            match name {
                $($name => Some(&mut config.$($path).+),)*
                _ => None,
            }
        }

        /// Get the current value of a credential field by slot name.
        pub fn get_credential_value<'a>(config: &'a Config, name: &str) -> Option<&'a str> {
            match name {
                $($name => Some(config.$($path).+.as_str()),)*
                _ => None,
            }
        }

        /// Apply environment variable overrides.
        ///
        /// Any `BUCKLEY_*` env var that is set and non-empty overwrites the
        /// corresponding config field, allowing secrets to be injected without
        /// touching the config file (containers, CI).
        pub fn apply_env_overrides(config: &mut Config) {
            $(
                if let Ok(val) = std::env::var($env) {
                    if !val.is_empty() {
                        config.$($path).+ = val;
                    }
                }
            )*
        }
    };
}

define_credentials! {
    "anthropic-api-key", "BUCKLEY_ANTHROPIC_API_KEY" => providers.anthropic.api_key;
}

// ---------------------------------------------------------------------------
// Keyring — OS keychain credential storage
// ---------------------------------------------------------------------------

#[cfg(feature = "keyring-store")]
pub fn apply_keyring_overrides(config: &mut Config) {
    let values: Vec<(&str, String)> = CREDENTIAL_NAMES
        .iter()
        .filter_map(|&name| {
            let current = get_credential_value(config, name)?;
            if !current.is_empty() {
                return None;
            }
            let entry = match keyring::Entry::new("buckley", name) {
                Ok(e) => e,
                Err(e) => {
                    debug!("keyring unavailable for {name}: {e}");
                    return None;
                }
            };
            match entry.get_password() {
                Ok(secret) if !secret.is_empty() => {
                    debug!("loaded {name} from keyring");
                    Some((name, secret))
                }
                _ => None,
            }
        })
        .collect();

    for (name, value) in values {
        if let Some(field) = get_credential_field(config, name) {
            *field = value;
        }
    }
}

#[cfg(feature = "keyring-store")]
pub fn keyring_set(name: &str, value: &str) -> Result<()> {
    let entry = keyring::Entry::new("buckley", name).context("keyring unavailable")?;
    entry
        .set_password(value)
        .context("failed to store credential in keyring")?;
    Ok(())
}

#[cfg(feature = "keyring-store")]
pub fn keyring_delete(name: &str) -> Result<()> {
    let entry = keyring::Entry::new("buckley", name).context("keyring unavailable")?;
    entry
        .delete_credential()
        .context("failed to delete credential from keyring")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Source detection
// ---------------------------------------------------------------------------

/// Detect which backend provided a credential value.
pub fn detect_source(name: &str, config: &Config) -> &'static str {
    let env_var = CREDENTIAL_ENV_VARS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, e)| *e);

    if let Some(var) = env_var
        && let Ok(val) = std::env::var(var)
        && !val.is_empty()
    {
        return "env";
    }

    if let Some(val) = get_credential_value(config, name)
        && !val.is_empty()
    {
        return "config";
    }

    "[empty]"
}
