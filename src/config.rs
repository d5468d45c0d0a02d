//! Configuration types.

use secrecy::SecretString;

use crate::error::ConfigError;

/// Environment variable holding the service endpoint.
pub const URL_VAR: &str = "SERVICE_URL";
/// Environment variable holding the service access key.
pub const ACCESS_KEY_VAR: &str = "SERVICE_ACCESS_KEY";

/// Older names still accepted, checked in order after the primary name.
const URL_FALLBACKS: &[&str] = &["SUPABASE_URL"];
const ACCESS_KEY_FALLBACKS: &[&str] = &["SUPABASE_ANON_KEY", "SUPABASE_KEY"];

/// Connection settings for the remote table service.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Base URL of the service, e.g. `https://xyz.example.co`.
    pub url: String,
    /// Access key sent as both `apikey` and bearer token.
    pub access_key: SecretString,
}

impl StoreConfig {
    pub fn new(url: impl Into<String>, access_key: impl Into<String>) -> Result<Self, ConfigError> {
        let url = url.into();
        let access_key = access_key.into();
        Self::from_lookup(|key| match key {
            URL_VAR => Some(url.clone()),
            ACCESS_KEY_VAR => Some(access_key.clone()),
            _ => None,
        })
    }

    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = first_present(&lookup, URL_VAR, URL_FALLBACKS).ok_or_else(|| {
            ConfigError::MissingRequired {
                key: URL_VAR.to_string(),
                hint: "Set it to the base URL of the table service.".to_string(),
            }
        })?;

        let access_key = first_present(&lookup, ACCESS_KEY_VAR, ACCESS_KEY_FALLBACKS)
            .ok_or_else(|| ConfigError::MissingRequired {
                key: ACCESS_KEY_VAR.to_string(),
                hint: "Set it to the service's anon or service-role key.".to_string(),
            })?;

        validate_url(&url)?;

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            access_key: SecretString::from(access_key),
        })
    }
}

/// First non-empty (after trimming) value among `primary` and `fallbacks`.
fn first_present<F>(lookup: &F, primary: &str, fallbacks: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    std::iter::once(primary)
        .chain(fallbacks.iter().copied())
        .filter_map(|key| lookup(key))
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

fn validate_url(url: &str) -> Result<(), ConfigError> {
    let parsed = reqwest::Url::parse(url).map_err(|e| ConfigError::InvalidValue {
        key: URL_VAR.to_string(),
        message: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::InvalidValue {
            key: URL_VAR.to_string(),
            message: format!("unsupported scheme '{other}', expected http or https"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn loads_primary_names() {
        let config = StoreConfig::from_lookup(lookup_from(&[
            ("SERVICE_URL", "https://demo.example.co/"),
            ("SERVICE_ACCESS_KEY", "anon-key"),
        ]))
        .unwrap();
        assert_eq!(config.url, "https://demo.example.co");
        assert_eq!(config.access_key.expose_secret(), "anon-key");
    }

    #[test]
    fn falls_back_to_legacy_names() {
        let config = StoreConfig::from_lookup(lookup_from(&[
            ("SUPABASE_URL", "https://legacy.example.co"),
            ("SUPABASE_KEY", "legacy-key"),
        ]))
        .unwrap();
        assert_eq!(config.url, "https://legacy.example.co");
        assert_eq!(config.access_key.expose_secret(), "legacy-key");
    }

    #[test]
    fn anon_key_preferred_over_plain_key() {
        let config = StoreConfig::from_lookup(lookup_from(&[
            ("SUPABASE_URL", "https://legacy.example.co"),
            ("SUPABASE_ANON_KEY", "anon"),
            ("SUPABASE_KEY", "plain"),
        ]))
        .unwrap();
        assert_eq!(config.access_key.expose_secret(), "anon");
    }

    #[test]
    fn missing_url_is_fatal() {
        let err = StoreConfig::from_lookup(lookup_from(&[("SERVICE_ACCESS_KEY", "k")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { ref key, .. } if key == "SERVICE_URL"));
    }

    #[test]
    fn blank_key_counts_as_missing() {
        let err = StoreConfig::from_lookup(lookup_from(&[
            ("SERVICE_URL", "https://demo.example.co"),
            ("SERVICE_ACCESS_KEY", "   "),
        ]))
        .unwrap_err();
        assert!(
            matches!(err, ConfigError::MissingRequired { ref key, .. } if key == "SERVICE_ACCESS_KEY")
        );
    }

    #[test]
    fn rejects_non_http_url() {
        let err = StoreConfig::new("ftp://demo.example.co", "k").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = StoreConfig::new("not a url", "k").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn debug_does_not_leak_key() {
        let config = StoreConfig::new("https://demo.example.co", "super-secret").unwrap();
        let printed = format!("{config:?}");
        assert!(!printed.contains("super-secret"));
    }
}
