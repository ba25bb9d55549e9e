use std::{env, path::PathBuf, time::Duration};

use anyhow::{Context, Result, anyhow};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const CREDENTIALS_DIR: &str = ".schedule-portal";
const CREDENTIALS_FILE_NAME: &str = "credentials.json";

const ENV_API_BASE_URL: &str = "PORTAL_API_BASE_URL";
const ENV_HTTP_TIMEOUT_SECS: &str = "PORTAL_HTTP_TIMEOUT_SECS";
const ENV_CREDENTIALS_PATH: &str = "PORTAL_CREDENTIALS_PATH";

/// Connection and storage settings for the portal client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientSettings {
    pub api_base_url: String,
    pub http_timeout: Duration,
    pub credentials_path: PathBuf,
}

impl ClientSettings {
    /// Build settings from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_base_url = lookup(ENV_API_BASE_URL)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let http_timeout = match lookup(ENV_HTTP_TIMEOUT_SECS) {
            Some(raw) => {
                let secs: u64 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{ENV_HTTP_TIMEOUT_SECS} must be an integer"))?;
                if secs == 0 {
                    return Err(anyhow!("{ENV_HTTP_TIMEOUT_SECS} must be greater than 0"));
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        };

        let credentials_path = match lookup(ENV_CREDENTIALS_PATH).filter(|p| !p.trim().is_empty())
        {
            Some(path) => PathBuf::from(path),
            None => default_credentials_path()?,
        };

        Ok(Self {
            api_base_url,
            http_timeout,
            credentials_path,
        })
    }
}

fn default_credentials_path() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(CREDENTIALS_DIR).join(CREDENTIALS_FILE_NAME))
        .context("home directory not found; set PORTAL_CREDENTIALS_PATH")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn explicit_values_are_used() {
        let settings = ClientSettings::from_lookup(lookup_from(&[
            (ENV_API_BASE_URL, "https://portal.example.com/"),
            (ENV_HTTP_TIMEOUT_SECS, "5"),
            (ENV_CREDENTIALS_PATH, "/tmp/creds.json"),
        ]))
        .expect("settings");

        assert_eq!(settings.api_base_url, "https://portal.example.com");
        assert_eq!(settings.http_timeout, Duration::from_secs(5));
        assert_eq!(settings.credentials_path, PathBuf::from("/tmp/creds.json"));
    }

    #[test]
    fn defaults_apply_when_unset() {
        let settings = ClientSettings::from_lookup(lookup_from(&[(
            ENV_CREDENTIALS_PATH,
            "/tmp/creds.json",
        )]))
        .expect("settings");

        assert_eq!(settings.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(
            settings.http_timeout,
            Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS)
        );
    }

    #[test]
    fn rejects_bad_timeout() {
        let zero = ClientSettings::from_lookup(lookup_from(&[
            (ENV_HTTP_TIMEOUT_SECS, "0"),
            (ENV_CREDENTIALS_PATH, "/tmp/creds.json"),
        ]));
        assert!(zero.is_err());

        let text = ClientSettings::from_lookup(lookup_from(&[
            (ENV_HTTP_TIMEOUT_SECS, "soon"),
            (ENV_CREDENTIALS_PATH, "/tmp/creds.json"),
        ]));
        assert!(text.is_err());
    }
}
