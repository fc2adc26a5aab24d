use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::ovhcloud::{SOURCES, ServiceKind};

const fn default_refresh_interval() -> Duration {
    Duration::from_secs(60)
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("read config file {path:?} failed, {err}")]
    Read { path: PathBuf, err: std::io::Error },
    #[error("parse config failed, {0}")]
    Parse(serde_yaml::Error),
    #[error("invalid config, {}", .0.join("; "))]
    Invalid(Vec<String>),
    #[error("authentication check failed, {0}")]
    Auth(ovh::Error),
}

/// Partial response of `/me`
#[derive(Deserialize)]
struct Me {
    #[serde(default)]
    firstname: String,
}

#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// An endpoint alias like `ovh-eu`, or the URL of the API
    #[serde(default)]
    pub endpoint: String,

    #[serde(default)]
    pub application_key: String,

    #[serde(default)]
    pub application_secret: String,

    #[serde(default)]
    pub consumer_key: String,

    /// How often the resources are listed
    #[serde(
        default = "default_refresh_interval",
        with = "humanize::duration::serde"
    )]
    pub refresh_interval: Duration,

    /// A cycle running longer than this is cancelled, defaults to
    /// `refresh_interval`.
    #[serde(default, with = "humanize::duration::serde_option")]
    pub refresh_timeout: Option<Duration>,

    /// Discover this kind of resource only, every kind when not set
    #[serde(default)]
    pub service: Option<ServiceKind>,

    /// Source names, e.g. `ovhcloud_vps`, which are not refreshed.
    #[serde(default)]
    pub sources_to_disable: Vec<String>,

    /// Do not call `/me` at startup to verify the credentials
    #[serde(default)]
    pub skip_auth_check: bool,
}

impl Debug for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("endpoint", &self.endpoint)
            .field("application_key", &self.application_key)
            .field("application_secret", &"**REDACTED**")
            .field("consumer_key", &"**REDACTED**")
            .field("refresh_interval", &self.refresh_interval)
            .field("refresh_timeout", &self.refresh_timeout)
            .field("service", &self.service)
            .field("sources_to_disable", &self.sources_to_disable)
            .field("skip_auth_check", &self.skip_auth_check)
            .finish()
    }
}

impl FromStr for Config {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let config = serde_yaml::from_str::<Config>(text).map_err(Error::Parse)?;
        config.validate()?;

        Ok(config)
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| Error::Read {
            path: path.to_path_buf(),
            err,
        })?;

        text.parse()
    }

    /// Collects every problem instead of stopping at the first one.
    pub fn validate(&self) -> Result<(), Error> {
        let mut errors = vec![];

        for (field, value) in [
            ("endpoint", &self.endpoint),
            ("application_key", &self.application_key),
            ("application_secret", &self.application_secret),
            ("consumer_key", &self.consumer_key),
        ] {
            if value.is_empty() {
                errors.push(format!("missing required field \"{field}\""));
            }
        }

        if self.refresh_interval.is_zero() {
            errors.push("refresh_interval must be greater than 0".to_string());
        }
        if self.refresh_timeout.is_some_and(|timeout| timeout.is_zero()) {
            errors.push("refresh_timeout must be greater than 0".to_string());
        }

        for source in &self.sources_to_disable {
            if !SOURCES.iter().any(|known| known == source) {
                errors.push(format!(
                    "unknown source \"{source}\" in sources_to_disable, available: {}",
                    SOURCES.join(", ")
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Invalid(errors))
        }
    }

    pub fn refresh_timeout(&self) -> Duration {
        self.refresh_timeout.unwrap_or(self.refresh_interval)
    }

    pub fn credentials(&self) -> ovh::Config {
        ovh::Config {
            endpoint: self.endpoint.clone(),
            application_key: self.application_key.clone(),
            application_secret: self.application_secret.clone(),
            consumer_key: self.consumer_key.clone(),
        }
    }

    /// Make sure the credentials are accepted by the API.
    pub async fn check_auth(&self) -> Result<(), Error> {
        let client = ovh::Client::new(&self.credentials()).map_err(Error::Auth)?;
        let me = client.get::<Me>("/me").await.map_err(Error::Auth)?;

        debug!(
            message = "credentials verified",
            endpoint = client.endpoint(),
            firstname = %me.firstname
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
endpoint: ovh-eu
application_key: key
application_secret: secret
consumer_key: consumer
"#;

    #[test]
    fn defaults() {
        let config = MINIMAL.parse::<Config>().unwrap();

        assert_eq!(config.refresh_interval, Duration::from_secs(60));
        assert_eq!(config.refresh_timeout(), Duration::from_secs(60));
        assert_eq!(config.service, None);
        assert!(config.sources_to_disable.is_empty());
        assert!(!config.skip_auth_check);
    }

    #[test]
    fn secrets_not_printed() {
        let config = MINIMAL.parse::<Config>().unwrap();

        let text = format!("{config:?}");
        assert!(!text.contains("\"secret\""), "{text}");
        assert!(!text.contains("\"consumer\""), "{text}");
    }

    #[test]
    fn credentials() {
        let config = MINIMAL.parse::<Config>().unwrap();
        let credentials = config.credentials();

        assert_eq!(credentials.endpoint, "ovh-eu");
        assert_eq!(credentials.application_key, "key");
        assert_eq!(credentials.application_secret, "secret");
        assert_eq!(credentials.consumer_key, "consumer");
    }
}
