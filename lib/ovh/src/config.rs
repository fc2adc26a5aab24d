use std::fmt::{Debug, Formatter};

use super::Error;

/// Well known API endpoints, the key can be used in place of the URL.
pub const ENDPOINTS: [(&str, &str); 7] = [
    ("ovh-eu", "https://eu.api.ovh.com/1.0"),
    ("ovh-ca", "https://ca.api.ovh.com/1.0"),
    ("ovh-us", "https://api.us.ovhcloud.com/1.0"),
    ("kimsufi-eu", "https://eu.api.kimsufi.com/1.0"),
    ("kimsufi-ca", "https://ca.api.kimsufi.com/1.0"),
    ("soyoustart-eu", "https://eu.api.soyoustart.com/1.0"),
    ("soyoustart-ca", "https://ca.api.soyoustart.com/1.0"),
];

/// Credentials and location of the API.
///
/// Keys are created at https://eu.api.ovh.com/createToken/ (or the matching
/// page of other regions).
#[derive(Clone, Default)]
pub struct Config {
    /// An alias listed in [`ENDPOINTS`] or the base URL of the API
    pub endpoint: String,
    pub application_key: String,
    pub application_secret: String,
    pub consumer_key: String,
}

impl Debug for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("endpoint", &self.endpoint)
            .field("application_key", &self.application_key)
            .field("application_secret", &"**REDACTED**")
            .field("consumer_key", &"**REDACTED**")
            .finish()
    }
}

/// Translate an endpoint alias to the base URL, URLs are returned without the
/// trailing slash.
pub fn resolve_endpoint(endpoint: &str) -> Result<String, Error> {
    if let Some((_, url)) = ENDPOINTS.iter().find(|(name, _)| *name == endpoint) {
        return Ok(url.to_string());
    }

    if endpoint.contains("://") {
        return Ok(endpoint.trim_end_matches('/').to_string());
    }

    Err(Error::UnknownEndpoint(endpoint.to_string()))
}
