use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use http::header::ACCEPT;
use http::{Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_rustls::{ConfigBuilderExt, HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client as HttpClient;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use rustls::{ClientConfig, RootCertStore};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use sha1::{Digest, Sha1};
use tokio::sync::OnceCell;
use tracing::{debug, trace};

use super::config::{Config, resolve_endpoint};

const APPLICATION_HEADER: &str = "X-Ovh-Application";
const CONSUMER_HEADER: &str = "X-Ovh-Consumer";
const TIMESTAMP_HEADER: &str = "X-Ovh-Timestamp";
const SIGNATURE_HEADER: &str = "X-Ovh-Signature";
const QUERY_ID_HEADER: &str = "X-Ovh-QueryID";

/// Characters kept as-is in a path segment, everything else is escaped
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown endpoint '{0}', consider checking the endpoint list or using an URL")]
    UnknownEndpoint(String),
    #[error(
        "missing application key, please check your configuration or consult the documentation to create one"
    )]
    MissingApplicationKey,
    #[error(
        "missing application secret, please check your configuration or consult the documentation to create one"
    )]
    MissingApplicationSecret,
    #[error("load native certificates failed, {0}")]
    NativeCerts(std::io::Error),
    #[error("build tls config failed, {0}")]
    Tls(rustls::Error),
    #[error("build http request failed, {0}")]
    BuildRequest(http::Error),
    #[error("read http response failed, {0}")]
    ReadResponse(hyper::Error),
    #[error(transparent)]
    Http(hyper_util::client::legacy::Error),
    #[error(
        "api error, status: {status}, class: {}, message: {message}, query id: {}",
        .class.as_deref().unwrap_or("-"),
        .query_id.as_deref().unwrap_or("-")
    )]
    Api {
        status: StatusCode,
        class: Option<String>,
        message: String,
        query_id: Option<String>,
    },
    #[error("deserialize response failed, {0}")]
    Deserialize(serde_json::Error),
}

impl From<http::Error> for Error {
    fn from(err: http::Error) -> Self {
        Error::BuildRequest(err)
    }
}

impl From<hyper::Error> for Error {
    fn from(err: hyper::Error) -> Self {
        Error::ReadResponse(err)
    }
}

impl Error {
    /// The HTTP status of an API error, `None` for anything else
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Body of a non-2xx response
#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    class: Option<String>,
    #[serde(default)]
    message: String,
}

/// Percent-encode an identifier so it can be used as one segment of a path.
pub fn escape(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

fn sign(
    secret: &str,
    consumer: &str,
    method: &Method,
    url: &str,
    body: &str,
    timestamp: i64,
) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!(
        "{secret}+{consumer}+{}+{url}+{body}+{timestamp}",
        method.as_str()
    ));

    format!("$1${}", hex::encode(hasher.finalize()))
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Client of the OVHcloud API, every call except `/auth/time` is signed.
#[derive(Clone)]
pub struct Client {
    http_client: HttpClient<HttpsConnector<HttpConnector>, Full<Bytes>>,
    endpoint: String,
    application_key: String,
    application_secret: String,
    consumer_key: String,

    // difference between the API's clock and ours, fetched once
    time_delta: Arc<OnceCell<i64>>,
}

impl Client {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let endpoint = resolve_endpoint(&config.endpoint)?;
        if config.application_key.is_empty() {
            return Err(Error::MissingApplicationKey);
        }
        if config.application_secret.is_empty() {
            return Err(Error::MissingApplicationSecret);
        }

        let builder = ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .map_err(Error::Tls)?;
        // plain http endpoints are only used against local mocks, there is
        // no point loading the system roots for them.
        let tls = if endpoint.starts_with("https://") {
            builder
                .with_native_roots()
                .map_err(Error::NativeCerts)?
                .with_no_client_auth()
        } else {
            builder
                .with_root_certificates(RootCertStore::empty())
                .with_no_client_auth()
        };

        let mut inner = HttpConnector::new();
        inner.enforce_http(false);
        let connector = HttpsConnectorBuilder::new()
            .with_tls_config(tls)
            .https_or_http()
            .enable_http1()
            .wrap_connector(inner);

        let http_client =
            hyper_util::client::legacy::Client::builder(TokioExecutor::new()).build(connector);

        Ok(Client {
            http_client,
            endpoint,
            application_key: config.application_key.clone(),
            application_secret: config.application_secret.clone(),
            consumer_key: config.consumer_key.clone(),
            time_delta: Arc::new(OnceCell::new()),
        })
    }

    /// The resolved base URL
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Issue a signed `GET` and decode the JSON response
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let timestamp = unix_now() + self.time_delta().await?;
        let req = self.request(Method::GET, path, Some(timestamp))?;
        let body = self.send(req).await?;

        serde_json::from_slice(&body).map_err(Error::Deserialize)
    }

    /// Server time of the API, as a UNIX timestamp
    pub async fn server_time(&self) -> Result<i64, Error> {
        let req = self.request(Method::GET, "/auth/time", None)?;
        let body = self.send(req).await?;

        serde_json::from_slice(&body).map_err(Error::Deserialize)
    }

    async fn time_delta(&self) -> Result<i64, Error> {
        self.time_delta
            .get_or_try_init(|| async {
                let delta = self.server_time().await? - unix_now();
                debug!(message = "synchronized clock with the API", delta);

                Ok::<_, Error>(delta)
            })
            .await
            .copied()
    }

    /// Build a request to `path`, it is signed when `timestamp` is set.
    fn request(
        &self,
        method: Method,
        path: &str,
        timestamp: Option<i64>,
    ) -> Result<Request<Full<Bytes>>, Error> {
        let url = format!("{}{}", self.endpoint, path);

        let mut builder = Request::builder()
            .method(method.clone())
            .uri(&url)
            .header(ACCEPT, "application/json")
            .header(APPLICATION_HEADER, self.application_key.as_str());

        if let Some(timestamp) = timestamp {
            let signature = sign(
                &self.application_secret,
                &self.consumer_key,
                &method,
                &url,
                "",
                timestamp,
            );

            builder = builder
                .header(TIMESTAMP_HEADER, timestamp.to_string())
                .header(CONSUMER_HEADER, self.consumer_key.as_str())
                .header(SIGNATURE_HEADER, signature);
        }

        Ok(builder.body(Full::<Bytes>::default())?)
    }

    async fn send(&self, req: Request<Full<Bytes>>) -> Result<Bytes, Error> {
        trace!(message = "doing http request", method = %req.method(), uri = %req.uri());

        let resp = self.http_client.request(req).await.map_err(Error::Http)?;
        let (parts, incoming) = resp.into_parts();
        let body = incoming.collect().await?.to_bytes();

        if parts.status.is_success() {
            return Ok(body);
        }

        let query_id = parts
            .headers
            .get(QUERY_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string);
        let (class, message) = match serde_json::from_slice::<ErrorResponse>(&body) {
            Ok(resp) => (resp.class, resp.message),
            Err(_) => (None, String::from_utf8_lossy(&body).into_owned()),
        };

        Err(Error::Api {
            status: parts.status,
            class,
            message,
            query_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::testing::MockServer;

    fn config(endpoint: &str) -> Config {
        Config {
            endpoint: endpoint.to_string(),
            application_key: "appKeyTest".to_string(),
            application_secret: "appSecretTest".to_string(),
            consumer_key: "consumerTest".to_string(),
        }
    }

    #[test]
    fn signature() {
        let got = sign(
            "appSecretTest",
            "consumerTest",
            &Method::GET,
            "https://eu.api.ovh.com/1.0/me",
            "",
            1366560945,
        );

        assert_eq!(got, "$1$6a447fd478b51f51e2427db00450f37f3d7b01c1");
    }

    #[test]
    fn escape_segment() {
        assert_eq!(escape("ns1234.ip-1-2-3.eu"), "ns1234.ip-1-2-3.eu");
        assert_eq!(escape("a/b c"), "a%2Fb%20c");
    }

    #[test]
    fn missing_keys() {
        let mut conf = config("ovh-eu");
        conf.application_key = String::new();
        let err = Client::new(&conf).err().unwrap();
        assert!(err.to_string().contains("missing application key"), "{err}");

        let mut conf = config("ovh-eu");
        conf.application_secret = String::new();
        let err = Client::new(&conf).err().unwrap();
        assert!(
            err.to_string().contains("missing application secret"),
            "{err}"
        );
    }

    #[test]
    fn unknown_endpoint() {
        let err = Client::new(&config("test-fail")).err().unwrap();
        assert!(matches!(err, Error::UnknownEndpoint(_)), "{err}");
    }

    #[tokio::test]
    async fn signed_get() {
        let server = MockServer::start().await;
        server.ok("/me", serde_json::json!({"firstname": "test_name"}));

        let client = Client::new(&config(server.endpoint())).unwrap();
        let me = client.get::<serde_json::Value>("/me").await.unwrap();
        assert_eq!(me["firstname"], "test_name");

        // the clock is synchronized once
        client.get::<serde_json::Value>("/me").await.unwrap();
        assert_eq!(server.requests(), vec!["/auth/time", "/me", "/me"]);
    }

    #[tokio::test]
    async fn api_error() {
        let server = MockServer::start().await;
        server.error("/me", StatusCode::FORBIDDEN, "This credential is not valid");

        let client = Client::new(&config(server.endpoint())).unwrap();
        let err = client.get::<serde_json::Value>("/me").await.unwrap_err();

        assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));
        match err {
            Error::Api {
                message, query_id, ..
            } => {
                assert_eq!(message, "This credential is not valid");
                assert!(query_id.is_some());
            }
            err => panic!("unexpected error {err:?}"),
        }
    }

    #[tokio::test]
    async fn not_found() {
        let server = MockServer::start().await;

        let client = Client::new(&config(server.endpoint())).unwrap();
        let err = client
            .get::<Vec<String>>("/dedicated/server")
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn invalid_json() {
        let server = MockServer::start().await;
        server.ok("/vps", serde_json::json!({"not": "a list"}));

        let client = Client::new(&config(server.endpoint())).unwrap();
        let err = client.get::<Vec<String>>("/vps").await.unwrap_err();

        assert!(matches!(err, Error::Deserialize(_)), "{err}");
    }
}
