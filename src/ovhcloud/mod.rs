//! Service discovery of OVHcloud resources.
//!
//! Every cycle lists the resources of each enabled kind, fetches their
//! details one by one and turns each of them into a label set. A resource
//! that cannot be fetched is skipped, a kind that cannot be listed is
//! skipped, neither of them fails the whole cycle.

pub mod address;
mod dedicated_server;
mod vps;

use std::collections::BTreeSet;

use async_trait::async_trait;
use discovery::{
    ADDRESS_LABEL, INSTANCE_LABEL, InvalidLabelName, LabelSet, Record, TargetGroup, project_into,
};
use serde::{Deserialize, Deserializer};
use tokio_util::sync::CancellationToken;

pub use address::{IpAddresses, classify};

use crate::config::Config;

/// Every source name, in the order they are refreshed.
pub const SOURCES: [&str; 2] = [vps::SOURCE, dedicated_server::SOURCE];

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("list {path} failed, {err}")]
    List { path: String, err: ovh::Error },
    #[error("get {path} failed, {err}")]
    Detail { path: String, err: ovh::Error },
    #[error("get addresses {path} failed, {err}")]
    Addresses { path: String, err: ovh::Error },
    #[error(transparent)]
    Classify(#[from] address::Error),
    #[error(transparent)]
    Label(#[from] InvalidLabelName),
    #[error("refresh cancelled")]
    Cancelled,
    #[error("build api client failed, {0}")]
    Client(ovh::Error),
}

/// The kinds of resource which can be discovered
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Vps,
    DedicatedServer,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 2] = [ServiceKind::Vps, ServiceKind::DedicatedServer];

    pub fn refresher(self) -> Box<dyn Refresher> {
        match self {
            ServiceKind::Vps => Box::new(vps::VpsRefresher),
            ServiceKind::DedicatedServer => Box::new(dedicated_server::DedicatedServerRefresher),
        }
    }
}

/// Carries the cancellation of one refresh cycle.
#[derive(Clone, Debug, Default)]
pub struct Context {
    token: CancellationToken,
}

impl Context {
    pub fn new(token: CancellationToken) -> Self {
        Context { token }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Drive `fut` to completion, unless the context is cancelled first.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Error> {
        tokio::select! {
            biased;

            _ = self.token.cancelled() => Err(Error::Cancelled),
            output = fut => Ok(output),
        }
    }
}

/// One kind of resource.
///
/// Implementations describe how to list and fetch their resources, the
/// provided `refresh` drives the cycle and owns the failure policy.
#[async_trait]
pub trait Refresher: Send + Sync {
    /// Lowercase provider and kind, it names the target group and is the key
    /// of `sources_to_disable`.
    fn source(&self) -> &'static str;

    /// The API path listing the identifiers
    fn path(&self) -> &'static str;

    /// Fetch one resource and build its label set.
    async fn target(
        &self,
        client: &ovh::Client,
        cx: &Context,
        name: &str,
    ) -> Result<LabelSet, Error>;

    async fn refresh(&self, client: &ovh::Client, cx: &Context) -> Result<TargetGroup, Error> {
        let source = self.source();
        let path = self.path();

        let names = cx
            .run(client.get::<Vec<String>>(path))
            .await?
            .map_err(|err| Error::List {
                path: path.to_string(),
                err,
            })?;

        let mut group = TargetGroup::new(source);
        for name in names {
            match self.target(client, cx, &name).await {
                Ok(labels) => group.targets.push(labels),
                Err(err @ (Error::Label(_) | Error::Cancelled)) => return Err(err),
                Err(err) => {
                    warn!(
                        message = "fetch resource failed, skip it",
                        source,
                        %name,
                        %err
                    );
                }
            }
        }

        Ok(group)
    }
}

/// The API answers `null` for unset fields, they are read as the zero value.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Fetch and classify the addresses listed at `path`
async fn fetch_addresses(
    client: &ovh::Client,
    cx: &Context,
    path: String,
) -> Result<IpAddresses, Error> {
    let addresses = cx
        .run(client.get::<Vec<String>>(&path))
        .await?
        .map_err(|err| Error::Addresses { path, err })?;

    Ok(classify(&addresses)?)
}

/// The well known labels plus the projection of `record` and `ips`.
fn target_labels(
    record: &dyn Record,
    ips: &IpAddresses,
    instance: &str,
    prefix: &str,
) -> Result<LabelSet, Error> {
    let mut labels = LabelSet::new();
    labels.insert(ADDRESS_LABEL.to_string(), ips.preferred().to_string());
    labels.insert(INSTANCE_LABEL.to_string(), instance.to_string());

    project_into(record, prefix, &mut labels)?;
    project_into(ips, prefix, &mut labels)?;

    Ok(labels)
}

/// Discovers every enabled kind of resource.
pub struct OvhCloud {
    credentials: ovh::Config,
    refreshers: Vec<Box<dyn Refresher>>,
    disabled: BTreeSet<String>,
}

impl OvhCloud {
    pub fn new(config: &Config) -> Self {
        let kinds = match config.service {
            Some(kind) => vec![kind],
            None => ServiceKind::ALL.to_vec(),
        };

        OvhCloud::with_refreshers(
            config.credentials(),
            kinds.into_iter().map(ServiceKind::refresher).collect(),
            config.sources_to_disable.iter().cloned(),
        )
    }

    pub fn with_refreshers(
        credentials: ovh::Config,
        refreshers: Vec<Box<dyn Refresher>>,
        disabled: impl IntoIterator<Item = String>,
    ) -> Self {
        OvhCloud {
            credentials,
            refreshers,
            disabled: disabled.into_iter().collect(),
        }
    }

    /// Source names which will be refreshed, in order
    pub fn sources(&self) -> Vec<&'static str> {
        self.refreshers
            .iter()
            .map(|refresher| refresher.source())
            .filter(|source| !self.disabled.contains(*source))
            .collect()
    }

    /// Run one cycle, a failed source is logged and contributes no group.
    ///
    /// The only error is an unusable cycle, when no API client can be built.
    pub async fn refresh(&self, cx: &Context) -> Result<Vec<TargetGroup>, Error> {
        let client = ovh::Client::new(&self.credentials).map_err(Error::Client)?;

        let mut groups = Vec::with_capacity(self.refreshers.len());
        for refresher in &self.refreshers {
            let source = refresher.source();
            if self.disabled.contains(source) {
                continue;
            }

            match refresher.refresh(&client, cx).await {
                Ok(group) => {
                    debug!(
                        message = "source refreshed",
                        source,
                        targets = group.len()
                    );

                    groups.push(group);
                }
                Err(err) => {
                    error!(message = "refresh source failed", source, %err);
                }
            }
        }

        Ok(groups)
    }
}

#[cfg(test)]
pub(crate) fn credentials(endpoint: &str) -> ovh::Config {
    ovh::Config {
        endpoint: endpoint.to_string(),
        application_key: "appKeyTest".to_string(),
        application_secret: "appSecretTest".to_string(),
        consumer_key: "consumerTest".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use ovh::testing::MockServer;
    use pretty_assertions::assert_eq;

    use super::*;

    /// Serves `<path>` and labels every listed name with its instance only
    struct Named {
        source: &'static str,
        path: &'static str,
    }

    #[async_trait]
    impl Refresher for Named {
        fn source(&self) -> &'static str {
            self.source
        }

        fn path(&self) -> &'static str {
            self.path
        }

        async fn target(
            &self,
            _client: &ovh::Client,
            _cx: &Context,
            name: &str,
        ) -> Result<LabelSet, Error> {
            let mut labels = LabelSet::new();
            labels.insert(INSTANCE_LABEL.to_string(), name.to_string());
            Ok(labels)
        }
    }

    /// Like `Named`, but `bad` fails with the error `fail` builds
    struct Failing {
        path: &'static str,
        bad: &'static str,
        fail: fn() -> Error,
    }

    #[async_trait]
    impl Refresher for Failing {
        fn source(&self) -> &'static str {
            "failing"
        }

        fn path(&self) -> &'static str {
            self.path
        }

        async fn target(
            &self,
            _client: &ovh::Client,
            _cx: &Context,
            name: &str,
        ) -> Result<LabelSet, Error> {
            if name == self.bad {
                return Err((self.fail)());
            }

            let mut labels = LabelSet::new();
            labels.insert(INSTANCE_LABEL.to_string(), name.to_string());
            Ok(labels)
        }
    }

    fn named(source: &'static str, path: &'static str) -> Box<dyn Refresher> {
        Box::new(Named { source, path })
    }

    fn disabled(sources: &[&str]) -> Vec<String> {
        sources.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn disabled_source_excluded() {
        let server = MockServer::start().await;
        server.ok("/x", ["a"]);
        server.ok("/y", ["b"]);

        let sd = OvhCloud::with_refreshers(
            credentials(server.endpoint()),
            vec![named("x", "/x"), named("y", "/y")],
            disabled(&["x"]),
        );
        assert_eq!(sd.sources(), vec!["y"]);

        let groups = sd.refresh(&Context::default()).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].source, "y");
        assert!(!server.requests().contains(&"/x".to_string()));
    }

    #[tokio::test]
    async fn list_failure_isolated() {
        let server = MockServer::start().await;
        server.error(
            "/x",
            http::StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
        );
        server.ok("/y", ["b", "c"]);

        let sd = OvhCloud::with_refreshers(
            credentials(server.endpoint()),
            vec![named("x", "/x"), named("y", "/y")],
            vec![],
        );

        let groups = sd.refresh(&Context::default()).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].source, "y");
        assert_eq!(groups[0].len(), 2);
    }

    #[tokio::test]
    async fn item_failure_policy() {
        let server = MockServer::start().await;
        server.ok("/x", ["a", "b", "c"]);
        server.ok("/y", ["d"]);

        let fails: [(fn() -> Error, Option<Vec<&str>>); 3] = [
            (
                || Error::Classify(address::Error::NoUsableAddress(vec!["10.0.0.0/8".into()])),
                Some(vec!["a", "c"]),
            ),
            (
                || Error::Label(InvalidLabelName("bad-name".to_string())),
                None,
            ),
            (|| Error::Cancelled, None),
        ];

        for (fail, want) in fails {
            let sd = OvhCloud::with_refreshers(
                credentials(server.endpoint()),
                vec![
                    Box::new(Failing {
                        path: "/x",
                        bad: "b",
                        fail,
                    }),
                    named("y", "/y"),
                ],
                vec![],
            );

            let groups = sd.refresh(&Context::default()).await.unwrap();
            let failing = groups.iter().find(|group| group.source == "failing");
            let instances = failing.map(|group| {
                group
                    .targets
                    .iter()
                    .map(|labels| labels[INSTANCE_LABEL].as_str())
                    .collect::<Vec<_>>()
            });
            assert_eq!(instances, want);

            // the other source is not affected
            assert_eq!(groups.last().map(|group| group.source.as_str()), Some("y"));
            assert_eq!(groups.last().map(TargetGroup::len), Some(1));
        }
    }

    #[tokio::test]
    async fn empty_list_still_emits_group() {
        let server = MockServer::start().await;
        server.ok("/x", Vec::<String>::new());

        let sd = OvhCloud::with_refreshers(
            credentials(server.endpoint()),
            vec![named("x", "/x")],
            vec![],
        );

        let groups = sd.refresh(&Context::default()).await.unwrap();
        assert_eq!(groups, vec![TargetGroup::new("x")]);
    }

    #[tokio::test]
    async fn unusable_client() {
        let sd = OvhCloud::with_refreshers(
            credentials("test-fail"),
            vec![named("x", "/x")],
            vec![],
        );
        let err = sd.refresh(&Context::default()).await.unwrap_err();
        assert!(
            matches!(err, Error::Client(ovh::Error::UnknownEndpoint(_))),
            "{err}"
        );

        let mut creds = credentials("ovh-eu");
        creds.application_key = String::new();
        let sd = OvhCloud::with_refreshers(creds, vec![named("x", "/x")], vec![]);
        let err = sd.refresh(&Context::default()).await.unwrap_err();
        assert!(err.to_string().contains("missing application key"), "{err}");
    }

    #[tokio::test]
    async fn cancelled() {
        let server = MockServer::start().await;
        server.ok("/x", ["a"]);
        server.ok("/y", ["b"]);

        let sd = OvhCloud::with_refreshers(
            credentials(server.endpoint()),
            vec![named("x", "/x"), named("y", "/y")],
            vec![],
        );

        let token = CancellationToken::new();
        token.cancel();
        let cx = Context::new(token);

        let groups = sd.refresh(&cx).await.unwrap();
        assert!(groups.is_empty());
        assert!(server.requests().is_empty());
    }

    #[tokio::test]
    async fn run_until_cancelled() {
        let cx = Context::default();
        assert_eq!(cx.run(async { 1 }).await.unwrap(), 1);

        let token = CancellationToken::new();
        let cx = Context::new(token.clone());
        token.cancel();
        assert!(cx.is_cancelled());
        assert!(matches!(
            cx.run(std::future::pending::<()>()).await,
            Err(Error::Cancelled)
        ));
    }

    #[test]
    fn every_kind_has_a_source() {
        let sources = ServiceKind::ALL
            .iter()
            .map(|kind| kind.refresher().source())
            .collect::<Vec<_>>();

        assert_eq!(sources, SOURCES.to_vec());
    }
}
