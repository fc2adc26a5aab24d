use async_trait::async_trait;
use discovery::{Field, FieldValue, LabelSet, Record, zip_fields};
use serde::Deserialize;

use super::{
    Context, Error, IpAddresses, Refresher, fetch_addresses, null_as_default, target_labels,
};

pub const SOURCE: &str = "ovhcloud_dedicated_server";

const PATH: &str = "/dedicated/server";
const LABEL_PREFIX: &str = "__meta_ovhcloud_dedicatedServer_";

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct DedicatedServer {
    #[serde(deserialize_with = "null_as_default")]
    professional_use: bool,
    #[serde(deserialize_with = "null_as_default")]
    state: String,
    rescue_mail: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    new_upgrade_system: bool,

    // served by `/dedicated/server/{name}/ips`
    #[serde(skip)]
    ips: IpAddresses,

    #[serde(deserialize_with = "null_as_default")]
    commercial_range: String,
    #[serde(deserialize_with = "null_as_default")]
    link_speed: i64,
    #[serde(deserialize_with = "null_as_default")]
    rack: String,
    #[serde(deserialize_with = "null_as_default")]
    no_intervention: bool,
    #[serde(deserialize_with = "null_as_default")]
    os: String,
    #[serde(deserialize_with = "null_as_default")]
    support_level: String,
    root_device: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    server_id: i64,
    #[serde(deserialize_with = "null_as_default")]
    boot_id: i64,
    #[serde(deserialize_with = "null_as_default")]
    reverse: String,
    #[serde(deserialize_with = "null_as_default")]
    datacenter: String,
    #[serde(deserialize_with = "null_as_default")]
    name: String,
    #[serde(deserialize_with = "null_as_default")]
    monitoring: bool,
}

static DEDICATED_SERVER_FIELDS: [Field; 18] = [
    Field::new("professionalUse"),
    Field::new("state"),
    Field::new("rescueMail"),
    Field::new("newUpgradeSystem"),
    Field::new("ips").excluded(),
    Field::new("commercialRange"),
    Field::new("linkSpeed"),
    Field::new("rack"),
    Field::new("noIntervention"),
    Field::new("os"),
    Field::new("supportLevel"),
    Field::new("rootDevice"),
    Field::new("serverId"),
    Field::new("bootId"),
    Field::new("reverse"),
    Field::new("datacenter"),
    Field::new("name"),
    Field::new("monitoring"),
];

impl Record for DedicatedServer {
    fn fields(&self) -> Vec<(&'static Field, FieldValue<'_>)> {
        zip_fields(
            &DEDICATED_SERVER_FIELDS,
            [
                self.professional_use.into(),
                (&self.state).into(),
                (&self.rescue_mail).into(),
                self.new_upgrade_system.into(),
                FieldValue::Record(&self.ips),
                (&self.commercial_range).into(),
                self.link_speed.into(),
                (&self.rack).into(),
                self.no_intervention.into(),
                (&self.os).into(),
                (&self.support_level).into(),
                (&self.root_device).into(),
                self.server_id.into(),
                self.boot_id.into(),
                (&self.reverse).into(),
                (&self.datacenter).into(),
                (&self.name).into(),
                self.monitoring.into(),
            ],
        )
    }
}

pub struct DedicatedServerRefresher;

#[async_trait]
impl Refresher for DedicatedServerRefresher {
    fn source(&self) -> &'static str {
        SOURCE
    }

    fn path(&self) -> &'static str {
        PATH
    }

    async fn target(
        &self,
        client: &ovh::Client,
        cx: &Context,
        name: &str,
    ) -> Result<LabelSet, Error> {
        let path = format!("{PATH}/{}", ovh::escape(name));
        let mut server = cx
            .run(client.get::<DedicatedServer>(&path))
            .await?
            .map_err(|err| Error::Detail {
                path: path.clone(),
                err,
            })?;
        server.ips = fetch_addresses(client, cx, format!("{path}/ips")).await?;

        target_labels(&server, &server.ips, &server.name, LABEL_PREFIX)
    }
}
