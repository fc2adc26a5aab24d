use async_trait::async_trait;
use discovery::{Field, FieldValue, LabelSet, Record, project_into, zip_fields};
use serde::Deserialize;

use super::{
    Context, Error, IpAddresses, Refresher, fetch_addresses, null_as_default, target_labels,
};

pub const SOURCE: &str = "ovhcloud_vps";

const PATH: &str = "/vps";
const LABEL_PREFIX: &str = "__meta_ovhcloud_vps_";

/// The offer a VPS is built on
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Model {
    #[serde(deserialize_with = "null_as_default")]
    name: String,
    #[serde(deserialize_with = "null_as_default")]
    offer: String,
    #[serde(deserialize_with = "null_as_default")]
    version: String,
    #[serde(deserialize_with = "null_as_default")]
    disk: i64,
    #[serde(deserialize_with = "null_as_default")]
    memory: i64,
    #[serde(deserialize_with = "null_as_default")]
    vcore: i64,
    #[serde(deserialize_with = "null_as_default")]
    maximum_additional_ip: i64,
    #[serde(deserialize_with = "null_as_default")]
    datacenter: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    available_options: Vec<String>,
}

static MODEL_FIELDS: [Field; 9] = [
    Field::new("name").label("model_name"),
    Field::new("offer"),
    Field::new("version"),
    Field::new("disk"),
    Field::new("memory"),
    Field::new("vcore"),
    Field::new("maximumAdditionalIp"),
    Field::new("datacenter"),
    Field::new("availableOptions").excluded(),
];

impl Record for Model {
    fn fields(&self) -> Vec<(&'static Field, FieldValue<'_>)> {
        zip_fields(
            &MODEL_FIELDS,
            [
                (&self.name).into(),
                (&self.offer).into(),
                (&self.version).into(),
                self.disk.into(),
                self.memory.into(),
                self.vcore.into(),
                self.maximum_additional_ip.into(),
                (&self.datacenter).into(),
                (&self.available_options).into(),
            ],
        )
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Vps {
    #[serde(deserialize_with = "null_as_default")]
    name: String,
    #[serde(deserialize_with = "null_as_default")]
    display_name: String,
    #[serde(deserialize_with = "null_as_default")]
    zone: String,
    #[serde(deserialize_with = "null_as_default")]
    cluster: String,
    #[serde(deserialize_with = "null_as_default")]
    state: String,
    #[serde(deserialize_with = "null_as_default")]
    netboot_mode: String,
    #[serde(deserialize_with = "null_as_default")]
    memory_limit: i64,
    #[serde(deserialize_with = "null_as_default")]
    offer_type: String,
    #[serde(deserialize_with = "null_as_default")]
    sla_monitoring: bool,
    #[serde(deserialize_with = "null_as_default")]
    model: Model,

    // served by `/vps/{name}/ips`
    #[serde(skip)]
    ips: IpAddresses,
}

static VPS_FIELDS: [Field; 11] = [
    Field::new("name"),
    Field::new("displayName"),
    Field::new("zone"),
    Field::new("cluster"),
    Field::new("state"),
    Field::new("netbootMode"),
    Field::new("memoryLimit"),
    Field::new("offerType"),
    Field::new("slaMonitoring"),
    Field::new("model").excluded(),
    Field::new("ips").excluded(),
];

impl Record for Vps {
    fn fields(&self) -> Vec<(&'static Field, FieldValue<'_>)> {
        zip_fields(
            &VPS_FIELDS,
            [
                (&self.name).into(),
                (&self.display_name).into(),
                (&self.zone).into(),
                (&self.cluster).into(),
                (&self.state).into(),
                (&self.netboot_mode).into(),
                self.memory_limit.into(),
                (&self.offer_type).into(),
                self.sla_monitoring.into(),
                FieldValue::Record(&self.model),
                FieldValue::Record(&self.ips),
            ],
        )
    }
}

pub struct VpsRefresher;

#[async_trait]
impl Refresher for VpsRefresher {
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
        let mut vps = cx
            .run(client.get::<Vps>(&path))
            .await?
            .map_err(|err| Error::Detail {
                path: path.clone(),
                err,
            })?;
        vps.ips = fetch_addresses(client, cx, format!("{path}/ips")).await?;

        let mut labels = target_labels(&vps, &vps.ips, &vps.name, LABEL_PREFIX)?;
        project_into(&vps.model, LABEL_PREFIX, &mut labels)?;

        Ok(labels)
    }
}
