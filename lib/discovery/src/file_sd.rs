use serde::Serialize;

use super::{ADDRESS_LABEL, LabelSet, TargetGroup};

/// One entry of a Prometheus `file_sd` document.
///
/// See https://prometheus.io/docs/prometheus/latest/configuration/configuration/#file_sd_config
#[derive(Debug, PartialEq, Serialize)]
pub struct StaticConfig {
    pub targets: Vec<String>,
    pub labels: LabelSet,
}

/// Flatten target groups into `file_sd` entries, one per target. The
/// `__address__` label becomes the entry's target, group labels are merged
/// under the target's own labels.
pub fn to_file_sd(groups: &[TargetGroup]) -> Vec<StaticConfig> {
    groups
        .iter()
        .flat_map(|group| {
            group.targets.iter().filter_map(|target| {
                let address = target.get(ADDRESS_LABEL)?;

                let mut labels = group.labels.clone();
                labels.extend(
                    target
                        .iter()
                        .filter(|(key, _)| key.as_str() != ADDRESS_LABEL)
                        .map(|(key, value)| (key.clone(), value.clone())),
                );

                Some(StaticConfig {
                    targets: vec![address.clone()],
                    labels,
                })
            })
        })
        .collect()
}
