mod file_sd;
mod labels;

use std::collections::BTreeMap;

use serde::Serialize;

pub use file_sd::{StaticConfig, to_file_sd};
pub use labels::{
    Field, FieldValue, InvalidLabelName, Record, is_valid_label_name, project, project_into,
    zip_fields,
};

/// The label which holds the `<host>:<port>` (or bare host) of a target
pub const ADDRESS_LABEL: &str = "__address__";

/// The label which identifies a target, it survives relabeling.
pub const INSTANCE_LABEL: &str = "instance";

/// Prefix for the labels attached by a discovery mechanism, they are dropped
/// after relabeling.
pub const META_LABEL_PREFIX: &str = "__meta_";

/// A flat set of label name to label value, ordered by name so the output of
/// a discovery cycle is deterministic.
pub type LabelSet = BTreeMap<String, String>;

/// TargetGroup is a set of targets with a common tags
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TargetGroup {
    /// `targets` is a list of targets identified by a label set. Each target
    /// is uniquely identifiable in the group by its `address` label
    pub targets: Vec<LabelSet>,

    /// `labels` is a set of labels that is common across all targets in the group
    pub labels: LabelSet,

    /// An identifier that describes a group of targets
    pub source: String,
}

impl TargetGroup {
    pub fn new(source: impl Into<String>) -> Self {
        TargetGroup {
            targets: vec![],
            labels: LabelSet::new(),
            source: source.into(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
