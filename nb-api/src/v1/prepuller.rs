use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{
    Deserialize,
    Serialize,
};

/// An image as presented to users and to the prepull status endpoints; the
/// path includes the tag, so it is directly usable as a pod image reference.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Image {
    pub path: String,
    pub name: String,
    pub digest: String,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Node {
    pub name: String,
    pub eligible: bool,

    /// Human-readable reason a node is ineligible, when it is.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(default)]
    pub cached: Vec<Image>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NodeImage {
    pub path: String,
    pub name: String,
    pub digest: String,
    pub nodes: Vec<Node>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NodeImageWithMissing {
    pub path: String,
    pub name: String,
    pub digest: String,
    pub nodes: Vec<Node>,
    pub missing: Vec<Node>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct PrepullerContents {
    pub prepulled: Vec<NodeImage>,
    pub pending: Vec<NodeImageWithMissing>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PrepullerStatus {
    pub config: PrepullerSettings,
    pub images: PrepullerContents,
    pub nodes: Vec<Node>,
}

/// The spawner menu: the bounded, ordered image list offered at spawn time,
/// plus the full inventory for the "uncached image" dropdown.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct DisplayImages {
    pub menu: IndexMap<String, Image>,
    pub all: IndexMap<String, Image>,
}

/// Where lab images live.  Exactly one source must be configured; the
/// variant determines how the repository selector is derived.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSourceConfig {
    Gar(GarSourceConfig),
    Docker(DockerSourceConfig),
}

impl ImageSourceConfig {
    /// The bare image name an inventory sighting must match to be retained.
    pub fn image_name(&self) -> &str {
        match self {
            ImageSourceConfig::Gar(gar) => &gar.image,
            ImageSourceConfig::Docker(docker) => {
                docker.repository.rsplit('/').next().unwrap_or(&docker.repository)
            },
        }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GarSourceConfig {
    pub registry: String,
    pub project_id: String,
    pub image: String,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerSourceConfig {
    pub registry: String,
    pub repository: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepullerSettings {
    /// The pinned tag that, when present in the inventory, always heads the
    /// menu.
    pub recommended_tag: String,

    pub num_releases: usize,
    pub num_weeklies: usize,
    pub num_dailies: usize,

    /// XML cycle for T&S builds; when set, images carrying a different cycle
    /// are dropped from the inventory.
    pub cycle: Option<i32>,

    /// Tags whose meaning is a pointer to another tag.
    #[serde(default)]
    pub alias_tags: Vec<String>,

    #[serde(flatten)]
    pub source: ImageSourceConfig,

    /// Labels a node must carry to be an eligible prepull/lab target.
    /// Unset means every schedulable node is eligible.
    pub node_selector: Option<BTreeMap<String, String>>,

    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    #[serde(default = "default_pull_timeout")]
    pub pull_timeout: u64,
}

fn default_poll_interval() -> u64 {
    60
}

fn default_pull_timeout() -> u64 {
    600
}
