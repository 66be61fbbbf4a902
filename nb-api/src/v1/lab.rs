use std::collections::{
    BTreeMap,
    VecDeque,
};
use std::fmt;

use serde::{
    Deserialize,
    Serialize,
};

use super::Event;

/// Container size descriptors, a closed set.  Actual resource definitions
/// for each size are instance-defined in the controller configuration.
///
/// https://www.d20srd.org/srd/combat/movementPositionAndDistance.htm#bigandLittleCreaturesInCombat
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LabSize {
    Fine,
    Diminutive,
    Tiny,
    Small,
    Medium,
    Large,
    Huge,
    Gargantuan,
    Colossal,
}

impl fmt::Display for LabSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LabSize::Fine => "fine",
            LabSize::Diminutive => "diminutive",
            LabSize::Tiny => "tiny",
            LabSize::Small => "small",
            LabSize::Medium => "medium",
            LabSize::Large => "large",
            LabSize::Huge => "huge",
            LabSize::Gargantuan => "gargantuan",
            LabSize::Colossal => "colossal",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LabStatus {
    Starting,
    Running,
    Terminating,
    Failed,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PodState {
    Present,
    Missing,
}

/// The user-submitted half of `POST /nublado/spawner/v1/labs/<username>/create`.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOptions {
    /// Enable verbose logging in the spawned lab container.
    #[serde(default)]
    pub debug: bool,

    /// Full Docker registry path for the lab image.
    pub image: String,

    /// Move `.cache`, `.local`, and `.jupyter` aside when spawning.
    #[serde(default)]
    pub reset_user_env: bool,

    pub size: LabSize,
}

/// A single resource quantum: Kubernetes CPU as a float, memory in bytes.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceQuantum {
    pub cpu: f64,
    pub memory: i64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabSpecification {
    pub options: UserOptions,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub namespace_quota: Option<ResourceQuantum>,
}

/// Group membership as reported by the identity service; names follow Unix
/// conventions, ids are POSIX GIDs.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct UserGroup {
    pub name: String,
    pub id: i64,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub username: String,

    /// The user's preferred human-readable name; may contain spaces and
    /// capitals, unlike the username.
    pub name: String,

    pub uid: i64,
    pub gid: i64,
    pub groups: Vec<UserGroup>,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResources {
    /// Maximum allowed resources.
    pub limits: ResourceQuantum,

    /// Initially-requested resources.
    pub requests: ResourceQuantum,
}

/// The full per-user lab record: identity, requested specification, resolved
/// resources, lifecycle status, and the ordered event queue for the user's
/// current operation.  At most one of these exists per username.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    pub username: String,
    pub name: String,
    pub uid: i64,
    pub gid: i64,
    pub groups: Vec<UserGroup>,

    pub options: UserOptions,
    pub env: BTreeMap<String, String>,
    pub namespace_quota: Option<ResourceQuantum>,

    pub status: LabStatus,
    pub pod: PodState,
    pub resources: UserResources,

    #[serde(default)]
    pub events: VecDeque<Event>,
}

impl UserData {
    pub fn new_from_user(user: &UserInfo, spec: &LabSpecification, resources: &UserResources) -> UserData {
        UserData {
            username: user.username.clone(),
            name: user.name.clone(),
            uid: user.uid,
            gid: user.gid,
            groups: user.groups.clone(),
            options: spec.options.clone(),
            env: spec.env.clone(),
            namespace_quota: spec.namespace_quota,
            status: LabStatus::Starting,
            pod: PodState::Missing,
            resources: *resources,
            events: VecDeque::new(),
        }
    }
}
