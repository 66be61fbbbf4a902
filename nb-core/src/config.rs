use std::collections::{
    BTreeMap,
    HashSet,
};
use std::fs::File;

use nb_api::v1::{
    LabSize,
    PrepullerSettings,
    ResourceQuantum,
};
use serde::{
    Deserialize,
    Serialize,
};

use crate::constants::*;
use crate::errors::*;

err_impl! {ConfigError,
    #[error("profile must be 'production' or 'development', got '{0}'")]
    InvalidProfile(String),

    #[error("mount path must be absolute: {0}")]
    RelativeMountPath(String),

    #[error("no 'default' entry in spawner forms: {0}")]
    MissingDefaultForm(String),

    #[error("duplicate secret key '{0}'")]
    DuplicateSecretKey(String),

    #[error("secret key '{0}' is reserved for the user token")]
    ReservedSecretKey(String),

    #[error("cannot interpret memory quantity '{0}'")]
    BadMemoryQuantity(String),

    #[error("bad form restriction: {0}")]
    BadFormRestriction(String),
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SafirConfig {
    pub name: String,
    pub profile: String,
    pub logger_name: String,
    pub log_level: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesConfig {
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

impl Default for KubernetesConfig {
    fn default() -> KubernetesConfig {
        KubernetesConfig { request_timeout: KUBERNETES_REQUEST_TIMEOUT }
    }
}

fn default_request_timeout() -> u64 {
    KUBERNETES_REQUEST_TIMEOUT
}

/// Memory may be given either as a raw byte count or as a Kubernetes-style
/// quantity string like `1536MiB`.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum MemoryQuantity {
    Bytes(i64),
    Quantity(String),
}

impl MemoryQuantity {
    pub fn to_bytes(&self) -> anyhow::Result<i64> {
        match self {
            MemoryQuantity::Bytes(b) => Ok(*b),
            MemoryQuantity::Quantity(s) => {
                let digits = s.trim_end_matches(|c: char| !c.is_ascii_digit());
                let multiplier: i64 = match s[digits.len()..].trim_end_matches('B') {
                    "" => 1,
                    "K" => 1000,
                    "M" => 1000 * 1000,
                    "G" => 1000 * 1000 * 1000,
                    "Ki" => 1 << 10,
                    "Mi" => 1 << 20,
                    "Gi" => 1 << 30,
                    _ => bail!(ConfigError::bad_memory_quantity(s)),
                };
                let count: i64 = digits.parse().map_err(|_| ConfigError::bad_memory_quantity(s))?;
                Ok(count * multiplier)
            },
        }
    }
}

impl std::fmt::Display for MemoryQuantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryQuantity::Bytes(b) => write!(f, "{b}"),
            MemoryQuantity::Quantity(s) => f.write_str(s),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabSizeDefinition {
    pub cpu: f64,
    pub memory: MemoryQuantity,
}

impl LabSizeDefinition {
    pub fn to_quantum(&self) -> anyhow::Result<ResourceQuantum> {
        Ok(ResourceQuantum { cpu: self.cpu, memory: self.memory.to_bytes()? })
    }
}

/// A reference to one key of a pre-existing secret in the controller
/// namespace, to be copied into each user's lab secret.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabSecret {
    pub secret_ref: String,
    pub secret_key: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabFile {
    pub name: String,
    pub mount_path: String,
    pub contents: String,
    #[serde(default)]
    pub modify: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabNfsDefinition {
    pub path: String,
    pub server: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabVolume {
    pub name: String,
    pub nfs: LabNfsDefinition,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabVolumeMount {
    pub name: String,
    pub mount_path: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabSecurityContext {
    #[serde(default = "default_run_as_user")]
    pub run_as_user: i64,
    #[serde(default = "default_true")]
    pub run_as_non_root_user: bool,
    #[serde(default)]
    pub allow_privilege_escalation: bool,
}

fn default_run_as_user() -> i64 {
    1000
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabInitContainer {
    pub name: String,
    pub image: String,
    pub security_context: LabSecurityContext,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabFormRestriction {
    #[serde(rename = "type")]
    pub restriction_type: String,
    pub value: String,
    pub groups: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabForm {
    #[serde(default)]
    pub restrictions: Vec<LabFormRestriction>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabConfig {
    pub sizes: BTreeMap<LabSize, LabSizeDefinition>,
    #[serde(default)]
    pub form: LabForm,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub files: Vec<LabFile>,
    #[serde(default)]
    pub volumes: Vec<LabVolume>,
    #[serde(default)]
    pub volume_mounts: Vec<LabVolumeMount>,
    #[serde(default)]
    pub initcontainers: Vec<LabInitContainer>,
    #[serde(default)]
    pub secrets: Vec<LabSecret>,
    pub quota: Option<LabSizeDefinition>,
}

/// Wrapper matching the layout of the external prepuller API model.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PrepullerConfig {
    pub config: PrepullerSettings,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FormsConfig {
    pub forms: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    pub safir: SafirConfig,
    #[serde(default)]
    pub kubernetes: KubernetesConfig,
    pub lab: LabConfig,
    pub prepuller: PrepullerConfig,
    pub form: FormsConfig,
}

// The controller's section of a configuration file that may also configure
// other components.
#[derive(Deserialize)]
struct ConfigFile {
    controller: Config,
}

impl Config {
    pub fn load(filename: &str) -> anyhow::Result<Config> {
        let parsed: ConfigFile = serde_yaml::from_reader(File::open(filename)?)?;
        parsed.controller.validate()?;
        Ok(parsed.controller)
    }

    pub fn from_yaml(contents: &str) -> anyhow::Result<Config> {
        let parsed: ConfigFile = serde_yaml::from_str(contents)?;
        parsed.controller.validate()?;
        Ok(parsed.controller)
    }

    /// Every check here is fatal at boot; nothing downstream re-validates.
    fn validate(&self) -> EmptyResult {
        if !matches!(self.safir.profile.as_str(), "production" | "development") {
            bail!(ConfigError::invalid_profile(&self.safir.profile));
        }

        if !self.form.forms.contains_key("default") {
            let known = self.form.forms.keys().cloned().collect::<Vec<_>>().join(", ");
            bail!(ConfigError::missing_default_form(&known));
        }

        for file in &self.lab.files {
            if !file.mount_path.starts_with('/') {
                bail!(ConfigError::relative_mount_path(&file.mount_path));
            }
        }
        for mount in &self.lab.volume_mounts {
            if !mount.mount_path.starts_with('/') {
                bail!(ConfigError::relative_mount_path(&mount.mount_path));
            }
        }

        for restriction in &self.lab.form.restrictions {
            if !matches!(restriction.restriction_type.as_str(), "size" | "image" | "tag") {
                bail!(ConfigError::bad_form_restriction(&restriction.restriction_type));
            }
            if regex::Regex::new(&restriction.value).is_err() {
                bail!(ConfigError::bad_form_restriction(&restriction.value));
            }
        }

        let mut seen_keys = HashSet::new();
        for secret in &self.lab.secrets {
            if secret.secret_key == USER_TOKEN_SECRET_KEY {
                bail!(ConfigError::reserved_secret_key(&secret.secret_key));
            }
            if !seen_keys.insert(secret.secret_key.clone()) {
                bail!(ConfigError::duplicate_secret_key(&secret.secret_key));
            }
        }

        Ok(())
    }

    pub fn size_definition(&self, size: LabSize) -> Option<&LabSizeDefinition> {
        self.lab.sizes.get(&size)
    }
}
