// Well-known filesystem paths
pub const CONFIGURATION_PATH: &str = "/etc/nublado/config.yaml";
pub const DOCKER_SECRETS_PATH: &str = "/etc/secrets/.dockerconfigjson";

// Authorization scopes, validated by the external identity service
pub const ADMIN_SCOPE: &str = "admin:jupyterlab";
pub const USER_SCOPE: &str = "exec:notebook";

// HTTP surface
pub const API_BASE_PATH: &str = "/nublado/spawner/v1";
pub const IDENTITY_API_PATH: &str = "/auth/api/v1";

// Common labels on controller-created objects
pub const APP_KUBERNETES_IO_NAME_KEY: &str = "app.kubernetes.io/name";
pub const NUBLADO_USER_LABEL_KEY: &str = "nublado.lsst.io/user";
pub const NUBLADO_CATEGORY_LABEL_KEY: &str = "nublado.lsst.io/category";

// The secret key reserved for the caller's authentication token; it must
// never be provided by configuration.
pub const USER_TOKEN_SECRET_KEY: &str = "token";

// Namespacing: per-user namespaces are <prefix>-<username>, and the
// controller's own objects (prepull pods, source secrets) live in the
// namespace named by the env var, falling back to the bare prefix.
pub const NAMESPACE_PREFIX: &str = "nublado";
pub const CTRL_NS_ENV_VAR: &str = "NUBLADO_NAMESPACE";

// Docker convention: an empty tag means "latest"
pub const DOCKER_DEFAULT_TAG: &str = "latest";

// Fallback timings (seconds); normally these come from configuration
pub const KUBERNETES_REQUEST_TIMEOUT: u64 = 60;
pub const PREPULLER_POLL_INTERVAL: u64 = 60;
pub const PREPULLER_PULL_TIMEOUT: u64 = 600;

// Lab pod entry point
pub const LAB_COMMAND: &str = "/opt/lsst/software/jupyterlab/runlab.sh";
pub const LAB_PORT: i32 = 8888;
