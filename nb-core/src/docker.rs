use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;

use base64::prelude::*;
use serde::Deserialize;
use tracing::*;

use crate::errors::*;

err_impl! {DockerConfigError,
    #[error("malformed docker auth entry for {0}")]
    MalformedAuth(String),
}

#[derive(Clone, Debug)]
pub struct DockerCredentials {
    pub registry_host: String,
    pub username: String,
    pub password: String,
}

pub type DockerCredentialsMap = HashMap<String, DockerCredentials>;

// The standard .dockerconfigjson shape: auths.{host}.auth is
// base64("user:password").
#[derive(Deserialize)]
struct DockerConfigJson {
    auths: HashMap<String, DockerConfigEntry>,
}

#[derive(Deserialize)]
struct DockerConfigEntry {
    auth: String,
}

/// Load registry credentials from a mounted image pull secret.  A missing
/// file is fine; it just means we only talk to unauthenticated registries.
pub fn load_credentials(path: &str) -> anyhow::Result<DockerCredentialsMap> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("no docker credentials found at {path}");
            return Ok(HashMap::new());
        },
        Err(e) => return Err(e.into()),
    };

    let credstore: DockerConfigJson = serde_json::from_str(&contents)?;
    let mut credentials = HashMap::new();
    for (host, entry) in credstore.auths {
        let decoded = BASE64_STANDARD.decode(&entry.auth)?;
        let basic_auth = String::from_utf8(decoded)?;
        let (username, password) = basic_auth
            .split_once(':')
            .ok_or_else(|| DockerConfigError::malformed_auth(&host))?;
        credentials.insert(host.clone(), DockerCredentials {
            registry_host: host.clone(),
            username: username.into(),
            password: password.into(),
        });
    }
    Ok(credentials)
}
