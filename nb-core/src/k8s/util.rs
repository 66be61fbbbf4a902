use std::env;

use crate::prelude::*;

/// Strip the specifier from either a digest-form or tag-form image
/// reference, leaving registry + repository.
pub fn extract_path_from_image_ref(image_ref: &str) -> String {
    if let Some((path, _)) = image_ref.split_once("@sha256:") {
        path.into()
    } else if let Some((path, _)) = image_ref.rsplit_once(':') {
        path.into()
    } else {
        image_ref.into()
    }
}

pub fn extract_digest_from_image_ref(image_ref: &str) -> Option<String> {
    image_ref.split_once('@').map(|(_, digest)| digest.into())
}

/// The tag of a tag-form reference; digest-form references have no tag.
pub fn extract_tag_from_image_ref(image_ref: &str) -> Option<String> {
    if image_ref.contains("@sha256:") {
        return None;
    }
    image_ref.rsplit_once(':').map(|(_, tag)| tag.into())
}

/// The namespace holding one user's entire lab environment.
pub fn user_namespace(username: &str) -> String {
    format!("{NAMESPACE_PREFIX}-{username}")
}

/// The controller's own namespace, where prepull pods run and source
/// secrets live.
pub fn controller_namespace() -> String {
    env::var(CTRL_NS_ENV_VAR).unwrap_or_else(|_| NAMESPACE_PREFIX.into())
}

pub fn build_global_object_meta(name: &str, username: &str) -> metav1::ObjectMeta {
    metav1::ObjectMeta {
        name: Some(name.into()),
        labels: klabel!(
            APP_KUBERNETES_IO_NAME_KEY => name,
            NUBLADO_USER_LABEL_KEY => username,
        ),
        ..Default::default()
    }
}

pub fn build_object_meta(namespace: &str, name: &str, username: &str) -> metav1::ObjectMeta {
    metav1::ObjectMeta {
        namespace: Some(namespace.into()),
        name: Some(name.into()),
        labels: klabel!(
            APP_KUBERNETES_IO_NAME_KEY => name,
            NUBLADO_USER_LABEL_KEY => username,
        ),
        ..Default::default()
    }
}
