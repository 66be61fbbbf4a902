use k8s_openapi::api::core::v1 as corev1;
use nb_api::v1::{
    DockerSourceConfig,
    ImageSourceConfig,
    LabSize,
    LabSpecification,
    PrepullerSettings,
    UserGroup,
    UserInfo,
    UserOptions,
};
use nb_core::config::Config;
use rstest::fixture;

use crate::constants::*;

pub fn container_image(names: &[&str], size_bytes: i64) -> corev1::ContainerImage {
    corev1::ContainerImage {
        names: Some(names.iter().map(|n| n.to_string()).collect()),
        size_bytes: Some(size_bytes),
    }
}

pub fn cluster_node(name: &str, images: Vec<corev1::ContainerImage>) -> corev1::Node {
    corev1::Node {
        metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
            name: Some(name.into()),
            ..Default::default()
        },
        spec: Some(Default::default()),
        status: Some(corev1::NodeStatus { images: Some(images), ..Default::default() }),
    }
}

pub fn cordoned_node(name: &str) -> corev1::Node {
    let mut node = cluster_node(name, vec![]);
    node.spec = Some(corev1::NodeSpec { unschedulable: Some(true), ..Default::default() });
    node
}

pub fn tainted_node(name: &str) -> corev1::Node {
    let mut node = cluster_node(name, vec![]);
    node.spec = Some(corev1::NodeSpec {
        taints: Some(vec![corev1::Taint {
            key: "node.kubernetes.io/unreachable".into(),
            effect: "NoExecute".into(),
            ..Default::default()
        }]),
        ..Default::default()
    });
    node
}

/// A tag-form reference in the test repository.
pub fn tagged_ref(tag: &str) -> String {
    format!("{TEST_REPO}:{tag}")
}

/// A digest-form reference in the test repository.
pub fn digest_ref(digest: &str) -> String {
    format!("{TEST_REPO}@{digest}")
}

#[fixture]
pub fn test_settings() -> PrepullerSettings {
    PrepullerSettings {
        recommended_tag: "recommended".into(),
        num_releases: 1,
        num_weeklies: 2,
        num_dailies: 3,
        cycle: None,
        alias_tags: vec!["recommended".into()],
        source: ImageSourceConfig::Docker(DockerSourceConfig {
            registry: "lighthouse.ceres".into(),
            repository: "library/sketchbook".into(),
        }),
        node_selector: None,
        poll_interval: 60,
        pull_timeout: 30,
    }
}

#[fixture]
pub fn test_user() -> UserInfo {
    UserInfo {
        username: TEST_USER.into(),
        name: TEST_USER_NAME.into(),
        uid: TEST_UID,
        gid: TEST_GID,
        groups: vec![UserGroup { name: TEST_GROUP.into(), id: 2023 }],
    }
}

#[fixture]
pub fn test_lab_spec(#[default("recommended")] tag: &str) -> LabSpecification {
    LabSpecification {
        options: UserOptions {
            debug: false,
            image: tagged_ref(tag),
            reset_user_env: false,
            size: LabSize::Small,
        },
        env: [("EXTERNAL_URL".to_string(), "https://lighthouse.ceres".to_string())].into(),
        namespace_quota: None,
    }
}

#[fixture]
pub fn test_config() -> Config {
    Config::from_yaml(
        r#"
---
controller:
  safir:
    name: nublado
    profile: development
    loggerName: nublado
    logLevel: DEBUG
  kubernetes:
    requestTimeout: 5
  lab:
    sizes:
      small:
        cpu: 1.0
        memory: 3GiB
      medium:
        cpu: 2.0
        memory: 6GiB
    env:
      FIREFLY_ROUTE: /portal/app
    files:
      - name: passwd
        mountPath: /etc/passwd
        contents: "root:x:0:0:root:/root:/bin/bash\n"
      - name: group
        mountPath: /etc/group
        contents: "root:x:0:\n"
    secrets:
      - secretRef: controller-secret
        secretKey: butler-secret
  prepuller:
    config:
      recommendedTag: recommended
      numReleases: 1
      numWeeklies: 2
      numDailies: 3
      aliasTags:
        - recommended
      docker:
        registry: lighthouse.ceres
        repository: library/sketchbook
      pullTimeout: 30
  form:
    forms:
      default: "<table>{{IMAGES}}{{DROPDOWN}}{{SIZES}}</table>"
"#,
    )
    .unwrap()
}
