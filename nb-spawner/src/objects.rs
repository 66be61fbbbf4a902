//! Builders for every object in a user's lab environment.  These are pure
//! constructors; the lab manager decides when (and in what order) they hit
//! the cluster.

use std::collections::BTreeMap;

use k8s_openapi::ByteString;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use nb_api::v1::{
    LabSpecification,
    ResourceQuantum,
    UserInfo,
    UserResources,
};
use nb_core::config::{
    Config,
    LabFile,
};
use nb_core::k8s::{
    build_global_object_meta,
    build_object_meta,
    user_namespace,
};
use nb_core::prelude::*;

pub fn lab_object_name(username: &str) -> String {
    format!("nb-{username}")
}

pub fn build_namespace(username: &str) -> corev1::Namespace {
    corev1::Namespace {
        metadata: build_global_object_meta(&user_namespace(username), username),
        ..Default::default()
    }
}

pub fn build_user_secret(username: &str, data: BTreeMap<String, ByteString>) -> corev1::Secret {
    corev1::Secret {
        metadata: build_object_meta(&user_namespace(username), &lab_object_name(username), username),
        data: Some(data),
        type_: Some("Opaque".into()),
        ..Default::default()
    }
}

// NSS files are mounted into the lab pod one subPath per file, so the map
// is keyed by the file name, not its mount path.
pub fn build_nss_configmap(username: &str, files: &[LabFile]) -> corev1::ConfigMap {
    let data = nss_files(files)
        .map(|f| (f.name.clone(), f.contents.clone()))
        .collect();
    corev1::ConfigMap {
        metadata: build_object_meta(
            &user_namespace(username),
            &format!("{}-nss", lab_object_name(username)),
            username,
        ),
        data: Some(data),
        ..Default::default()
    }
}

fn nss_files(files: &[LabFile]) -> impl Iterator<Item = &LabFile> {
    files.iter().filter(|f| f.name == "passwd" || f.name == "group")
}

/// The lab environment: controller-configured values first, then the
/// user's overrides, then the flags derived from the user's options.
pub fn build_env_configmap(username: &str, spec: &LabSpecification, config: &Config) -> corev1::ConfigMap {
    let mut env = config.lab.env.clone();
    env.extend(spec.env.clone());
    if spec.options.debug {
        env.insert("DEBUG".into(), "true".into());
    }
    if spec.options.reset_user_env {
        env.insert("RESET_USER_ENV".into(), "true".into());
    }

    corev1::ConfigMap {
        metadata: build_object_meta(
            &user_namespace(username),
            &format!("{}-env", lab_object_name(username)),
            username,
        ),
        data: Some(env),
        ..Default::default()
    }
}

/// Only the lab port accepts ingress; everything else inside the user
/// namespace is sealed off.
pub fn build_network_policy(username: &str) -> networkingv1::NetworkPolicy {
    networkingv1::NetworkPolicy {
        metadata: build_object_meta(&user_namespace(username), &lab_object_name(username), username),
        spec: Some(networkingv1::NetworkPolicySpec {
            pod_selector: Some(metav1::LabelSelector {
                match_labels: klabel!(APP_KUBERNETES_IO_NAME_KEY => lab_object_name(username)),
                ..Default::default()
            }),
            policy_types: Some(vec!["Ingress".into()]),
            ingress: Some(vec![networkingv1::NetworkPolicyIngressRule {
                ports: Some(vec![networkingv1::NetworkPolicyPort {
                    port: Some(IntOrString::Int(LAB_PORT)),
                    protocol: Some("TCP".into()),
                    ..Default::default()
                }]),
                ..Default::default()
            }]),
            ..Default::default()
        }),
    }
}

pub fn build_resource_quota(username: &str, quantum: &ResourceQuantum) -> corev1::ResourceQuota {
    corev1::ResourceQuota {
        metadata: build_object_meta(&user_namespace(username), &lab_object_name(username), username),
        spec: Some(corev1::ResourceQuotaSpec {
            hard: Some(BTreeMap::from([
                ("limits.cpu".to_string(), Quantity(quantum.cpu.to_string())),
                ("limits.memory".to_string(), Quantity(quantum.memory.to_string())),
            ])),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn build_lab_pod(
    user: &UserInfo,
    spec: &LabSpecification,
    resources: &UserResources,
    config: &Config,
) -> corev1::Pod {
    let username = &user.username;
    let name = lab_object_name(username);

    let mut volumes = vec![];
    let mut mounts = vec![];
    for volume in &config.lab.volumes {
        volumes.push(corev1::Volume {
            name: volume.name.clone(),
            nfs: Some(corev1::NFSVolumeSource {
                path: volume.nfs.path.clone(),
                server: volume.nfs.server.clone(),
                ..Default::default()
            }),
            ..Default::default()
        });
    }
    for mount in &config.lab.volume_mounts {
        mounts.push(corev1::VolumeMount {
            name: mount.name.clone(),
            mount_path: mount.mount_path.clone(),
            ..Default::default()
        });
    }

    if config.lab.files.iter().any(|f| f.name == "passwd" || f.name == "group") {
        volumes.push(corev1::Volume {
            name: "nss".into(),
            config_map: Some(corev1::ConfigMapVolumeSource {
                name: format!("{name}-nss"),
                ..Default::default()
            }),
            ..Default::default()
        });
        for file in config.lab.files.iter().filter(|f| f.name == "passwd" || f.name == "group") {
            mounts.push(corev1::VolumeMount {
                name: "nss".into(),
                mount_path: file.mount_path.clone(),
                sub_path: Some(file.name.clone()),
                ..Default::default()
            });
        }
    }

    let container = corev1::Container {
        name: "notebook".into(),
        args: Some(vec![LAB_COMMAND.into()]),
        image: Some(spec.options.image.clone()),
        env_from: Some(vec![corev1::EnvFromSource {
            config_map_ref: Some(corev1::ConfigMapEnvSource {
                name: format!("{name}-env"),
                optional: Some(false),
            }),
            ..Default::default()
        }]),
        ports: Some(vec![corev1::ContainerPort {
            container_port: LAB_PORT,
            name: Some("jupyterlab".into()),
            ..Default::default()
        }]),
        resources: Some(corev1::ResourceRequirements {
            limits: Some(quantities(&resources.limits)),
            requests: Some(quantities(&resources.requests)),
            ..Default::default()
        }),
        security_context: Some(corev1::SecurityContext {
            allow_privilege_escalation: Some(false),
            run_as_non_root: Some(true),
            run_as_user: Some(user.uid),
            ..Default::default()
        }),
        volume_mounts: Some(mounts),
        working_dir: Some(format!("/home/{username}")),
        ..Default::default()
    };

    let init_containers: Vec<corev1::Container> = config
        .lab
        .initcontainers
        .iter()
        .map(|ic| corev1::Container {
            name: ic.name.clone(),
            image: Some(ic.image.clone()),
            security_context: Some(corev1::SecurityContext {
                allow_privilege_escalation: Some(ic.security_context.allow_privilege_escalation),
                run_as_non_root: Some(ic.security_context.run_as_non_root_user),
                run_as_user: Some(ic.security_context.run_as_user),
                ..Default::default()
            }),
            ..Default::default()
        })
        .collect();

    corev1::Pod {
        metadata: build_object_meta(&user_namespace(username), &name, username),
        spec: Some(corev1::PodSpec {
            containers: vec![container],
            init_containers: if init_containers.is_empty() { None } else { Some(init_containers) },
            restart_policy: Some("OnFailure".into()),
            volumes: if volumes.is_empty() { None } else { Some(volumes) },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn quantities(quantum: &ResourceQuantum) -> BTreeMap<String, Quantity> {
    BTreeMap::from([
        ("cpu".to_string(), Quantity(quantum.cpu.to_string())),
        ("memory".to_string(), Quantity(quantum.memory.to_string())),
    ])
}
