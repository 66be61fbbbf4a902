//! The prepull reconciler: a long-lived loop that compares the desired
//! menu against per-node image state and drives short-lived pods to pull
//! whatever is missing.

use std::collections::HashMap;
use std::time::Duration;

use nb_api::v1::{
    DisplayImages,
    Node,
    NodeImage,
    NodeImageWithMissing,
    PrepullerContents,
    PrepullerSettings,
    PrepullerStatus,
};
use nb_core::k8s::{
    build_object_meta,
    controller_namespace,
};
use nb_core::prelude::*;
use nb_core::tasks::TaskGroup;
use tokio::sync::{
    Mutex,
    watch,
};
use tokio::time::sleep;
use tracing::*;

use crate::inventory::{
    self,
    InventoryImage,
    Snapshot,
};
use crate::menu;

// Prepull pods don't need a real identity; any non-zero uid will do.
const PREPULL_UID: i64 = 1000;

pub struct Prepuller {
    client: kube::Client,
    settings: PrepullerSettings,
    namespace: String,

    // One active pull campaign per image, keyed by image reference;
    // entries are added before spawning and removed after close.
    active: Mutex<HashMap<String, TaskGroup>>,
}

impl Prepuller {
    pub fn new(client: kube::Client, settings: PrepullerSettings) -> Prepuller {
        Prepuller {
            client,
            settings,
            namespace: controller_namespace(),
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Loop until told to stop.  Per-pass failures are logged and retried
    /// on the next tick; a fresh snapshot fixes everything eventually.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("starting prepull executor");
        loop {
            if let Err(e) = self.prepull_images().await {
                warn!("prepull pass failed: {e:#}");
            }
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = sleep(Duration::from_secs(self.settings.poll_interval)) => (),
            }
        }
        info!("shutting down prepull executor");
        self.aclose().await;
    }

    pub async fn get_prepulls(&self) -> anyhow::Result<PrepullerStatus> {
        let snapshot = inventory::take_snapshot(&self.client, &self.settings).await?;
        Ok(self.status_from_snapshot(&snapshot))
    }

    pub async fn menu_images(&self) -> anyhow::Result<DisplayImages> {
        let snapshot = inventory::take_snapshot(&self.client, &self.settings).await?;
        Ok(menu::display_images(&snapshot.images, &self.settings))
    }

    /// True if the reference (under any of its tags) is present in the
    /// current inventory.
    pub async fn image_exists(&self, reference: &str) -> anyhow::Result<bool> {
        let snapshot = inventory::take_snapshot(&self.client, &self.settings).await?;
        Ok(snapshot.images.iter().any(|image| image.matches_reference(reference)))
    }

    fn status_from_snapshot(&self, snapshot: &Snapshot) -> PrepullerStatus {
        let eligible: Vec<&Node> = snapshot.nodes.iter().filter(|n| n.eligible).collect();
        let menu = menu::desired_menu(&snapshot.images, &self.settings);

        let mut contents = PrepullerContents::default();
        for image in menu.values() {
            let present = nodes_present(image, &eligible);
            if image.prepulled {
                contents.prepulled.push(NodeImage {
                    path: image.reference(),
                    name: image.name.clone(),
                    digest: image.digest.clone(),
                    nodes: present,
                });
            } else {
                contents.pending.push(NodeImageWithMissing {
                    path: image.reference(),
                    name: image.name.clone(),
                    digest: image.digest.clone(),
                    nodes: present,
                    missing: nodes_missing(image, &eligible),
                });
            }
        }

        PrepullerStatus {
            config: self.settings.clone(),
            images: contents,
            nodes: snapshot.nodes.clone(),
        }
    }

    /// One reconciliation pass: find every (image, node) pair that needs a
    /// pull and run one bounded pod campaign per image.
    pub async fn prepull_images(&self) -> EmptyResult {
        let status = self.get_prepulls().await?;
        let pull_timeout = Duration::from_secs(self.settings.pull_timeout);

        // Parallelize across nodes but not across images
        for image in status.images.pending {
            let missing: Vec<String> =
                image.missing.iter().filter(|n| n.eligible).map(|n| n.name.clone()).collect();
            if missing.is_empty() {
                continue;
            }

            {
                let mut active = self.active.lock().await;
                if active.contains_key(&image.path) {
                    warn!("pull campaign for {} already exists; presuming the earlier pull is still in progress", image.path);
                    continue;
                }

                let mut group = TaskGroup::new(pull_timeout);
                for node in &missing {
                    let pods_api = kube::Api::<corev1::Pod>::namespaced(self.client.clone(), &self.namespace);
                    let pod = build_pull_pod(&image.path, node, &self.namespace);
                    group.spawn(async move {
                        pods_api.create(&Default::default(), &pod).await?;
                        Ok(())
                    });
                }
                active.insert(image.path.clone(), group);
            }

            debug!(
                "waiting up to {}s for {} pull pods on {} node(s)",
                self.settings.pull_timeout,
                image.path,
                missing.len()
            );
            let mut active = self.active.lock().await;
            if let Some(group) = active.get_mut(&image.path) {
                // Per-pod failures don't matter here: presence is verified
                // on the next snapshot, so a failed pull gets retried
                if let Err(e) = group.close().await {
                    warn!("pull campaign for {} failed: {e:#}", image.path);
                }
                active.remove(&image.path);
            }
        }

        Ok(())
    }

    // Close any leftover pull campaigns, all in parallel, each bounded by
    // the pull timeout.
    async fn aclose(&self) {
        let drained: Vec<(String, TaskGroup)> = self.active.lock().await.drain().collect();
        if drained.is_empty() {
            return;
        }

        let mut closer = TaskGroup::new(Duration::from_secs(self.settings.pull_timeout));
        for (image, mut group) in drained {
            warn!("terminating pull campaign for {image}");
            closer.spawn(async move { group.close().await });
        }
        if let Err(e) = closer.close().await {
            warn!("failed to close pull campaigns: {e:#}");
        }
    }
}

fn nodes_present(image: &InventoryImage, eligible: &[&Node]) -> Vec<Node> {
    eligible.iter().filter(|n| image.nodes.contains(&n.name)).map(|n| (*n).clone()).collect()
}

fn nodes_missing(image: &InventoryImage, eligible: &[&Node]) -> Vec<Node> {
    eligible.iter().filter(|n| !image.nodes.contains(&n.name)).map(|n| (*n).clone()).collect()
}

// A trivial command is enough to make the kubelet fetch the image; the pod
// itself has nothing to do.
pub(crate) fn build_pull_pod(image_ref: &str, node: &str, namespace: &str) -> corev1::Pod {
    let tag = image_ref.rsplit(':').next().unwrap_or(DOCKER_DEFAULT_TAG);
    let name = sanitize_name(&format!("prepull-{tag}-{node}"));
    corev1::Pod {
        metadata: build_object_meta(namespace, &name, "prepuller"),
        spec: Some(corev1::PodSpec {
            containers: vec![corev1::Container {
                name: "prepull".into(),
                command: Some(vec!["/bin/sleep".into(), "5".into()]),
                image: Some(image_ref.into()),
                security_context: Some(corev1::SecurityContext {
                    run_as_non_root: Some(true),
                    run_as_user: Some(PREPULL_UID),
                    ..Default::default()
                }),
                working_dir: Some("/tmp".into()),
                ..Default::default()
            }],
            node_name: Some(node.into()),
            restart_policy: Some("Never".into()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

// Tags are full of characters pod names can't carry
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect::<String>()
        .trim_matches('-')
        .to_string()
}
