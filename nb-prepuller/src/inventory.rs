//! Per-node image state, assembled from a single list-nodes call: which
//! image digests exist where, under which tags, and whether each one is
//! already everywhere it needs to be.

use std::collections::{
    BTreeMap,
    HashSet,
};

use indexmap::IndexMap;
use nb_api::v1::{
    Image,
    Node,
    PrepullerSettings,
};
use nb_core::errors::*;
use nb_core::k8s::{
    extract_digest_from_image_ref,
    extract_path_from_image_ref,
    extract_tag_from_image_ref,
};
use nb_core::prelude::*;
use nb_core::tag::{
    self,
    ImageTag,
    TagType,
};
use tracing::*;

err_impl! {InventoryError,
    #[error("image entry has conflicting digests: {0}")]
    ConflictingDigests(String),
}

/// One tag-form sighting of an image on one node.
#[derive(Clone, Debug)]
struct TagSighting {
    tag: ImageTag,
    image_ref: String,
    digest: String,
    node: String,
    size: i64,
}

/// The cluster-wide state of one image digest.  The digest is the primary
/// key; tags are the union of every sighting, and the primary tag/display
/// name are chosen by [`consolidate_tags`].
#[derive(Clone, Debug)]
pub struct InventoryImage {
    pub path: String,
    pub digest: String,
    pub name: String,
    pub tag: String,
    pub tag_type: TagType,
    pub version: Option<semver::Version>,
    pub tags: BTreeMap<String, String>,
    pub size: i64,
    pub nodes: Vec<String>,
    pub prepulled: bool,
}

impl InventoryImage {
    /// The pullable reference for this image's primary tag.
    pub fn reference(&self) -> String {
        format!("{}:{}", self.path, self.tag)
    }

    pub fn to_image(&self) -> Image {
        Image {
            path: self.reference(),
            name: self.name.clone(),
            digest: self.digest.clone(),
        }
    }

    /// True if any of this image's tags produces the given reference.
    pub fn matches_reference(&self, reference: &str) -> bool {
        self.tags.keys().any(|t| format!("{}:{}", self.path, t) == reference)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    pub images: Vec<InventoryImage>,
    pub nodes: Vec<Node>,
}

pub async fn take_snapshot(client: &kube::Client, settings: &PrepullerSettings) -> anyhow::Result<Snapshot> {
    debug!("listing nodes and their image contents");
    let node_api = kube::Api::<corev1::Node>::all(client.clone());
    let node_list = node_api.list(&Default::default()).await?;
    Ok(build_snapshot(&node_list.items, settings))
}

/// Assemble a snapshot from raw node objects.  All the interesting logic
/// lives here rather than in [`take_snapshot`] so it can run against
/// synthetic nodes.
pub fn build_snapshot(cluster_nodes: &[corev1::Node], settings: &PrepullerSettings) -> Snapshot {
    let mut nodes = vec![];
    let mut sightings = vec![];

    for cluster_node in cluster_nodes {
        let name = cluster_node.name_any();
        let (eligible, comment) = node_eligibility(cluster_node, settings);

        if let Some(entries) = cluster_node.status.as_ref().and_then(|s| s.images.as_ref()) {
            for entry in entries {
                match sightings_from_entry(entry, &name, settings) {
                    Ok(mut found) => sightings.append(&mut found),
                    // Inconsistent entries are dropped, not fatal; the rest
                    // of the snapshot is still usable
                    Err(e) => warn!("ignoring image entry on {name}: {e}"),
                }
            }
        }

        nodes.push(Node { name, eligible, comment, cached: vec![] });
    }

    if settings.cycle.is_some() {
        sightings.retain(|s| s.tag.cycle == settings.cycle);
    }

    let mut images = images_from_sightings(sightings, settings);
    apply_prepulled(&mut images, &nodes);
    populate_node_caches(&mut nodes, &images);
    restrict_to_eligible_nodes(&mut images, &nodes);

    Snapshot { images, nodes }
}

/// A node is an eligible prepull/lab target unless it is cordoned, carries
/// a hard taint, or misses the configured node-selector labels.
fn node_eligibility(node: &corev1::Node, settings: &PrepullerSettings) -> (bool, Option<String>) {
    if node.spec.as_ref().and_then(|s| s.unschedulable) == Some(true) {
        return (false, Some("node is cordoned".into()));
    }

    if let Some(taints) = node.spec.as_ref().and_then(|s| s.taints.as_ref()) {
        if let Some(taint) = taints.iter().find(|t| t.effect == "NoSchedule" || t.effect == "NoExecute") {
            return (false, Some(format!("node is tainted ({})", taint.key)));
        }
    }

    if let Some(selector) = &settings.node_selector {
        let labels = node.labels();
        if !selector.iter().all(|(k, v)| labels.get(k) == Some(v)) {
            return (false, Some("node does not match the configured node selector".into()));
        }
    }

    (true, None)
}

// A single entry may carry several names: one digest-form and zero or more
// tag-form.  Disagreeing digest-form names make the whole entry unusable.
fn sightings_from_entry(
    entry: &corev1::ContainerImage,
    node: &str,
    settings: &PrepullerSettings,
) -> anyhow::Result<Vec<TagSighting>> {
    let Some(names) = entry.names.as_ref() else {
        return Ok(vec![]);
    };

    let mut digest = String::new();
    for name in names {
        if let Some(this_digest) = extract_digest_from_image_ref(name) {
            if digest.is_empty() {
                digest = this_digest;
            } else if digest != this_digest {
                bail!(InventoryError::conflicting_digests(name));
            }
        }
    }

    let image_name = settings.source.image_name();
    let mut sightings = vec![];
    for name in names {
        // Skip the digest pseudo-tag; that does mean there's no way to see
        // untagged images, unless one is pinned by digest in the config
        if name.contains("@sha256:") {
            continue;
        }
        let path = extract_path_from_image_ref(name);
        if path.rsplit('/').next() != Some(image_name) {
            continue;
        }
        let Some(raw_tag) = extract_tag_from_image_ref(name) else {
            continue;
        };

        let mut parsed = tag::parse_with_aliases(&raw_tag, &settings.alias_tags);
        if parsed.display_name == parsed.tag {
            parsed.display_name = tag::prettify(&parsed.tag);
        }
        sightings.push(TagSighting {
            tag: parsed,
            image_ref: name.clone(),
            digest: digest.clone(),
            node: node.into(),
            size: entry.size_bytes.unwrap_or(0),
        });
    }
    Ok(sightings)
}

fn images_from_sightings(sightings: Vec<TagSighting>, settings: &PrepullerSettings) -> Vec<InventoryImage> {
    let mut by_digest: IndexMap<String, InventoryImage> = IndexMap::new();

    for sighting in sightings {
        // Only the digest pseudo-tag legitimately has no digest
        if sighting.digest.is_empty() {
            continue;
        }
        let path = extract_path_from_image_ref(&sighting.image_ref);

        if let Some(extant) = by_digest.get_mut(&sighting.digest) {
            if extant.path != path {
                warn!("image {} found as {} and also {}; keeping the former", sighting.digest, extant.path, path);
                continue;
            }
            extant.tags.insert(sighting.tag.tag, sighting.tag.display_name);
            if !extant.nodes.contains(&sighting.node) {
                extant.nodes.push(sighting.node);
            }
            continue;
        }

        debug!("adding {} as {}:{}", sighting.digest, path, sighting.tag.tag);
        by_digest.insert(sighting.digest.clone(), InventoryImage {
            path,
            digest: sighting.digest.clone(),
            name: sighting.tag.display_name.clone(),
            tag: sighting.tag.tag.clone(),
            tag_type: sighting.tag.tag_type,
            version: sighting.tag.version.clone(),
            tags: BTreeMap::from([(sighting.tag.tag, sighting.tag.display_name)]),
            size: sighting.size,
            nodes: vec![sighting.node],
            prepulled: false,
        });
    }

    let mut images: Vec<InventoryImage> = by_digest.into_values().collect();
    for image in images.iter_mut() {
        consolidate_tags(image, settings);
    }
    images
}

/// Pick the image's primary tag and display name: the recommended tag if
/// the image carries it, otherwise the best concrete tag.
fn consolidate_tags(image: &mut InventoryImage, settings: &PrepullerSettings) {
    let parsed: Vec<ImageTag> = image
        .tags
        .keys()
        .map(|t| {
            let mut p = tag::parse_with_aliases(t, &settings.alias_tags);
            if p.display_name == p.tag {
                p.display_name = tag::prettify(&p.tag);
            }
            p
        })
        .collect();

    let primary = parsed
        .iter()
        .find(|t| t.tag == settings.recommended_tag)
        .or_else(|| best_tag(&parsed));

    if let Some(primary) = primary {
        image.tag = primary.tag.clone();
        image.name = primary.display_name.clone();
        image.tag_type = primary.tag_type;
        image.version = primary.version.clone();
    }
}

// The best tag is the non-alias tag of the highest-priority type with the
// highest version within that type.
fn best_tag(parsed: &[ImageTag]) -> Option<&ImageTag> {
    let candidates: Vec<&ImageTag> = parsed.iter().filter(|t| t.is_recognized()).collect();
    let pool = if candidates.is_empty() { parsed.iter().collect() } else { candidates };
    pool.into_iter()
        .min_by(|a, b| a.tag_type.cmp(&b.tag_type).then_with(|| b.cmp_within_type(a)))
}

// Prepulled = present on every eligible node; with no eligible nodes there
// is nowhere left to pull to, so everything counts as prepulled.
fn apply_prepulled(images: &mut [InventoryImage], nodes: &[Node]) {
    let eligible: HashSet<&str> = nodes.iter().filter(|n| n.eligible).map(|n| n.name.as_str()).collect();
    for image in images.iter_mut() {
        image.prepulled = eligible.iter().all(|name| image.nodes.iter().any(|n| n == name));
    }
}

fn populate_node_caches(nodes: &mut [Node], images: &[InventoryImage]) {
    for node in nodes.iter_mut() {
        node.cached = images
            .iter()
            .filter(|i| i.nodes.contains(&node.name))
            .map(|i| i.to_image())
            .collect();
    }
}

// Presence on ineligible nodes is irrelevant downstream; strip it so the
// status endpoints only report nodes that matter.
fn restrict_to_eligible_nodes(images: &mut [InventoryImage], nodes: &[Node]) {
    let eligible: HashSet<&str> = nodes.iter().filter(|n| n.eligible).map(|n| n.name.as_str()).collect();
    for image in images.iter_mut() {
        image.nodes.retain(|n| eligible.contains(n.as_str()));
    }
}
