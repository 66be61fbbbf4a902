mod reconciler_test;

use nb_api::v1::PrepullerSettings;
use nb_core::prelude::*;
use nb_testutils::*;

use super::*;

// Build a list of single-tag image entries, one digest per tag, present on
// the given node.
pub fn entries_for_tags(tags: &[&str]) -> Vec<corev1::ContainerImage> {
    tags.iter()
        .enumerate()
        .map(|(i, tag)| {
            container_image(&[&digest_ref(&format!("sha256:{i:04}")), &tagged_ref(tag)], 1 << 30)
        })
        .collect()
}
