//! Menu selection: the bounded, ordered list of images offered to users at
//! spawn time.

use std::cmp::Ordering;

use indexmap::IndexMap;
use nb_api::v1::{
    DisplayImages,
    PrepullerSettings,
};
use nb_core::tag::TagType;

use crate::inventory::InventoryImage;

/// Choose the desired menu from the inventory: the recommended pin first,
/// then up to the configured number of releases, weeklies, and dailies,
/// each most-recent-first.  Experimental and unrecognized images never
/// count against the caps.
pub fn desired_menu(images: &[InventoryImage], settings: &PrepullerSettings) -> IndexMap<String, InventoryImage> {
    let mut menu = IndexMap::new();

    for image in images {
        if image.tag == settings.recommended_tag {
            menu.insert(image.tag.clone(), image.clone());
        }
    }

    let caps = [
        (TagType::Release, settings.num_releases),
        (TagType::Weekly, settings.num_weeklies),
        (TagType::Daily, settings.num_dailies),
    ];
    for (tag_type, cap) in caps {
        let mut bucket: Vec<&InventoryImage> = images.iter().filter(|i| i.tag_type == tag_type).collect();
        bucket.sort_by(|a, b| cmp_descending(a, b));
        for image in bucket.into_iter().take(cap) {
            menu.entry(image.tag.clone()).or_insert_with(|| image.clone());
        }
    }

    menu
}

// Within-type descending order: version when both images carry one, with
// the raw tag (also descending) breaking ties.
fn cmp_descending(a: &InventoryImage, b: &InventoryImage) -> Ordering {
    match (&b.version, &a.version) {
        (Some(vb), Some(va)) => vb.cmp(va).then_with(|| b.tag.cmp(&a.tag)),
        _ => b.tag.cmp(&a.tag),
    }
}

/// What users actually see: only prepulled images make the visible menu,
/// but everything in the inventory shows up in the dropdown's "all" map.
pub fn display_images(images: &[InventoryImage], settings: &PrepullerSettings) -> DisplayImages {
    let menu = desired_menu(images, settings)
        .into_iter()
        .filter(|(_, image)| image.prepulled)
        .map(|(tag, image)| (tag, image.to_image()))
        .collect();

    let all = images.iter().map(|image| (image.tag.clone(), image.to_image())).collect();

    DisplayImages { menu, all }
}
