mod inventory;
mod menu;
mod reconciler;

pub use crate::inventory::{
    InventoryImage,
    Snapshot,
    build_snapshot,
    take_snapshot,
};
pub use crate::menu::{
    desired_menu,
    display_images,
};
pub use crate::reconciler::Prepuller;

#[cfg(test)]
mod tests;
