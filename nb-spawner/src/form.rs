//! Rendering of the spawner options form: the HTML fragment the hub embeds
//! to let a user pick an image and a size.

use nb_api::v1::DisplayImages;
use nb_core::config::Config;
use nb_core::errors::*;
use nb_core::tag;
use tracing::*;

pub const DROPDOWN_SENTINEL: &str = "use_image_from_dropdown";

/// Render the configured `default` form template, substituting the menu
/// radio buttons, the all-images dropdown, and the size list.
pub fn generate_user_lab_form(username: &str, images: &DisplayImages, config: &Config) -> anyhow::Result<String> {
    info!("creating options form for '{username}'");
    let template = config
        .form
        .forms
        .get("default")
        .ok_or_else(|| anyhow!("no default spawner form configured"))?;

    let mut image_rows = String::new();
    for (i, image) in images.menu.values().enumerate() {
        let checked = if i == 0 { " checked" } else { "" };
        image_rows += &format!(
            "<input type=\"radio\" name=\"image_list\" id=\"image{idx}\" value=\"{path}\"{checked}>\n\
             <label for=\"image{idx}\">{name}</label><br />\n",
            idx = i + 1,
            path = image.path,
            name = image.name,
        );
    }

    let mut dropdown = format!(
        "<input type=\"radio\" name=\"image_list\" id=\"{DROPDOWN_SENTINEL}\" \
         value=\"{DROPDOWN_SENTINEL}\"{}>\n\
         <label for=\"{DROPDOWN_SENTINEL}\">Select uncached image (slower start):</label><br />\n\
         <select name=\"image_dropdown\">\n",
        if images.menu.is_empty() { " checked" } else { "" },
    );
    for image in images.all.values() {
        dropdown += &format!("<option value=\"{}\">{}</option>\n", image.path, image.name);
    }
    dropdown += "</select>\n";

    let mut size_rows = String::new();
    for (i, (size, definition)) in config.lab.sizes.iter().enumerate() {
        let checked = if i == 0 { " checked" } else { "" };
        size_rows += &format!(
            "<input type=\"radio\" name=\"size\" id=\"{size}\" value=\"{size}\"{checked}>\n\
             <label for=\"{size}\">{title} ({cpu} CPU, {memory} RAM)</label><br />\n",
            title = tag::prettify(&size.to_string()),
            cpu = definition.cpu,
            memory = definition.memory,
        );
    }

    Ok(template
        .replace("{{IMAGES}}", &image_rows)
        .replace("{{DROPDOWN}}", &dropdown)
        .replace("{{SIZES}}", &size_rows))
}
