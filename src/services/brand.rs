//! Brand concept prompt augmentation

use crate::models::BrandConcept;

/// Heading that marks an augmented prompt
pub const BRAND_BLOCK_HEADER: &str = "Brand guidelines:";

/// Append the brand's guidelines to a prompt.
///
/// Only fields that are present produce a line. A prompt that already carries
/// the guidelines block is returned unchanged.
pub fn augment_prompt(prompt: &str, brand: &BrandConcept) -> String {
    if prompt.contains(BRAND_BLOCK_HEADER) {
        return prompt.to_string();
    }

    let lines = brand_lines(brand);
    if lines.is_empty() {
        return prompt.to_string();
    }

    format!(
        "{}\n\n{}\n{}",
        prompt.trim_end(),
        BRAND_BLOCK_HEADER,
        lines.join("\n")
    )
}

fn brand_lines(brand: &BrandConcept) -> Vec<String> {
    let mut lines = Vec::new();

    if let Some(name) = present(Some(&brand.name)) {
        lines.push(format!("- Brand name: {}", name));
    }
    if let Some(voice) = present(brand.voice.as_ref()) {
        lines.push(format!("- Voice: {}", voice));
    }
    let values: Vec<&str> = brand
        .values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect();
    if !values.is_empty() {
        lines.push(format!("- Values: {}", values.join(", ")));
    }
    if let Some(style) = present(brand.visual_style.as_ref()) {
        lines.push(format!("- Visual style: {}", style));
    }
    if let Some(tagline) = present(brand.tagline.as_ref()) {
        lines.push(format!("- Tagline: \"{}\"", tagline));
    }

    lines
}

fn present(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}
