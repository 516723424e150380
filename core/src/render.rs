//! Pure rendering utility shared by the store and the Integration resolver (§4.2)

/// Render an entity for embedding: `"{name} ({type}): {description}"`,
/// whitespace trimmed. Deterministic — the embedding computed from this
/// rendering is what I6 ties an entity's stored `embedding` to.
pub fn render_entity(name: &str, entity_type: &str, description: Option<&str>) -> String {
    let description = description.unwrap_or("");
    format!("{} ({}): {}", name, entity_type, description)
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_with_description() {
        let rendered = render_entity("NeRF", "Method", Some("a volumetric scene representation"));
        assert_eq!(rendered, "NeRF (Method): a volumetric scene representation");
    }

    #[test]
    fn trims_when_description_missing() {
        let rendered = render_entity("NeRF", "Method", None);
        assert_eq!(rendered, "NeRF (Method):");
    }
}
