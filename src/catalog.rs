//! Style catalog
//!
//! Static registry of the themes a portrait can be transformed into.

use std::collections::HashSet;

use crate::error::CatalogError;
use crate::image_loader::ImageHandle;

/// Edge length of the built-in preview placeholders
const PREVIEW_SIZE: u32 = 150;

/// A transformation theme
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleDefinition {
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub preview: ImageHandle,
    pub is_premium: bool,
}

impl StyleDefinition {
    pub fn new(id: &str, display_name: &str, description: &str, is_premium: bool) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            description: description.to_string(),
            preview: ImageHandle::from_uri(
                format!(
                    "/placeholder.svg?height={PREVIEW_SIZE}&width={PREVIEW_SIZE}&text={id}"
                ),
                PREVIEW_SIZE,
                PREVIEW_SIZE,
            ),
            is_premium,
        }
    }
}

/// Ordered, immutable set of styles
///
/// Always holds at least one entry, so a default style exists.
#[derive(Debug, Clone)]
pub struct StyleCatalog {
    styles: Vec<StyleDefinition>,
}

impl StyleCatalog {
    /// Build a catalog, rejecting empty lists and duplicate ids
    pub fn new(styles: Vec<StyleDefinition>) -> Result<Self, CatalogError> {
        if styles.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut seen = HashSet::new();
        for style in &styles {
            if !seen.insert(style.id.as_str()) {
                return Err(CatalogError::DuplicateId(style.id.clone()));
            }
        }

        Ok(Self { styles })
    }

    /// The themes shipped with the application
    pub fn builtin() -> Self {
        Self {
            styles: vec![
                StyleDefinition::new(
                    "pharaoh",
                    "Royal Pharaoh",
                    "A pharaoh with the golden crown and royal ornaments",
                    false,
                ),
                StyleDefinition::new(
                    "queen",
                    "Pharaonic Queen",
                    "A queen with crown and golden jewelry",
                    false,
                ),
                StyleDefinition::new(
                    "priest",
                    "Sacred Priest",
                    "A priest in holy robes with religious symbols",
                    true,
                ),
                StyleDefinition::new(
                    "scribe",
                    "Royal Scribe",
                    "A scribe with hieroglyphic writing tools",
                    false,
                ),
                StyleDefinition::new(
                    "warrior",
                    "Pharaonic Warrior",
                    "A warrior with shield and golden sword",
                    true,
                ),
                StyleDefinition::new(
                    "goddess",
                    "Egyptian Goddess",
                    "A goddess with wings and sacred symbols",
                    true,
                ),
            ],
        }
    }

    /// All styles in insertion order
    pub fn list_styles(&self) -> &[StyleDefinition] {
        &self.styles
    }

    /// Look up a style; unknown ids yield `None`
    pub fn find_style(&self, id: &str) -> Option<&StyleDefinition> {
        self.styles.iter().find(|s| s.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.find_style(id).is_some()
    }

    /// First entry of the catalog
    pub fn default_style(&self) -> &StyleDefinition {
        // Non-empty by construction
        &self.styles[0]
    }

    /// The preferred id if the catalog knows it, otherwise the first entry
    pub fn resolve_default(&self, preferred: &str) -> &StyleDefinition {
        match self.find_style(preferred) {
            Some(style) => style,
            None => {
                let fallback = self.default_style();
                tracing::warn!(
                    preferred,
                    fallback = %fallback.id,
                    "configured default style is not in the catalog"
                );
                fallback
            }
        }
    }
}

impl Default for StyleCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_listing_is_stable() {
        let catalog = StyleCatalog::builtin();
        let listing = catalog
            .list_styles()
            .iter()
            .map(|s| format!("{} premium={}", s.id, s.is_premium))
            .collect::<Vec<_>>()
            .join("\n");

        insta::assert_snapshot!(listing, @r"
        pharaoh premium=false
        queen premium=false
        priest premium=true
        scribe premium=false
        warrior premium=true
        goddess premium=true
        ");

        let again: Vec<_> = catalog.list_styles().iter().map(|s| &s.id).collect();
        let first: Vec<_> = catalog.list_styles().iter().map(|s| &s.id).collect();
        assert_eq!(again, first);
    }

    #[test]
    fn test_find_style() {
        let catalog = StyleCatalog::builtin();
        assert_eq!(catalog.find_style("queen").unwrap().display_name, "Pharaonic Queen");
        assert!(catalog.find_style("astronaut").is_none());
    }

    #[test]
    fn test_default_is_first_entry() {
        let catalog = StyleCatalog::builtin();
        assert_eq!(catalog.default_style().id, "pharaoh");
        assert_eq!(catalog.resolve_default("scribe").id, "scribe");
        assert_eq!(catalog.resolve_default("removed-style").id, "pharaoh");
    }

    #[test]
    fn test_new_rejects_empty_and_duplicates() {
        assert_eq!(StyleCatalog::new(vec![]).unwrap_err(), CatalogError::Empty);

        let dup = vec![
            StyleDefinition::new("a", "A", "", false),
            StyleDefinition::new("a", "A again", "", true),
        ];
        assert_eq!(
            StyleCatalog::new(dup).unwrap_err(),
            CatalogError::DuplicateId("a".to_string())
        );
    }

    #[test]
    fn test_previews_are_placeholders() {
        let catalog = StyleCatalog::builtin();
        for style in catalog.list_styles() {
            assert_eq!(style.preview.width(), 150);
            assert!(style.preview.uri().unwrap().contains(&style.id));
        }
    }
}
