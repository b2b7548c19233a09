use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Extension carried by every stored document identifier.
pub const DOCUMENT_EXTENSION: &str = ".json";

/// Wire value meaning "use the style embedded in the document".
pub const DEFAULT_STYLE: &str = "default";

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    #[default]
    Characters,
    Environments,
    Styles,
    Gallery,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Characters,
        Category::Environments,
        Category::Styles,
        Category::Gallery,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Characters => "characters",
            Category::Environments => "environments",
            Category::Styles => "styles",
            Category::Gallery => "gallery",
        }
    }

    /// `gallery` only aggregates assets and has no document collection behind it.
    pub fn has_documents(self) -> bool {
        !matches!(self, Category::Gallery)
    }

    /// Whether a document of this category can be rendered into media assets.
    pub fn supports_rendering(self) -> bool {
        matches!(self, Category::Characters | Category::Environments)
    }

    /// Style overrides only apply when rendering characters.
    pub fn supports_style_override(self) -> bool {
        matches!(self, Category::Characters)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown category '{0}'")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        Category::ALL
            .into_iter()
            .find(|category| category.as_str() == normalized)
            .ok_or_else(|| UnknownCategory(raw.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    pub category: Category,
    pub identifier: String,
}

impl DocumentRef {
    pub fn new(category: Category, identifier: impl Into<String>) -> Self {
        Self {
            category,
            identifier: identifier.into(),
        }
    }

    /// Identifier with the document extension removed, as the generation backend addresses it.
    pub fn bare_identifier(&self) -> &str {
        bare_identifier(&self.identifier)
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.identifier)
    }
}

pub fn bare_identifier(identifier: &str) -> &str {
    identifier
        .strip_suffix(DOCUMENT_EXTENSION)
        .unwrap_or(identifier)
}

/// Turns a user supplied document name into a stored identifier, appending the document
/// extension when it is missing. Returns `None` when nothing usable remains.
pub fn resolve_identifier(name: &str) -> Option<String> {
    let name = name.trim();
    if bare_identifier(name).is_empty() {
        return None;
    }
    if name.ends_with(DOCUMENT_EXTENSION) {
        Some(name.to_string())
    } else {
        Some(format!("{name}{DOCUMENT_EXTENSION}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Image,
    Video,
}

impl MediaType {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "png" | "jpg" | "jpeg" | "webp" | "gif" => Some(MediaType::Image),
            "mp4" | "webm" | "mov" => Some(MediaType::Video),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub media_type: MediaType,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StyleOverride {
    #[default]
    DocumentDefault,
    Named(String),
}

impl StyleOverride {
    /// Parses a style selection; blank input and `default` both mean the document's own style.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case(DEFAULT_STYLE) {
            StyleOverride::DocumentDefault
        } else {
            StyleOverride::Named(bare_identifier(raw).to_string())
        }
    }

    pub fn as_style_id(&self) -> Option<&str> {
        match self {
            StyleOverride::DocumentDefault => None,
            StyleOverride::Named(style) => Some(style),
        }
    }
}

impl fmt::Display for StyleOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StyleOverride::DocumentDefault => f.write_str(DEFAULT_STYLE),
            StyleOverride::Named(style) => f.write_str(style),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_identifier_with_and_without_extension() {
        assert_eq!(resolve_identifier("foo").as_deref(), Some("foo.json"));
        assert_eq!(resolve_identifier(" foo.json ").as_deref(), Some("foo.json"));
        assert_eq!(resolve_identifier("   "), None);
        assert_eq!(resolve_identifier(".json"), None);
    }

    #[test]
    fn parses_categories_case_insensitively() {
        assert_eq!("Characters".parse::<Category>(), Ok(Category::Characters));
        assert_eq!("gallery".parse::<Category>(), Ok(Category::Gallery));
        assert!("props".parse::<Category>().is_err());
    }

    #[test]
    fn style_override_default_spellings() {
        assert_eq!(StyleOverride::parse("default"), StyleOverride::DocumentDefault);
        assert_eq!(StyleOverride::parse(""), StyleOverride::DocumentDefault);
        assert_eq!(
            StyleOverride::parse("noir.json"),
            StyleOverride::Named("noir".to_string())
        );
    }

    #[test]
    fn asset_media_type_uses_type_field_on_the_wire() {
        let asset: Asset =
            serde_json::from_str(r#"{"name":"hero_01.png","path":"/outputs/hero_01.png","type":"image"}"#)
                .expect("asset");
        assert_eq!(asset.media_type, MediaType::Image);
    }
}
