//! Catalog - Static Two-List Title Catalog
//!
//! ## Responsibilities
//!
//! - Immutable primary (movies) and secondary (series) lists
//! - Case-insensitive exact title resolution
//! - List-position identifiers for detail-view navigation
//! - Optional JSON file override of the built-in catalog

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// One recommendable title
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub title: String,
    pub rating: f32,
    pub poster: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl CatalogItem {
    fn new(title: &str, rating: f32, poster: &str, description: &str) -> Self {
        Self {
            title: title.to_string(),
            rating,
            poster: poster.to_string(),
            description: Some(description.to_string()),
        }
    }
}

/// Which list an item belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    /// Movies
    Primary,
    /// Series
    Secondary,
}

impl ListKind {
    /// Query-string label used by the detail view ("movies" / "series")
    pub fn as_str(&self) -> &'static str {
        match self {
            ListKind::Primary => "movies",
            ListKind::Secondary => "series",
        }
    }

    /// Unknown labels select the primary list
    pub fn from_label(label: &str) -> Self {
        if label.eq_ignore_ascii_case("series") {
            ListKind::Secondary
        } else {
            ListKind::Primary
        }
    }
}

/// List-position identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CatalogRef {
    pub list: ListKind,
    pub index: usize,
}

impl std::fmt::Display for CatalogRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.list.as_str(), self.index)
    }
}

/// Static catalog, loaded once and shared behind an `Arc`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(rename = "movies")]
    primary: Vec<CatalogItem>,
    #[serde(rename = "series", default)]
    secondary: Vec<CatalogItem>,
}

impl Catalog {
    /// Build a catalog; titles must be unique (case-insensitively) across
    /// both lists, so every title resolves to exactly one item
    pub fn new(primary: Vec<CatalogItem>, secondary: Vec<CatalogItem>) -> Result<Self> {
        let mut seen: HashMap<String, ListKind> = HashMap::new();
        for (kind, list) in [(ListKind::Primary, &primary), (ListKind::Secondary, &secondary)] {
            for (i, item) in list.iter().enumerate() {
                if item.title.trim().is_empty() {
                    return Err(Error::Validation(format!(
                        "{} entry {} has an empty title",
                        kind.as_str(),
                        i
                    )));
                }
                if let Some(first) = seen.insert(item.title.trim().to_lowercase(), kind) {
                    return Err(Error::Validation(format!(
                        "duplicate title '{}' in {} (already listed in {})",
                        item.title,
                        kind.as_str(),
                        first.as_str()
                    )));
                }
            }
        }
        Ok(Self { primary, secondary })
    }

    /// Load `{"movies": [...], "series": [...]}` from disk
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| {
                Error::Config(format!("failed to read catalog {}: {}", path.display(), e))
            })?;
        let parsed: Catalog = serde_json::from_str(&contents)?;
        let catalog = Self::new(parsed.primary, parsed.secondary)?;

        tracing::info!(
            path = %path.display(),
            movies = catalog.primary.len(),
            series = catalog.secondary.len(),
            "Catalog loaded"
        );

        Ok(catalog)
    }

    pub fn list(&self, kind: ListKind) -> &[CatalogItem] {
        match kind {
            ListKind::Primary => &self.primary,
            ListKind::Secondary => &self.secondary,
        }
    }

    pub fn get(&self, reference: CatalogRef) -> Option<&CatalogItem> {
        self.list(reference.list).get(reference.index)
    }

    /// Every known title, primary list first, in list order
    pub fn titles(&self) -> Vec<String> {
        self.primary
            .iter()
            .chain(self.secondary.iter())
            .map(|item| item.title.clone())
            .collect()
    }

    /// Case-insensitive exact match
    pub fn resolve(&self, title: &str) -> Option<(CatalogRef, &CatalogItem)> {
        let needle = title.trim().to_lowercase();
        [ListKind::Primary, ListKind::Secondary]
            .into_iter()
            .find_map(|kind| {
                self.list(kind)
                    .iter()
                    .position(|item| item.title.trim().to_lowercase() == needle)
                    .map(|index| {
                        let reference = CatalogRef { list: kind, index };
                        (reference, &self.list(kind)[index])
                    })
            })
    }

    pub fn len(&self) -> usize {
        self.primary.len() + self.secondary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            primary: vec![
                CatalogItem::new("Dude", 7.2, "images/image1.png", "A coming-of-age adventure."),
                CatalogItem::new(
                    "The Shadow's Edge",
                    7.7,
                    "images/image2.png",
                    "Crime thriller about secrets.",
                ),
                CatalogItem::new(
                    "Jolly LLB 3",
                    7.1,
                    "images/image3.png",
                    "Courtroom drama with heart.",
                ),
                CatalogItem::new(
                    "The Woman in the Line",
                    7.6,
                    "images/image4.png",
                    "Psychological noir.",
                ),
            ],
            secondary: vec![
                CatalogItem::new(
                    "City Stories",
                    8.0,
                    "images/image5.png",
                    "Interwoven lives across one city.",
                ),
                CatalogItem::new(
                    "Night Skies",
                    8.2,
                    "images/image6.png",
                    "Sci-fi suspense under the stars.",
                ),
                CatalogItem::new(
                    "Microcosm",
                    7.6,
                    "images/image7.png",
                    "Small mysteries with big consequences.",
                ),
            ],
        }
    }
}
