//! Located UI elements
//!
//! An [`Element`] is ephemeral: recomputed on every query unless its region
//! was served from a cache tier. Nothing holds one across a page change.

use crate::geometry::Region;

/// Which strategy located the element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementSource {
    /// Structured UI-tree query (exact, confidence 1.0)
    Tree,
    /// Pixel template match (confidence is the match score)
    Template,
}

impl std::fmt::Display for ElementSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElementSource::Tree => write!(f, "tree"),
            ElementSource::Template => write!(f, "template"),
        }
    }
}

/// A located UI entity
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Bounding rectangle in screen pixels
    pub region: Region,
    /// Text content, when the source exposes it
    pub text: Option<String>,
    /// 1.0 for exact tree matches, matcher score otherwise
    pub confidence: f32,
    pub source: ElementSource,
}

impl Element {
    /// Exact tree hit
    pub fn from_tree(region: Region, text: Option<String>) -> Self {
        Self {
            region,
            text,
            confidence: 1.0,
            source: ElementSource::Tree,
        }
    }

    /// Template-matcher hit with its correlation score
    pub fn from_template(region: Region, confidence: f32) -> Self {
        Self {
            region,
            text: None,
            confidence,
            source: ElementSource::Template,
        }
    }

    /// Text content, or empty string when the source has none
    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}
