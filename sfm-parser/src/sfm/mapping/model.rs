//! Serde model of the mapping description.
//!
//! These structs mirror the mapping file one-to-one and stay dumb on
//! purpose: cross-references, uniqueness rules, and derived names are all
//! checked and produced by [`validating`](super::validating), so a mapping
//! that parses is not yet a mapping that is usable.

use serde::Deserialize;

/// The whole mapping description, loaded once and immutable during a run.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MappingDocument {
    #[serde(default)]
    pub languages: Vec<Language>,
    #[serde(default)]
    pub levels: Vec<HierarchyLevel>,
    #[serde(default)]
    pub fields: Vec<FieldDescription>,
    #[serde(default)]
    pub inline_markers: Vec<InlineMarker>,
}

/// One declared language.
///
/// `encoding` absent means the data is already UTF-8; the special value
/// `"ignore"` suppresses every field in the language.
#[derive(Debug, Clone, Deserialize)]
pub struct Language {
    pub id: String,
    /// Target xml:lang code on emitted elements.
    pub xml_lang: String,
    #[serde(default)]
    pub encoding: Option<String>,
}

/// One named level of the output hierarchy (an "Entry", a "Sense", ...).
#[derive(Debug, Clone, Deserialize)]
pub struct HierarchyLevel {
    pub name: String,
    /// Levels this one nests under. Empty for the implied root level.
    #[serde(default)]
    pub ancestors: Vec<String>,
    /// Markers that start a new instance of this level.
    #[serde(default)]
    pub begin_fields: Vec<String>,
    /// Markers that attach to an existing instance.
    #[serde(default)]
    pub additional_fields: Vec<String>,
    /// Subset of begin/additional fields that may repeat per instance.
    #[serde(default)]
    pub multi_fields: Vec<String>,
    /// Subset of begin/additional fields allowed at most once per instance.
    #[serde(default)]
    pub unique_fields: Vec<String>,
}

/// What one source marker means.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldDescription {
    pub marker: String,
    /// Language id the field's data is written in.
    pub language: String,
    /// Semantic meaning id; becomes the output element name.
    pub meaning: String,
    #[serde(default)]
    pub data_type: DataType,
    /// The field holds an abbreviation rather than a full form.
    #[serde(default)]
    pub abbreviation: bool,
    /// The field may be auto-imported into whatever node is open when no
    /// declared destination accepts it.
    #[serde(default)]
    pub auto_import: bool,
    /// Reference-function metadata (e.g. a variant relation name).
    #[serde(default)]
    pub reference_func: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataType {
    #[default]
    String,
    Date,
    /// Lexeme form; morpheme-type inference applies.
    Lexeme,
    /// Allomorph form; morpheme-type inference applies.
    Allomorph,
}

impl DataType {
    pub fn wants_morph_analysis(self) -> bool {
        matches!(self, DataType::Lexeme | DataType::Allomorph)
    }
}

/// Begin/end markup embedded inside one field's text.
#[derive(Debug, Clone, Deserialize)]
pub struct InlineMarker {
    pub begin: String,
    /// Literal end texts. May be empty when a sentinel flag is set.
    #[serde(default)]
    pub end: Vec<String>,
    /// The marker ends at the next whitespace.
    #[serde(default)]
    pub end_of_word: bool,
    /// The marker ends at the end of the field.
    #[serde(default)]
    pub end_of_field: bool,
    /// Switches the active language for the enclosed span.
    #[serde(default)]
    pub language: Option<String>,
    /// Style name; used to derive the output element name.
    #[serde(default)]
    pub style: Option<String>,
    /// Consume the markup but emit no element.
    #[serde(default)]
    pub ignore: bool,
}
