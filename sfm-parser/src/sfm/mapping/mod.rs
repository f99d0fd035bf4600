//! The mapping description that drives a conversion.
//!
//! A mapping declares the languages, hierarchy levels, field descriptions,
//! and inline markers for one body of field data. It is authored elsewhere
//! (the engine does not care how); here it is deserialized into the model,
//! then validated and resolved into the lookup structures the builder and
//! resolver consume.

pub mod loading;
pub mod model;
pub mod validating;

pub use loading::load_mapping;
pub use model::{DataType, FieldDescription, HierarchyLevel, InlineMarker, Language, MappingDocument};
pub use validating::{validate, LevelInfo, ResolvedInline, ResolvedMapping};
