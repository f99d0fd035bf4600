//! # sfm-parser
//!
//! Conversion engine for Standard Format Marker (SFM) field data.
//!
//! SFM files are the flat, backslash-tagged text files produced by fieldwork
//! data-entry tools. This crate turns one such file, together with a mapping
//! description (languages, hierarchy levels, field descriptions, inline
//! markers), into a structured XML document plus a diagnostics report.
//!
//! The conversion is a single forward pass:
//!
//!     bytes → tokenizer → hierarchy builder → XML emitter
//!
//! with the per-language encoder and the inline-marker resolver invoked for
//! each field as it is attached. The engine is deliberately forgiving: real
//! field data is large and imperfect, so nearly every anomaly is recovered
//! and recorded in the diagnostics log rather than aborting the run. Only
//! file access, mapping load failures, and a UTF-32 input encoding are fatal.
//!
//! The usual entry points are [`sfm::pipeline::convert_file`] for the
//! file-to-file case and [`sfm::pipeline::Converter`] when the caller already
//! holds the mapping and the input bytes.

pub mod sfm;

pub use sfm::error::ConvertError;
pub use sfm::pipeline::{convert_file, Converter, RunSummary};
