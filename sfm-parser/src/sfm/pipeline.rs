//! The conversion pipeline.
//!
//! A [`Converter`] binds one validated mapping to one run. `run` consumes
//! the converter: one instance handles exactly one input file and is not
//! reentrant. The whole pipeline is single-threaded and single-pass —
//! tokenize, dispatch, stream out — with an optional cancellation flag
//! checked between tokens.
//!
//! [`convert_file`] is the file-to-file convenience wrapper the CLI uses.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::building::HierarchyBuilder;
use super::diagnostics::DiagnosticsLog;
use super::encoding::EncoderRegistry;
use super::error::ConvertError;
use super::mapping::loading::load_mapping;
use super::mapping::model::MappingDocument;
use super::mapping::validating::{validate, ResolvedMapping};
use super::serializing::XmlEmitter;
use super::tokenizing::SfmTokenizer;

/// Headline numbers of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub errors: usize,
    pub warnings: usize,
    pub cautions: usize,
}

impl RunSummary {
    fn from_log(log: &DiagnosticsLog) -> Self {
        Self {
            errors: log.error_total(),
            warnings: log.warning_total(),
            cautions: log.caution_total(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.errors == 0 && self.warnings == 0 && self.cautions == 0
    }
}

/// One mapping bound to one conversion run.
pub struct Converter {
    mapping: ResolvedMapping,
    encoders: EncoderRegistry,
    log: DiagnosticsLog,
    cancel: Option<Arc<AtomicBool>>,
}

impl Converter {
    /// Validate the mapping and resolve its encoders.
    ///
    /// Mapping diagnostics (including per-language encoder failures) stay
    /// in the run's log and end up in the output report.
    pub fn new(doc: MappingDocument) -> Result<Self, ConvertError> {
        let mut log = DiagnosticsLog::new();
        let mapping = validate(doc, &mut log)?;
        let encoders = EncoderRegistry::from_languages(&mapping.languages, &mut log);
        Ok(Self {
            mapping,
            encoders,
            log,
            cancel: None,
        })
    }

    /// Install a flag the caller may raise to stop the run between tokens.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Convert one input buffer, streaming XML into `out`.
    pub fn run<W: Write>(mut self, input: Vec<u8>, out: W) -> Result<RunSummary, ConvertError> {
        let _span = tracing::debug_span!("convert").entered();

        let mut tokenizer = SfmTokenizer::new(input, &mut self.log)?;
        let mut emitter = XmlEmitter::new(out);
        emitter.begin()?;

        let mut builder = HierarchyBuilder::new(&self.mapping);
        while let Some(token) = tokenizer.next(&mut self.log) {
            if let Some(flag) = &self.cancel {
                if flag.load(Ordering::Relaxed) {
                    return Err(ConvertError::Canceled);
                }
            }
            builder.handle_token(&token, &mut self.encoders, &mut self.log, &mut emitter)?;
        }
        builder.finish(&mut emitter)?;
        emitter.finish(&self.log)?;

        let summary = RunSummary::from_log(&self.log);
        tracing::debug!(
            errors = summary.errors,
            warnings = summary.warnings,
            cautions = summary.cautions,
            "conversion finished"
        );
        Ok(summary)
    }
}

/// Convert `input` against `mapping`, writing the XML document to `output`.
pub fn convert_file(
    input: &Path,
    mapping: &Path,
    output: &Path,
) -> Result<RunSummary, ConvertError> {
    let doc = load_mapping(mapping)?;
    let converter = Converter::new(doc)?;
    let bytes = fs::read(input).map_err(|e| ConvertError::Io {
        path: input.to_path_buf(),
        source: e,
    })?;
    let file = fs::File::create(output).map_err(|e| ConvertError::Io {
        path: output.to_path_buf(),
        source: e,
    })?;
    let mut writer = BufWriter::new(file);
    let summary = converter.run(bytes, &mut writer)?;
    writer.flush()?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sfm::mapping::model::{
        FieldDescription, HierarchyLevel, Language, MappingDocument,
    };

    fn mapping() -> MappingDocument {
        MappingDocument {
            languages: vec![Language {
                id: "en".to_string(),
                xml_lang: "en".to_string(),
                encoding: None,
            }],
            levels: vec![
                HierarchyLevel {
                    name: "entry".to_string(),
                    ancestors: Vec::new(),
                    begin_fields: vec!["lx".to_string()],
                    additional_fields: Vec::new(),
                    multi_fields: Vec::new(),
                    unique_fields: Vec::new(),
                },
                HierarchyLevel {
                    name: "sense".to_string(),
                    ancestors: vec!["entry".to_string()],
                    begin_fields: vec!["de".to_string()],
                    additional_fields: Vec::new(),
                    multi_fields: Vec::new(),
                    unique_fields: Vec::new(),
                },
            ],
            fields: vec![
                FieldDescription {
                    marker: "lx".to_string(),
                    language: "en".to_string(),
                    meaning: "lex".to_string(),
                    data_type: Default::default(),
                    abbreviation: false,
                    auto_import: false,
                    reference_func: None,
                },
                FieldDescription {
                    marker: "de".to_string(),
                    language: "en".to_string(),
                    meaning: "definition".to_string(),
                    data_type: Default::default(),
                    abbreviation: false,
                    auto_import: false,
                    reference_func: None,
                },
            ],
            inline_markers: Vec::new(),
        }
    }

    fn convert(input: &[u8]) -> (String, RunSummary) {
        let converter = Converter::new(mapping()).expect("valid mapping");
        let mut out = Vec::new();
        let summary = converter.run(input.to_vec(), &mut out).expect("run");
        (String::from_utf8(out).expect("utf8"), summary)
    }

    #[test]
    fn test_entry_and_sense_document() {
        let (xml, summary) = convert(b"\\lx foo\n\\de bar\n");
        assert!(xml.contains("<entry><lex line=\"1\" lang=\"en\">foo</lex>"));
        assert!(xml.contains("<sense><definition line=\"2\" lang=\"en\">bar</definition></sense>"));
        assert!(xml.contains("</database>"));
        assert!(summary.is_clean());
    }

    #[test]
    fn test_output_order_mirrors_input_order() {
        let (xml, _) = convert(b"\\lx one\n\\lx two\n\\lx three\n");
        let one = xml.find(">one<").expect("one");
        let two = xml.find(">two<").expect("two");
        let three = xml.find(">three<").expect("three");
        assert!(one < two && two < three);
    }

    #[test]
    fn test_cancellation_between_tokens() {
        let flag = Arc::new(AtomicBool::new(true));
        let converter = Converter::new(mapping())
            .expect("valid mapping")
            .with_cancel_flag(flag);
        let result = converter.run(b"\\lx foo\n".to_vec(), Vec::new());
        assert!(matches!(result, Err(ConvertError::Canceled)));
    }

    #[test]
    fn test_utf32_input_aborts() {
        let converter = Converter::new(mapping()).expect("valid mapping");
        let result = converter.run(vec![0x00, 0x00, 0xFE, 0xFF, 0x00], Vec::new());
        assert!(matches!(result, Err(ConvertError::Utf32Unsupported)));
    }

    #[test]
    fn test_report_follows_entries() {
        let (xml, summary) = convert(b"\\lx foo\n\\zz mystery\n");
        let entry = xml.find("<entry>").expect("entry");
        let report = xml.find("<report>").expect("report");
        assert!(entry < report);
        assert_eq!(summary.warnings, 1);
        assert!(xml.contains("undefined-marker"));
    }
}
