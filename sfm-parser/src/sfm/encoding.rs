//! Per-language byte-to-text conversion and XML-safe escaping.
//!
//! Every language in the mapping resolves to one of three conversion modes:
//!
//! - a legacy-encoding converter, looked up by label via `encoding_rs`
//! - UTF-8 passthrough when no converter is named
//! - "ignore", which suppresses the field entirely
//!
//! Under passthrough the bytes are validated; invalid sequences are reported
//! (bounded per language, with byte offset and value) and the data is then
//! reinterpreted as windows-1252 so that one bad byte never kills a field.
//!
//! All converted text is made XML-safe on the way out: `&`, `<`, `>` are
//! escaped and characters outside the XML-legal ranges are stripped with an
//! error per occurrence.

use encoding_rs::{Encoding, WINDOWS_1252};
use indexmap::IndexMap;

use super::diagnostics::DiagnosticsLog;
use super::mapping::model::Language;

/// Most invalid-UTF-8 reports stored per language before going quiet.
pub const MAX_INVALID_UTF8_REPORTS: usize = 10;

/// Sentinel encoding name that suppresses a language's fields.
pub const IGNORE_ENCODING: &str = "ignore";

#[derive(Debug, Clone, Copy)]
enum EncoderKind {
    Utf8,
    Legacy(&'static Encoding),
    Ignore,
}

/// Converts one language's field bytes to XML-safe text.
#[derive(Debug)]
pub struct FieldEncoder {
    pub language: String,
    pub xml_lang: String,
    kind: EncoderKind,
    invalid_reports: usize,
}

impl FieldEncoder {
    pub fn utf8(language: impl Into<String>, xml_lang: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            xml_lang: xml_lang.into(),
            kind: EncoderKind::Utf8,
            invalid_reports: 0,
        }
    }

    pub fn legacy(
        language: impl Into<String>,
        xml_lang: impl Into<String>,
        encoding: &'static Encoding,
    ) -> Self {
        Self {
            language: language.into(),
            xml_lang: xml_lang.into(),
            kind: EncoderKind::Legacy(encoding),
            invalid_reports: 0,
        }
    }

    pub fn ignore(language: impl Into<String>, xml_lang: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            xml_lang: xml_lang.into(),
            kind: EncoderKind::Ignore,
            invalid_reports: 0,
        }
    }

    pub fn is_ignore(&self) -> bool {
        matches!(self.kind, EncoderKind::Ignore)
    }

    /// Convert raw field bytes to escaped XML text.
    ///
    /// Returns `None` when the language is flagged ignore (the field is
    /// suppressed rather than emitted empty).
    pub fn convert(&mut self, data: &[u8], line: usize, log: &mut DiagnosticsLog) -> Option<String> {
        let text = match self.kind {
            EncoderKind::Ignore => return None,
            EncoderKind::Legacy(encoding) => {
                let (text, had_errors) = encoding.decode_without_bom_handling(data);
                if had_errors && self.invalid_reports < MAX_INVALID_UTF8_REPORTS {
                    self.invalid_reports += 1;
                    log.error(
                        "encoding-conversion",
                        format!(
                            "Data for language '{}' contains bytes the '{}' converter cannot map",
                            self.language,
                            encoding.name()
                        ),
                        Some(line),
                    );
                }
                text.into_owned()
            }
            EncoderKind::Utf8 => match std::str::from_utf8(data) {
                Ok(text) => text.to_string(),
                Err(e) => {
                    if self.invalid_reports < MAX_INVALID_UTF8_REPORTS {
                        self.invalid_reports += 1;
                        let offset = e.valid_up_to();
                        log.error(
                            "invalid-utf8",
                            format!(
                                "Invalid UTF-8 in language '{}' at byte offset {} (0x{:02X}); \
                                 reinterpreting as windows-1252",
                                self.language, offset, data[offset]
                            ),
                            Some(line),
                        );
                    }
                    WINDOWS_1252.decode_without_bom_handling(data).0.into_owned()
                }
            },
        };
        Some(sanitize_xml_text(&text, line, log))
    }
}

/// Escape `&`, `<`, `>` and strip characters that are not legal in XML.
///
/// Legal characters are tab, CR, LF, 0x20..=0xD7FF and 0xE000..=0xFFFD;
/// anything else is removed with an error per occurrence.
pub fn sanitize_xml_text(text: &str, line: usize, log: &mut DiagnosticsLog) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\t' | '\r' | '\n' => out.push(ch),
            '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' => out.push(ch),
            _ => {
                log.error(
                    "illegal-character",
                    format!("Illegal character U+{:04X} removed", ch as u32),
                    Some(line),
                );
            }
        }
    }
    out
}

/// Look up a legacy encoding converter by mapping label.
pub fn resolve_label(label: &str) -> Option<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
}

/// All of a run's encoders, keyed by language id.
#[derive(Debug, Default)]
pub struct EncoderRegistry {
    encoders: IndexMap<String, FieldEncoder>,
}

impl EncoderRegistry {
    /// Build encoders for every declared language.
    ///
    /// An encoding label that does not resolve is fatal for that language
    /// only: the failure is logged and the language's fields are skipped.
    pub fn from_languages(languages: &[Language], log: &mut DiagnosticsLog) -> Self {
        let mut encoders = IndexMap::new();
        for lang in languages {
            let encoder = match lang.encoding.as_deref() {
                None => FieldEncoder::utf8(&lang.id, &lang.xml_lang),
                Some(IGNORE_ENCODING) => FieldEncoder::ignore(&lang.id, &lang.xml_lang),
                Some(label) => match resolve_label(label) {
                    Some(encoding) => FieldEncoder::legacy(&lang.id, &lang.xml_lang, encoding),
                    None => {
                        log.error(
                            "encoding-unresolved",
                            format!(
                                "Encoding converter '{}' for language '{}' cannot be resolved; \
                                 fields in this language will be skipped",
                                label, lang.id
                            ),
                            None,
                        );
                        FieldEncoder::ignore(&lang.id, &lang.xml_lang)
                    }
                },
            };
            encoders.insert(lang.id.clone(), encoder);
        }
        Self { encoders }
    }

    pub fn get_mut(&mut self, language: &str) -> Option<&mut FieldEncoder> {
        self.encoders.get_mut(language)
    }

    pub fn get(&self, language: &str) -> Option<&FieldEncoder> {
        self.encoders.get(language)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_passthrough() {
        let mut log = DiagnosticsLog::new();
        let mut enc = FieldEncoder::utf8("en", "en");
        let out = enc.convert("caf\u{e9}".as_bytes(), 1, &mut log).unwrap();
        assert_eq!(out, "caf\u{e9}");
        assert!(log.errors().is_empty());
    }

    #[test]
    fn test_invalid_utf8_falls_back_to_windows_1252() {
        let mut log = DiagnosticsLog::new();
        let mut enc = FieldEncoder::utf8("en", "en");
        // 0xE9 is é in windows-1252 but an invalid UTF-8 start byte here.
        let out = enc.convert(b"caf\xE9", 2, &mut log).unwrap();
        assert_eq!(out, "caf\u{e9}");
        assert_eq!(log.errors().len(), 1);
        assert!(log.errors()[0].message.contains("offset 3"));
    }

    #[test]
    fn test_invalid_utf8_reports_are_bounded() {
        let mut log = DiagnosticsLog::new();
        let mut enc = FieldEncoder::utf8("en", "en");
        for i in 0..MAX_INVALID_UTF8_REPORTS + 7 {
            enc.convert(b"\xFFx", i + 1, &mut log);
        }
        assert_eq!(log.errors().len(), MAX_INVALID_UTF8_REPORTS);
    }

    #[test]
    fn test_legacy_converter() {
        let mut log = DiagnosticsLog::new();
        let mut enc =
            FieldEncoder::legacy("vern", "xkal", resolve_label("windows-1252").unwrap());
        let out = enc.convert(b"na\xEFve", 1, &mut log).unwrap();
        assert_eq!(out, "na\u{ef}ve");
    }

    #[test]
    fn test_ignore_suppresses_field() {
        let mut log = DiagnosticsLog::new();
        let mut enc = FieldEncoder::ignore("skip", "und");
        assert_eq!(enc.convert(b"anything", 1, &mut log), None);
        assert!(log.errors().is_empty());
    }

    #[test]
    fn test_markup_characters_escaped() {
        let mut log = DiagnosticsLog::new();
        assert_eq!(
            sanitize_xml_text("a < b & c > d", 1, &mut log),
            "a &lt; b &amp; c &gt; d"
        );
    }

    #[test]
    fn test_illegal_characters_stripped_with_error() {
        let mut log = DiagnosticsLog::new();
        let out = sanitize_xml_text("ok\u{0}\u{B}ok", 4, &mut log);
        assert_eq!(out, "okok");
        assert_eq!(log.errors().len(), 2);
        assert_eq!(log.errors()[0].line, Some(4));
    }

    #[test]
    fn test_registry_unresolved_label_skips_language() {
        let mut log = DiagnosticsLog::new();
        let langs = vec![Language {
            id: "vern".to_string(),
            xml_lang: "xkal".to_string(),
            encoding: Some("no-such-encoding".to_string()),
        }];
        let mut reg = EncoderRegistry::from_languages(&langs, &mut log);
        assert!(reg.get_mut("vern").unwrap().is_ignore());
        assert_eq!(log.errors().len(), 1);
    }
}
