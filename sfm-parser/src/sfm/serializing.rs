//! Streaming XML emission.
//!
//! The emitter owns a `quick_xml` writer. The root element opens at the
//! start of the run; each completed entry subtree streams out the moment
//! the builder closes it (the arena drops it right after); and the run
//! finishes with the diagnostics report block followed by the root close
//! tag. Output element order mirrors input token order.
//!
//! Field text arrives pre-escaped from the encoder/resolver (it may contain
//! inline-marker elements), so it is written verbatim. Attribute values go
//! through the writer's own escaping.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Write;

use super::building::{EntrySink, NodeArena, NodeContent, RenderedField};
use super::diagnostics::DiagnosticsLog;
use super::error::ConvertError;

/// Name of the output document's root element.
pub const ROOT_ELEMENT: &str = "database";

pub struct XmlEmitter<W: Write> {
    writer: Writer<W>,
}

impl<W: Write> XmlEmitter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: Writer::new(inner),
        }
    }

    /// Write the declaration and open the root element.
    pub fn begin(&mut self) -> Result<(), ConvertError> {
        self.writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        self.newline()?;
        self.writer
            .write_event(Event::Start(BytesStart::new(ROOT_ELEMENT)))?;
        self.newline()
    }

    /// Write the report block, close the root, and hand the sink back.
    pub fn finish(mut self, log: &DiagnosticsLog) -> Result<W, ConvertError> {
        self.write_report(log)?;
        self.writer
            .write_event(Event::End(BytesEnd::new(ROOT_ELEMENT)))?;
        self.newline()?;
        Ok(self.writer.into_inner())
    }

    fn newline(&mut self) -> Result<(), ConvertError> {
        self.writer
            .write_event(Event::Text(BytesText::from_escaped("\n")))?;
        Ok(())
    }

    fn write_node(&mut self, arena: &NodeArena, id: usize) -> Result<(), ConvertError> {
        let node = arena.get(id);
        let mut start = BytesStart::new(node.level.as_str());
        if node.synthesized {
            start.push_attribute(("synthesized", "true"));
        }
        self.writer.write_event(Event::Start(start))?;
        for item in &node.content {
            match item {
                NodeContent::Field(field) => self.write_field(field)?,
                NodeContent::Child(child) => self.write_node(arena, *child)?,
            }
        }
        self.writer
            .write_event(Event::End(BytesEnd::new(node.level.as_str())))?;
        Ok(())
    }

    fn write_field(&mut self, field: &RenderedField) -> Result<(), ConvertError> {
        let mut start = BytesStart::new(field.element.as_str());
        let line = field.line.to_string();
        start.push_attribute(("line", line.as_str()));
        if let Some(lang) = &field.xml_lang {
            start.push_attribute(("lang", lang.as_str()));
        }
        if field.abbreviation {
            start.push_attribute(("abbr", "true"));
        }
        if field.auto {
            start.push_attribute(("auto", "true"));
        }
        if let Some(morph) = &field.morph {
            start.push_attribute(("morphType", morph.morph_type.as_str()));
            start.push_attribute(("morphClass", morph.morph_type.class()));
        }
        if let Some(func) = &field.reference_func {
            start.push_attribute(("refFunc", func.as_str()));
        }
        if field.text.is_empty() {
            self.writer.write_event(Event::Empty(start))?;
        } else {
            self.writer.write_event(Event::Start(start))?;
            self.writer
                .write_event(Event::Text(BytesText::from_escaped(field.text.as_str())))?;
            self.writer
                .write_event(Event::End(BytesEnd::new(field.element.as_str())))?;
        }
        Ok(())
    }

    fn write_report(&mut self, log: &DiagnosticsLog) -> Result<(), ConvertError> {
        self.writer
            .write_event(Event::Start(BytesStart::new("report")))?;
        self.newline()?;

        self.write_records("errors", log.errors(), log.error_total(), log.dropped_errors())?;
        self.write_records(
            "warnings",
            log.warnings(),
            log.warning_total(),
            log.dropped_warnings(),
        )?;

        let total = log.caution_total().to_string();
        let mut out_of_order = BytesStart::new("outOfOrder");
        out_of_order.push_attribute(("total", total.as_str()));
        if log.cautions().is_empty() {
            self.writer.write_event(Event::Empty(out_of_order))?;
        } else {
            self.writer.write_event(Event::Start(out_of_order))?;
            for (entry, markers) in log.cautions() {
                let mut entry_el = BytesStart::new("entry");
                entry_el.push_attribute(("id", entry.as_str()));
                self.writer.write_event(Event::Start(entry_el))?;
                for (marker, lines) in markers {
                    let lines = lines
                        .iter()
                        .map(|l| l.to_string())
                        .collect::<Vec<_>>()
                        .join(" ");
                    let mut marker_el = BytesStart::new("marker");
                    marker_el.push_attribute(("name", marker.as_str()));
                    marker_el.push_attribute(("lines", lines.as_str()));
                    self.writer.write_event(Event::Empty(marker_el))?;
                }
                self.writer
                    .write_event(Event::End(BytesEnd::new("entry")))?;
            }
            self.writer
                .write_event(Event::End(BytesEnd::new("outOfOrder")))?;
        }
        self.newline()?;

        if !log.auto_fields().is_empty() {
            self.writer
                .write_event(Event::Start(BytesStart::new("autoFields")))?;
            for (marker, note) in log.auto_fields() {
                let count = note.count.to_string();
                let first_line = note.first_line.to_string();
                let mut field_el = BytesStart::new("field");
                field_el.push_attribute(("marker", marker.as_str()));
                field_el.push_attribute(("level", note.level.as_str()));
                field_el.push_attribute(("count", count.as_str()));
                field_el.push_attribute(("firstLine", first_line.as_str()));
                self.writer.write_event(Event::Empty(field_el))?;
            }
            self.writer
                .write_event(Event::End(BytesEnd::new("autoFields")))?;
            self.newline()?;
        }

        self.writer
            .write_event(Event::Start(BytesStart::new("statistics")))?;
        for (marker, stats) in log.stats() {
            let with_data = stats.with_data.to_string();
            let without_data = stats.without_data.to_string();
            let undefined = stats.undefined.to_string();
            let mut marker_el = BytesStart::new("marker");
            marker_el.push_attribute(("name", marker.as_str()));
            marker_el.push_attribute(("withData", with_data.as_str()));
            marker_el.push_attribute(("withoutData", without_data.as_str()));
            marker_el.push_attribute(("undefined", undefined.as_str()));
            self.writer.write_event(Event::Empty(marker_el))?;
        }
        self.writer
            .write_event(Event::End(BytesEnd::new("statistics")))?;
        self.newline()?;

        self.writer
            .write_event(Event::End(BytesEnd::new("report")))?;
        self.newline()
    }

    fn write_records(
        &mut self,
        container: &'static str,
        records: &[super::diagnostics::Record],
        total: usize,
        dropped: usize,
    ) -> Result<(), ConvertError> {
        let total = total.to_string();
        let dropped = dropped.to_string();
        let mut start = BytesStart::new(container);
        start.push_attribute(("total", total.as_str()));
        start.push_attribute(("dropped", dropped.as_str()));
        if records.is_empty() {
            self.writer.write_event(Event::Empty(start))?;
            self.newline()?;
            return Ok(());
        }
        self.writer.write_event(Event::Start(start))?;
        for record in records {
            let mut el = BytesStart::new("item");
            el.push_attribute(("code", record.code));
            let line;
            if let Some(l) = record.line {
                line = l.to_string();
                el.push_attribute(("line", line.as_str()));
            }
            self.writer.write_event(Event::Start(el))?;
            self.writer
                .write_event(Event::Text(BytesText::new(record.message.as_str())))?;
            self.writer
                .write_event(Event::End(BytesEnd::new("item")))?;
        }
        self.writer
            .write_event(Event::End(BytesEnd::new(container)))?;
        self.newline()
    }
}

impl<W: Write> EntrySink for XmlEmitter<W> {
    fn emit_entry(&mut self, arena: &NodeArena, entry: usize) -> Result<(), ConvertError> {
        self.write_node(arena, entry)?;
        self.newline()
    }
}
