//! The token-dispatch state machine.
//!
//! # Token handling, in priority order
//!
//! 1. Ignored markers (underscore-prefixed, undeclared-language fields,
//!    fields outside the hierarchy) are dropped silently.
//! 2. Undefined markers are warned once per distinct marker and dropped.
//! 3. A begin-field marker either lands on an already-open node of its
//!    level that can still take it, or opens a new node. Opening walks the
//!    level's ancestor chains breadth-first to the nearest open node,
//!    synthesizing any skipped intermediate levels (with an out-of-order
//!    caution) and closing a same-level open sibling under the same parent
//!    first: one open child of a kind at a time.
//! 4. Any other marker tries the current node, then every open node
//!    deepest-first, then the auto-import fallback. A marker that cannot
//!    land anywhere is dropped with a warning — never silently.
//!
//! Whenever a direct child of the root closes, it is serialized through the
//! sink and evicted from the arena. Everything else recovers: the input is
//! real field data and best-effort output beats aborting.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashSet, VecDeque};

use super::arena::{ImportNode, NodeArena, NodeContent, RenderedField};
use super::EntrySink;
use crate::sfm::diagnostics::DiagnosticsLog;
use crate::sfm::encoding::{sanitize_xml_text, EncoderRegistry};
use crate::sfm::error::ConvertError;
use crate::sfm::inlines::resolve_field;
use crate::sfm::mapping::model::{DataType, FieldDescription};
use crate::sfm::mapping::validating::ResolvedMapping;
use crate::sfm::morphology;
use crate::sfm::serializing::ROOT_ELEMENT;
use crate::sfm::token::Token;

static DATE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^\d{4}-\d{1,2}-\d{1,2}$",
        r"^\d{1,2}/\d{1,2}/\d{4}$",
        r"^\d{1,2} [A-Za-z]{3} \d{4}$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

fn is_valid_date(text: &str) -> bool {
    DATE_PATTERNS.iter().any(|p| p.is_match(text))
}

/// Can a node take one more instance of a marker?
enum Accept {
    Yes,
    /// Closed node, undeclared marker, or no level info.
    No,
    /// Declared but already present and not repeatable.
    AlreadyUsed { unique: bool },
}

pub struct HierarchyBuilder<'m> {
    mapping: &'m ResolvedMapping,
    arena: NodeArena,
    root: usize,
    /// level name -> open node ids, oldest first.
    open_by_level: IndexMap<String, Vec<usize>>,
    /// Most recently touched node.
    current: usize,
}

impl<'m> HierarchyBuilder<'m> {
    pub fn new(mapping: &'m ResolvedMapping) -> Self {
        let mut arena = NodeArena::new();
        let root = arena.alloc(ImportNode::new(ROOT_ELEMENT, None, 0, 0));
        Self {
            mapping,
            arena,
            root,
            open_by_level: IndexMap::new(),
            current: root,
        }
    }

    pub fn arena(&self) -> &NodeArena {
        &self.arena
    }

    /// Dispatch one token.
    pub fn handle_token(
        &mut self,
        token: &Token,
        encoders: &mut EncoderRegistry,
        log: &mut DiagnosticsLog,
        sink: &mut dyn EntrySink,
    ) -> Result<(), ConvertError> {
        let marker = token.marker.as_str();

        if marker.starts_with('_')
            || self.mapping.ignored_markers.contains(marker)
            || self.mapping.out_of_hierarchy.contains(marker)
        {
            if self.mapping.field(marker).is_some() {
                log.count_marker(marker, token.has_data());
            }
            tracing::debug!(marker, line = token.line, "ignored marker dropped");
            return Ok(());
        }

        let Some(field) = self.mapping.field(marker) else {
            log.count_undefined(marker);
            log.warning_once(
                marker,
                "undefined-marker",
                format!("Marker \\{} is not defined in the mapping", marker),
                Some(token.line),
            );
            return Ok(());
        };
        log.count_marker(marker, token.has_data());

        let rendered = self.render_field(token, field, encoders, log);

        if let Some(level_name) = self.mapping.begin_of.get(marker) {
            self.handle_begin(token, level_name, rendered, log, sink)
        } else {
            self.handle_additional(token, field, rendered, log);
            Ok(())
        }
    }

    /// Close and flush everything still open. Call once at end of input.
    pub fn finish(&mut self, sink: &mut dyn EntrySink) -> Result<(), ConvertError> {
        let entries = self.arena.get(self.root).child_ids();
        for id in entries {
            self.close_subtree(id, sink)?;
        }
        Ok(())
    }

    fn handle_begin(
        &mut self,
        token: &Token,
        level_name: &str,
        rendered: Option<RenderedField>,
        log: &mut DiagnosticsLog,
        sink: &mut dyn EntrySink,
    ) -> Result<(), ConvertError> {
        // An open node of this level that can still take the marker keeps
        // collecting; otherwise a sibling begins.
        let mut reuse = None;
        if let Some(open) = self.open_by_level.get(level_name) {
            for &id in open.iter().rev() {
                if matches!(self.accept(id, &token.marker), Accept::Yes) {
                    reuse = Some(id);
                    break;
                }
            }
        }
        if let Some(id) = reuse {
            self.attach(id, token, rendered);
            return Ok(());
        }

        let (anchor, intermediates) = self.find_anchor(level_name);
        if !intermediates.is_empty() {
            let entry_key = self.entry_key_for_caution(anchor, token.line);
            log.caution(&entry_key, &token.marker, token.line);
            tracing::debug!(
                marker = token.marker.as_str(),
                line = token.line,
                skipped = intermediates.len(),
                "out-of-order marker; synthesizing intermediate levels"
            );
        }

        let mut parent = anchor;
        for level in &intermediates {
            parent = self.open_child(parent, level, token.line, true, sink)?;
        }
        let node = self.open_child(parent, level_name, token.line, false, sink)?;
        self.attach(node, token, rendered);
        Ok(())
    }

    fn handle_additional(
        &mut self,
        token: &Token,
        field: &FieldDescription,
        rendered: Option<RenderedField>,
        log: &mut DiagnosticsLog,
    ) {
        match self.accept(self.current, &token.marker) {
            Accept::Yes => {
                self.attach(self.current, token, rendered);
                return;
            }
            Accept::AlreadyUsed { unique: true } => {
                let level = self.arena.get(self.current).level.clone();
                log.error(
                    "duplicate-unique-field",
                    format!(
                        "Marker \\{} appears more than once in one {}",
                        token.marker, level
                    ),
                    Some(token.line),
                );
            }
            _ => {}
        }

        // Deepest-first over every open node; recency breaks depth ties.
        let mut candidates: Vec<(usize, usize)> = self
            .open_by_level
            .values()
            .flatten()
            .map(|&id| (self.arena.get(id).depth, id))
            .collect();
        candidates.sort_by(|a, b| b.cmp(a));
        for &(_, id) in &candidates {
            if id == self.current || id == self.root {
                continue;
            }
            if matches!(self.accept(id, &token.marker), Accept::Yes) {
                self.attach(id, token, rendered);
                return;
            }
        }

        if field.auto_import {
            let dest = if self.current != self.root && self.arena.get(self.current).open {
                Some(self.current)
            } else {
                candidates.iter().map(|&(_, id)| id).find(|&id| id != self.root)
            };
            if let Some(id) = dest {
                let level = self.arena.get(id).level.clone();
                if self.mapping.level(&level).is_some() {
                    log.note_auto_field(&token.marker, &level, token.line);
                    let rendered = rendered.map(|mut r| {
                        r.auto = true;
                        r
                    });
                    self.attach(id, token, rendered);
                    return;
                }
            }
        }

        log.warning_once(
            &token.marker,
            "unattached-marker",
            format!(
                "Marker \\{} could not be attached to any open node",
                token.marker
            ),
            Some(token.line),
        );
        tracing::debug!(
            marker = token.marker.as_str(),
            line = token.line,
            "marker dropped: no destination"
        );
    }

    fn accept(&self, id: usize, marker: &str) -> Accept {
        let node = self.arena.get(id);
        if !node.open {
            return Accept::No;
        }
        let Some(info) = self.mapping.level(&node.level) else {
            return Accept::No;
        };
        if !info.declares(marker) {
            return Accept::No;
        }
        if info.is_multi(marker) {
            return Accept::Yes;
        }
        if node.used.contains(marker) {
            return Accept::AlreadyUsed {
                unique: info.is_unique(marker),
            };
        }
        Accept::Yes
    }

    /// Record the marker on the node, attach the rendered value if the
    /// field survived rendering, and make the node current.
    fn attach(&mut self, id: usize, token: &Token, rendered: Option<RenderedField>) {
        self.arena.get_mut(id).used.insert(token.marker.clone());
        let is_entry = self.arena.get(id).parent == Some(self.root);
        if is_entry && self.arena.get(id).entry_key.is_none() && token.has_data() {
            let key = entry_key_from(token);
            self.arena.get_mut(id).entry_key = Some(key);
        }
        if let Some(r) = rendered {
            self.arena.get_mut(id).content.push(NodeContent::Field(r));
        }
        self.current = id;
    }

    /// Breadth-first search up the level's ancestor chains for the nearest
    /// open node. Returns the anchor node and the intermediate levels that
    /// must be instantiated beneath it, outermost first.
    fn find_anchor(&self, target: &str) -> (usize, Vec<String>) {
        let ancestors = self
            .mapping
            .level(target)
            .map(|i| i.ancestors.clone())
            .unwrap_or_default();
        if ancestors.is_empty() {
            return (self.root, Vec::new());
        }

        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(target.to_string());
        let mut queue: VecDeque<(String, Vec<String>)> =
            ancestors.into_iter().map(|a| (a, Vec::new())).collect();
        let mut root_fallback: Option<Vec<String>> = None;

        while let Some((level, path)) = queue.pop_front() {
            if !visited.insert(level.clone()) {
                continue;
            }
            if let Some(&id) = self.open_by_level.get(&level).and_then(|v| v.last()) {
                let mut intermediates = path;
                intermediates.reverse();
                return (id, intermediates);
            }
            let ancestors = self
                .mapping
                .level(&level)
                .map(|i| i.ancestors.clone())
                .unwrap_or_default();
            if ancestors.is_empty() {
                if root_fallback.is_none() {
                    let mut intermediates = path.clone();
                    intermediates.push(level.clone());
                    intermediates.reverse();
                    root_fallback = Some(intermediates);
                }
            } else {
                for ancestor in ancestors {
                    let mut next_path = path.clone();
                    next_path.push(level.clone());
                    queue.push_back((ancestor, next_path));
                }
            }
        }
        (self.root, root_fallback.unwrap_or_default())
    }

    /// Create an open child node, first closing any open sibling of the
    /// same level under the same parent.
    fn open_child(
        &mut self,
        parent: usize,
        level: &str,
        line: usize,
        synthesized: bool,
        sink: &mut dyn EntrySink,
    ) -> Result<usize, ConvertError> {
        let siblings: Vec<usize> = self
            .open_by_level
            .get(level)
            .map(|open| {
                open.iter()
                    .copied()
                    .filter(|&id| self.arena.get(id).parent == Some(parent))
                    .collect()
            })
            .unwrap_or_default();
        for sibling in siblings {
            self.close_subtree(sibling, sink)?;
        }

        let depth = self.arena.get(parent).depth + 1;
        let mut node = ImportNode::new(level, Some(parent), depth, line);
        node.synthesized = synthesized;
        let id = self.arena.alloc(node);
        self.arena.get_mut(parent).content.push(NodeContent::Child(id));
        self.open_by_level
            .entry(level.to_string())
            .or_default()
            .push(id);
        Ok(id)
    }

    /// Close a node and its open descendants. A direct child of the root is
    /// then serialized and evicted from the arena.
    fn close_subtree(
        &mut self,
        id: usize,
        sink: &mut dyn EntrySink,
    ) -> Result<(), ConvertError> {
        self.close_recursive(id);
        if self.arena.get(id).parent == Some(self.root) {
            sink.emit_entry(&self.arena, id)?;
            if self.is_in_subtree(self.current, id) {
                self.current = self.root;
            }
            self.arena
                .get_mut(self.root)
                .content
                .retain(|c| !matches!(c, NodeContent::Child(child) if *child == id));
            self.evict(id);
        }
        Ok(())
    }

    fn close_recursive(&mut self, id: usize) {
        let (level, children, was_open) = {
            let node = self.arena.get_mut(id);
            let was_open = node.open;
            node.open = false;
            (node.level.clone(), node.child_ids(), was_open)
        };
        if !was_open {
            return;
        }
        if let Some(open) = self.open_by_level.get_mut(&level) {
            open.retain(|&x| x != id);
        }
        for child in children {
            self.close_recursive(child);
        }
    }

    fn evict(&mut self, id: usize) {
        for child in self.arena.get(id).child_ids() {
            self.evict(child);
        }
        self.arena.release(id);
    }

    fn is_in_subtree(&self, mut id: usize, ancestor: usize) -> bool {
        loop {
            if id == ancestor {
                return true;
            }
            match self.arena.get(id).parent {
                Some(parent) => id = parent,
                None => return false,
            }
        }
    }

    /// The diagnostics key of the top-level entry the anchor sits in.
    fn entry_key_for_caution(&self, anchor: usize, line: usize) -> String {
        let mut id = anchor;
        if id == self.root {
            return format!("entry at line {}", line);
        }
        loop {
            let node = self.arena.get(id);
            match node.parent {
                Some(parent) if parent == self.root => {
                    return node
                        .entry_key
                        .clone()
                        .unwrap_or_else(|| format!("entry at line {}", node.line));
                }
                Some(parent) => id = parent,
                None => return format!("entry at line {}", line),
            }
        }
    }

    /// Render a token's data per its field description: encoding
    /// conversion, inline markup, date validation, morph inference.
    ///
    /// `None` means the value is dropped (suppressed language or invalid
    /// date); the structural effects of the token still happen.
    fn render_field(
        &self,
        token: &Token,
        field: &FieldDescription,
        encoders: &mut EncoderRegistry,
        log: &mut DiagnosticsLog,
    ) -> Option<RenderedField> {
        let trimmed = token.trimmed_data();
        let xml_lang = encoders.get(&field.language).map(|e| e.xml_lang.clone());
        let base = RenderedField {
            marker: token.marker.clone(),
            element: field.meaning.clone(),
            xml_lang,
            line: token.line,
            text: String::new(),
            abbreviation: field.abbreviation,
            auto: false,
            morph: None,
            reference_func: field.reference_func.clone(),
        };

        match field.data_type {
            DataType::Date => {
                let text = convert_plain(trimmed, &field.language, encoders, token.line, log)?;
                let text = text.trim().to_string();
                if !text.is_empty() && !is_valid_date(&text) {
                    log.warning(
                        "date-format",
                        format!("Marker \\{} has unparseable date '{}'", token.marker, text),
                        Some(token.line),
                    );
                    return None;
                }
                Some(RenderedField { text, ..base })
            }
            DataType::Lexeme | DataType::Allomorph => {
                let text = convert_plain(trimmed, &field.language, encoders, token.line, log)?;
                let analysis = morphology::analyze(&text);
                Some(RenderedField {
                    text: analysis.form.clone(),
                    morph: Some(analysis),
                    ..base
                })
            }
            DataType::String => {
                let text = resolve_field(
                    trimmed,
                    &field.language,
                    &self.mapping.inlines,
                    encoders,
                    token.line,
                    log,
                )?;
                Some(RenderedField { text, ..base })
            }
        }
    }
}

/// Convert field bytes without inline-marker resolution.
fn convert_plain(
    data: &[u8],
    language: &str,
    encoders: &mut EncoderRegistry,
    line: usize,
    log: &mut DiagnosticsLog,
) -> Option<String> {
    match encoders.get_mut(language) {
        Some(encoder) => encoder.convert(data, line, log),
        None => Some(sanitize_xml_text(&String::from_utf8_lossy(data), line, log)),
    }
}

fn entry_key_from(token: &Token) -> String {
    let text = String::from_utf8_lossy(token.trimmed_data());
    let key: String = text.chars().take(40).collect();
    if key.is_empty() {
        format!("entry at line {}", token.line)
    } else {
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sfm::mapping::model::{
        FieldDescription, HierarchyLevel, Language, MappingDocument,
    };
    use crate::sfm::mapping::validating::validate;

    /// Sink that renders each flushed entry as a compact text tree.
    #[derive(Default)]
    struct CollectSink {
        entries: Vec<String>,
    }

    impl CollectSink {
        fn describe(arena: &NodeArena, id: usize) -> String {
            let node = arena.get(id);
            let mut out = format!("{}(", node.level);
            let mut first = true;
            for item in &node.content {
                if !first {
                    out.push(' ');
                }
                first = false;
                match item {
                    NodeContent::Field(f) => {
                        out.push_str(&format!("{}={}", f.element, f.text));
                    }
                    NodeContent::Child(child) => out.push_str(&Self::describe(arena, *child)),
                }
            }
            out.push(')');
            out
        }
    }

    impl EntrySink for CollectSink {
        fn emit_entry(&mut self, arena: &NodeArena, entry: usize) -> Result<(), ConvertError> {
            self.entries.push(Self::describe(arena, entry));
            Ok(())
        }
    }

    fn level(
        name: &str,
        ancestors: &[&str],
        begin: &[&str],
        additional: &[&str],
        multi: &[&str],
        unique: &[&str],
    ) -> HierarchyLevel {
        HierarchyLevel {
            name: name.to_string(),
            ancestors: ancestors.iter().map(|s| s.to_string()).collect(),
            begin_fields: begin.iter().map(|s| s.to_string()).collect(),
            additional_fields: additional.iter().map(|s| s.to_string()).collect(),
            multi_fields: multi.iter().map(|s| s.to_string()).collect(),
            unique_fields: unique.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn field(marker: &str, meaning: &str) -> FieldDescription {
        FieldDescription {
            marker: marker.to_string(),
            language: "en".to_string(),
            meaning: meaning.to_string(),
            data_type: Default::default(),
            abbreviation: false,
            auto_import: false,
            reference_func: None,
        }
    }

    fn mapping() -> ResolvedMapping {
        let doc = MappingDocument {
            languages: vec![Language {
                id: "en".to_string(),
                xml_lang: "en".to_string(),
                encoding: None,
            }],
            levels: vec![
                level("entry", &[], &["lx"], &["dt"], &[], &["dt"]),
                level(
                    "sense",
                    &["entry"],
                    &["ps"],
                    &["ge", "de"],
                    &["ge"],
                    &["de"],
                ),
                level("example", &["sense"], &["xv"], &["xe"], &[], &[]),
            ],
            fields: vec![
                field("lx", "lex"),
                field("ps", "pos"),
                field("ge", "gloss"),
                field("de", "definition"),
                FieldDescription {
                    data_type: DataType::Date,
                    ..field("dt", "date")
                },
                field("xv", "example"),
                field("xe", "example_gloss"),
            ],
            inline_markers: Vec::new(),
        };
        let mut log = DiagnosticsLog::new();
        validate(doc, &mut log).expect("valid mapping")
    }

    fn encoders(mapping: &ResolvedMapping) -> EncoderRegistry {
        let mut log = DiagnosticsLog::new();
        EncoderRegistry::from_languages(&mapping.languages, &mut log)
    }

    fn token(marker: &str, data: &str, line: usize) -> Token {
        Token::new(marker, data.as_bytes().to_vec(), line)
    }

    fn run(tokens: &[Token]) -> (Vec<String>, DiagnosticsLog) {
        let mapping = mapping();
        let mut encoders = encoders(&mapping);
        let mut log = DiagnosticsLog::new();
        let mut sink = CollectSink::default();
        let mut builder = HierarchyBuilder::new(&mapping);
        for t in tokens {
            builder
                .handle_token(t, &mut encoders, &mut log, &mut sink)
                .expect("handle");
        }
        builder.finish(&mut sink).expect("finish");
        (sink.entries, log)
    }

    #[test]
    fn test_entry_with_nested_sense() {
        let (entries, log) = run(&[
            token("lx", "foo", 1),
            token("ps", "n", 2),
            token("ge", "bar", 3),
        ]);
        assert_eq!(entries, vec!["entry(lex=foo sense(pos=n gloss=bar))"]);
        assert!(log.warnings().is_empty());
        assert_eq!(log.caution_total(), 0);
    }

    #[test]
    fn test_second_begin_closes_previous_entry() {
        let (entries, _) = run(&[
            token("lx", "one", 1),
            token("ps", "n", 2),
            token("lx", "two", 3),
            token("ps", "v", 4),
        ]);
        assert_eq!(
            entries,
            vec![
                "entry(lex=one sense(pos=n))",
                "entry(lex=two sense(pos=v))"
            ]
        );
    }

    #[test]
    fn test_multi_field_repeats_in_one_node() {
        let (entries, log) = run(&[
            token("lx", "foo", 1),
            token("ps", "n", 2),
            token("ge", "dog", 3),
            token("ge", "hound", 4),
        ]);
        assert_eq!(
            entries,
            vec!["entry(lex=foo sense(pos=n gloss=dog gloss=hound))"]
        );
        assert!(log.errors().is_empty());
    }

    #[test]
    fn test_duplicate_unique_field_logged_and_dropped() {
        let (entries, log) = run(&[
            token("lx", "foo", 1),
            token("ps", "n", 2),
            token("de", "first", 3),
            token("de", "second", 4),
        ]);
        // The second \de finds no other destination and is dropped.
        assert_eq!(entries, vec!["entry(lex=foo sense(pos=n definition=first))"]);
        assert!(log
            .errors()
            .iter()
            .any(|e| e.code == "duplicate-unique-field"));
        assert!(log
            .warnings()
            .iter()
            .any(|w| w.code == "unattached-marker"));
    }

    #[test]
    fn test_out_of_order_marker_synthesizes_intermediates() {
        // \xv with no open sense: entry -> sense must be synthesized
        // under way, with a caution.
        let (entries, log) = run(&[token("lx", "foo", 1), token("xv", "foo bar", 2)]);
        assert_eq!(
            entries,
            vec!["entry(lex=foo sense(example(example=foo bar)))"]
        );
        assert_eq!(log.caution_total(), 1);
        assert_eq!(log.cautions()["foo"]["xv"], vec![2]);
    }

    #[test]
    fn test_stray_additional_marker_dropped_with_warning() {
        // Only begin fields synthesize hierarchy; a stray additional
        // marker with nothing open is dropped, but never silently.
        let (entries, log) = run(&[token("ge", "stray", 1), token("lx", "real", 2)]);
        assert_eq!(entries, vec!["entry(lex=real)"]);
        assert!(log
            .warnings()
            .iter()
            .any(|w| w.code == "unattached-marker"));
        assert_eq!(log.caution_total(), 0);
    }

    #[test]
    fn test_undefined_marker_warned_once() {
        let (entries, log) = run(&[
            token("lx", "foo", 1),
            token("zz", "a", 2),
            token("zz", "b", 3),
        ]);
        assert_eq!(entries, vec!["entry(lex=foo)"]);
        let undefined: Vec<_> = log
            .warnings()
            .iter()
            .filter(|w| w.code == "undefined-marker")
            .collect();
        assert_eq!(undefined.len(), 1);
        assert_eq!(log.stats()["zz"].undefined, 2);
    }

    #[test]
    fn test_underscore_markers_silently_ignored() {
        let (entries, log) = run(&[token("_sh", "v3.0", 1), token("lx", "foo", 2)]);
        assert_eq!(entries, vec!["entry(lex=foo)"]);
        assert!(log.warnings().is_empty());
    }

    #[test]
    fn test_nesting_depth_matches_ancestor_chain() {
        let mapping = mapping();
        let mut encoders = encoders(&mapping);
        let mut log = DiagnosticsLog::new();
        let mut sink = CollectSink::default();
        let mut builder = HierarchyBuilder::new(&mapping);
        for t in [
            token("lx", "foo", 1),
            token("ps", "n", 2),
            token("xv", "deep", 3),
        ] {
            builder
                .handle_token(&t, &mut encoders, &mut log, &mut sink)
                .expect("handle");
        }
        // example sits three levels below the synthetic root.
        let arena = builder.arena();
        let example_id = (0..4)
            .find(|&i| arena.get(i).level == "example")
            .expect("example node");
        assert_eq!(arena.get(example_id).depth, 3);
    }

    #[test]
    fn test_flush_bounds_live_arena() {
        let mapping = mapping();
        let mut encoders = encoders(&mapping);
        let mut log = DiagnosticsLog::new();
        let mut sink = CollectSink::default();
        let mut builder = HierarchyBuilder::new(&mapping);
        for i in 0..50 {
            let line = i * 2 + 1;
            builder
                .handle_token(&token("lx", &format!("w{}", i), line), &mut encoders, &mut log, &mut sink)
                .expect("handle");
            builder
                .handle_token(&token("ps", "n", line + 1), &mut encoders, &mut log, &mut sink)
                .expect("handle");
        }
        // Only the root and the one unfinished entry subtree stay live.
        assert!(builder.arena().live_count() <= 3);
        builder.finish(&mut sink).expect("finish");
        assert_eq!(sink.entries.len(), 50);
    }

    #[test]
    fn test_date_field_valid_and_invalid() {
        let (entries, log) = run(&[
            token("lx", "foo", 1),
            token("dt", "2024-01-15", 2),
            token("lx", "bar", 3),
            token("dt", "yesterday-ish", 4),
        ]);
        assert_eq!(
            entries,
            vec!["entry(lex=foo date=2024-01-15)", "entry(lex=bar)"]
        );
        assert!(log.warnings().iter().any(|w| w.code == "date-format"));
    }
}
