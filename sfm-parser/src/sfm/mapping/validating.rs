//! Structural validation of a loaded mapping.
//!
//! The validation pass is deliberately forgiving: a mapping problem is
//! logged and patched around wherever a reasonable repair exists (first
//! registrant wins, bad references dropped, a dummy root synthesized), so a
//! user with a half-finished mapping still gets a best-effort conversion
//! plus a report of what was wrong. Only a mapping with no levels or no
//! begin fields at all is rejected outright — there would be nothing to
//! build.
//!
//! The output is a [`ResolvedMapping`]: the lookup structures the builder
//! and the inline resolver actually consume. All registries are
//! insertion-ordered so downstream reporting follows declaration order.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use super::model::{FieldDescription, HierarchyLevel, Language, MappingDocument};
use crate::sfm::diagnostics::DiagnosticsLog;
use crate::sfm::error::ConvertError;

/// One hierarchy level with its references checked.
#[derive(Debug, Clone)]
pub struct LevelInfo {
    pub name: String,
    pub ancestors: Vec<String>,
    pub begin_fields: Vec<String>,
    pub additional_fields: Vec<String>,
    pub multi_fields: HashSet<String>,
    pub unique_fields: HashSet<String>,
}

impl LevelInfo {
    fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ancestors: Vec::new(),
            begin_fields: Vec::new(),
            additional_fields: Vec::new(),
            multi_fields: HashSet::new(),
            unique_fields: HashSet::new(),
        }
    }

    /// Whether the marker belongs to this level's field sets at all.
    pub fn declares(&self, marker: &str) -> bool {
        self.begin_fields.iter().any(|m| m == marker)
            || self.additional_fields.iter().any(|m| m == marker)
    }

    pub fn is_multi(&self, marker: &str) -> bool {
        self.multi_fields.contains(marker)
    }

    pub fn is_unique(&self, marker: &str) -> bool {
        self.unique_fields.contains(marker)
    }
}

/// One inline marker, resolved to byte patterns and an output element name.
#[derive(Debug, Clone)]
pub struct ResolvedInline {
    pub begin: Vec<u8>,
    pub ends: Vec<Vec<u8>>,
    pub end_of_word: bool,
    pub end_of_field: bool,
    pub language: Option<String>,
    pub ignore: bool,
    pub element: String,
}

/// The validated mapping in the shape the conversion run consumes.
#[derive(Debug)]
pub struct ResolvedMapping {
    pub languages: Vec<Language>,
    pub levels: IndexMap<String, LevelInfo>,
    /// The level whose instances sit directly under the output root.
    pub root_level: String,
    /// marker -> level it begins.
    pub begin_of: IndexMap<String, String>,
    /// marker -> its field description.
    pub fields: IndexMap<String, FieldDescription>,
    /// Markers whose fields are dropped (undeclared language).
    pub ignored_markers: HashSet<String>,
    /// Declared markers that no hierarchy level uses; dropped like ignored
    /// ones, but reported separately at validation time.
    pub out_of_hierarchy: HashSet<String>,
    pub inlines: Vec<ResolvedInline>,
}

impl ResolvedMapping {
    pub fn level(&self, name: &str) -> Option<&LevelInfo> {
        self.levels.get(name)
    }

    pub fn field(&self, marker: &str) -> Option<&FieldDescription> {
        self.fields.get(marker)
    }
}

static INVALID_NAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new("[^A-Za-z0-9_.-]+").expect("valid regex"));

/// Reduce arbitrary text to an XML element name, or empty when nothing
/// usable remains.
pub fn xml_element_name(raw: &str) -> String {
    let cleaned = INVALID_NAME_CHARS.replace_all(raw.trim(), "_");
    let cleaned = cleaned.trim_matches('_').to_string();
    if cleaned.is_empty() {
        return String::new();
    }
    let first = cleaned.chars().next().expect("non-empty");
    if first.is_ascii_alphabetic() || first == '_' {
        cleaned
    } else {
        format!("_{}", cleaned)
    }
}

/// Generates unique element and level names. The counter lives here and is
/// threaded by parameter; nothing about name synthesis is global.
struct NameContext {
    next_id: u32,
    taken: HashSet<String>,
}

impl NameContext {
    fn new() -> Self {
        Self {
            next_id: 1,
            taken: HashSet::new(),
        }
    }

    fn fresh_auto_name(&mut self, prefix: &str) -> String {
        loop {
            let candidate = format!("{}{}", prefix, self.next_id);
            self.next_id += 1;
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
        }
    }

    /// Claim `base` if free, otherwise disambiguate with a numeric suffix.
    fn claim(&mut self, base: &str) -> String {
        if self.taken.insert(base.to_string()) {
            return base.to_string();
        }
        let mut n = 1;
        loop {
            let candidate = format!("{}{}", base, n);
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Validate a mapping and resolve it for use by a run.
pub fn validate(
    doc: MappingDocument,
    log: &mut DiagnosticsLog,
) -> Result<ResolvedMapping, ConvertError> {
    if doc.levels.is_empty() {
        return Err(ConvertError::MappingInvalid(
            "the mapping declares no hierarchy levels".to_string(),
        ));
    }

    let languages = validate_languages(doc.languages, log);
    let language_ids: HashSet<String> = languages.iter().map(|l| l.id.clone()).collect();

    let mut names = NameContext::new();
    let mut levels = validate_levels(doc.levels, log);
    for name in levels.keys() {
        names.taken.insert(name.clone());
    }
    let root_level = resolve_root(&mut levels, &mut names, log);
    let begin_of = register_begin_fields(&mut levels, log);
    check_field_subsets(&mut levels, log);

    if begin_of.is_empty() {
        return Err(ConvertError::MappingInvalid(
            "no hierarchy level declares a begin field".to_string(),
        ));
    }

    let (fields, ignored_markers, out_of_hierarchy) =
        validate_fields(doc.fields, &language_ids, &levels, log);
    let inlines = validate_inlines(doc.inline_markers, &language_ids, log);

    Ok(ResolvedMapping {
        languages,
        levels,
        root_level,
        begin_of,
        fields,
        ignored_markers,
        out_of_hierarchy,
        inlines,
    })
}

fn validate_languages(languages: Vec<Language>, log: &mut DiagnosticsLog) -> Vec<Language> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for lang in languages {
        if lang.id.trim().is_empty() {
            log.error("language-id-empty", "A language with an empty id was dropped", None);
            continue;
        }
        if !seen.insert(lang.id.clone()) {
            log.error(
                "language-id-duplicate",
                format!("Language id '{}' is declared twice; the first wins", lang.id),
                None,
            );
            continue;
        }
        out.push(lang);
    }
    out
}

fn validate_levels(
    declared: Vec<HierarchyLevel>,
    log: &mut DiagnosticsLog,
) -> IndexMap<String, LevelInfo> {
    let mut levels: IndexMap<String, LevelInfo> = IndexMap::new();
    for level in &declared {
        let name = xml_element_name(&level.name);
        if name.is_empty() {
            log.error(
                "level-name-invalid",
                format!("Hierarchy level name '{}' is unusable; the level was dropped", level.name),
                None,
            );
            continue;
        }
        if name != level.name {
            log.warning(
                "level-name-sanitized",
                format!("Hierarchy level '{}' renamed to '{}' for XML output", level.name, name),
                None,
            );
        }
        if levels.contains_key(&name) {
            log.error(
                "level-duplicate",
                format!("Hierarchy level '{}' is declared twice; the first wins", name),
                None,
            );
            continue;
        }
        levels.insert(
            name.clone(),
            LevelInfo {
                name,
                ancestors: level.ancestors.clone(),
                begin_fields: level.begin_fields.clone(),
                additional_fields: level.additional_fields.clone(),
                multi_fields: level.multi_fields.iter().cloned().collect(),
                unique_fields: level.unique_fields.iter().cloned().collect(),
            },
        );
    }

    // Ancestor references must point at declared levels and never at the
    // level itself.
    let known: HashSet<String> = levels.keys().cloned().collect();
    for info in levels.values_mut() {
        let name = info.name.clone();
        info.ancestors.retain(|anc| {
            if anc == &name {
                log.error(
                    "ancestor-self",
                    format!("Level '{}' lists itself as an ancestor; ignored", name),
                    None,
                );
                return false;
            }
            if !known.contains(anc) {
                log.error(
                    "ancestor-unknown",
                    format!("Level '{}' lists unknown ancestor '{}'; ignored", name, anc),
                    None,
                );
                return false;
            }
            true
        });
    }
    levels
}

/// Find the implied root: the one ancestor-less level the others nest
/// under. Zero or multiple candidates is an error recovered by synthesizing
/// a dummy root so the run can continue.
fn resolve_root(
    levels: &mut IndexMap<String, LevelInfo>,
    names: &mut NameContext,
    log: &mut DiagnosticsLog,
) -> String {
    let referenced: HashSet<String> = levels
        .values()
        .flat_map(|l| l.ancestors.iter().cloned())
        .collect();
    let mut candidates: Vec<String> = levels
        .values()
        .filter(|l| l.ancestors.is_empty())
        .map(|l| l.name.clone())
        .collect();
    if levels.len() > 1 {
        candidates.retain(|n| referenced.contains(n));
    }

    if candidates.len() == 1 {
        return candidates.remove(0);
    }

    log.error(
        "hierarchy-root",
        format!(
            "The hierarchy must imply exactly one root level, found {}; \
             a dummy root was synthesized",
            candidates.len()
        ),
        None,
    );
    let dummy = names.claim("records");
    let orphans: Vec<String> = levels
        .values()
        .filter(|l| l.ancestors.is_empty())
        .map(|l| l.name.clone())
        .collect();
    levels.insert(dummy.clone(), LevelInfo::empty(&dummy));
    for orphan in orphans {
        if orphan != dummy {
            if let Some(info) = levels.get_mut(&orphan) {
                info.ancestors.push(dummy.clone());
            }
        }
    }
    dummy
}

/// A marker may begin at most one level; later registrants lose and the
/// losing declaration is removed so the marker cannot leak back in as an
/// ordinary field of the losing level.
fn register_begin_fields(
    levels: &mut IndexMap<String, LevelInfo>,
    log: &mut DiagnosticsLog,
) -> IndexMap<String, String> {
    let mut begin_of: IndexMap<String, String> = IndexMap::new();
    for info in levels.values_mut() {
        let name = info.name.clone();
        info.begin_fields.retain(|marker| {
            if let Some(winner) = begin_of.get(marker) {
                log.error(
                    "begin-field-duplicate",
                    format!(
                        "Marker \\{} is a begin field of both '{}' and '{}'; '{}' wins",
                        marker, winner, name, winner
                    ),
                    None,
                );
                return false;
            }
            begin_of.insert(marker.clone(), name.clone());
            true
        });
    }
    begin_of
}

/// multi/unique designations must name fields the level actually has.
fn check_field_subsets(levels: &mut IndexMap<String, LevelInfo>, log: &mut DiagnosticsLog) {
    for info in levels.values_mut() {
        let name = info.name.clone();
        let declared: HashSet<String> = info
            .begin_fields
            .iter()
            .chain(info.additional_fields.iter())
            .cloned()
            .collect();
        for (set_name, set) in [
            ("multi", &mut info.multi_fields),
            ("unique", &mut info.unique_fields),
        ] {
            let stray: Vec<String> = set.iter().filter(|m| !declared.contains(*m)).cloned().collect();
            for marker in stray {
                log.error(
                    "field-set-stray",
                    format!(
                        "Level '{}' lists \\{} as a {} field but never declares it",
                        name, marker, set_name
                    ),
                    None,
                );
                set.remove(&marker);
            }
        }
    }
}

type FieldTables = (
    IndexMap<String, FieldDescription>,
    HashSet<String>,
    HashSet<String>,
);

fn validate_fields(
    declared: Vec<FieldDescription>,
    language_ids: &HashSet<String>,
    levels: &IndexMap<String, LevelInfo>,
    log: &mut DiagnosticsLog,
) -> FieldTables {
    let mut fields: IndexMap<String, FieldDescription> = IndexMap::new();
    let mut ignored = HashSet::new();
    let mut out_of_hierarchy = HashSet::new();
    for mut field in declared {
        if fields.contains_key(&field.marker) {
            log.warning(
                "field-duplicate",
                format!("Marker \\{} is described twice; the first wins", field.marker),
                None,
            );
            continue;
        }
        if !language_ids.contains(&field.language) {
            log.warning(
                "field-language-unknown",
                format!(
                    "Marker \\{} references undeclared language '{}'; its fields will be dropped",
                    field.marker, field.language
                ),
                None,
            );
            ignored.insert(field.marker.clone());
        }
        let meaning = xml_element_name(&field.meaning);
        if meaning.is_empty() {
            log.warning(
                "field-meaning-invalid",
                format!("Marker \\{} has unusable meaning '{}'; using the marker name", field.marker, field.meaning),
                None,
            );
            field.meaning = xml_element_name(&field.marker);
            if field.meaning.is_empty() {
                field.meaning = "field".to_string();
            }
        } else {
            field.meaning = meaning;
        }
        if !levels.values().any(|l| l.declares(&field.marker)) {
            log.warning(
                "field-not-in-hierarchy",
                format!("Marker \\{} is described but no hierarchy level uses it", field.marker),
                None,
            );
            out_of_hierarchy.insert(field.marker.clone());
        }
        fields.insert(field.marker.clone(), field);
    }
    (fields, ignored, out_of_hierarchy)
}

fn validate_inlines(
    declared: Vec<super::model::InlineMarker>,
    language_ids: &HashSet<String>,
    log: &mut DiagnosticsLog,
) -> Vec<ResolvedInline> {
    let mut names = NameContext::new();
    let mut out = Vec::new();
    for marker in declared {
        if marker.begin.is_empty() {
            log.error(
                "inline-begin-empty",
                "An inline marker with an empty begin text was dropped",
                None,
            );
            continue;
        }
        if marker.end.is_empty() && !marker.end_of_word && !marker.end_of_field {
            log.error(
                "inline-end-missing",
                format!(
                    "Inline marker '{}' has no end texts and no end-of-word/end-of-field flag",
                    marker.begin
                ),
                None,
            );
            continue;
        }
        let language = match marker.language {
            Some(lang) if !language_ids.contains(&lang) => {
                log.warning(
                    "inline-language-unknown",
                    format!(
                        "Inline marker '{}' references undeclared language '{}'; ignored",
                        marker.begin, lang
                    ),
                    None,
                );
                None
            }
            other => other,
        };
        let base = marker
            .style
            .as_deref()
            .map(xml_element_name)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| xml_element_name(&marker.begin));
        let element = if base.is_empty() {
            names.fresh_auto_name("im")
        } else {
            names.claim(&base)
        };
        out.push(ResolvedInline {
            begin: marker.begin.clone().into_bytes(),
            ends: marker.end.iter().map(|e| e.clone().into_bytes()).collect(),
            end_of_word: marker.end_of_word,
            end_of_field: marker.end_of_field,
            language,
            ignore: marker.ignore,
            element,
        });
    }
    out
}
