//! Resolves inline begin/end markup inside one field's data.
//!
//! The resolver walks the raw bytes with a stack of open markers. At each
//! step it finds the earliest relevant occurrence of any begin text or any
//! end text of a currently-open marker. A longer match wins a tie at the
//! same offset; end occurrences beat begin occurrences of the same length.
//!
//! An end occurrence may target a marker that is not innermost. The stack
//! is then unwound from the inside out until the target is closed, and the
//! markers that were incidentally closed along the way are reopened and
//! tracked again. Output nesting is therefore always balanced no matter
//! what order the input closes things in.
//!
//! Text between occurrences is converted with the currently active
//! language encoder: a begin marker with a language override pushes that
//! language for its span.
//!
//! "End of word" markers close at the next whitespace byte (which stays in
//! the output as ordinary text); "end of field" markers, and any markers
//! still open when the data runs out, close at the end of the field in
//! reverse order of opening.

use super::super::diagnostics::DiagnosticsLog;
use super::super::encoding::{sanitize_xml_text, EncoderRegistry};
use super::super::mapping::validating::ResolvedInline;

#[derive(Debug)]
struct Frame {
    idx: usize,
    switched_language: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HitKind {
    /// A literal end text of the open frame at this stack position.
    End { frame_pos: usize },
    /// The implicit whitespace end of an end-of-word frame.
    WordEnd { frame_pos: usize },
    /// A begin text of the marker at this index.
    Begin { marker: usize },
}

#[derive(Debug, Clone, Copy)]
struct Hit {
    offset: usize,
    len: usize,
    kind: HitKind,
}

fn rank(kind: HitKind) -> u8 {
    match kind {
        HitKind::End { .. } | HitKind::WordEnd { .. } => 0,
        HitKind::Begin { .. } => 1,
    }
}

/// Ordering: earliest offset, then longest match, then ends before begins,
/// then the innermost open frame.
fn better(new: &Hit, cur: &Hit) -> bool {
    if new.offset != cur.offset {
        return new.offset < cur.offset;
    }
    if new.len != cur.len {
        return new.len > cur.len;
    }
    let (nr, cr) = (rank(new.kind), rank(cur.kind));
    if nr != cr {
        return nr < cr;
    }
    match (new.kind, cur.kind) {
        (
            HitKind::End { frame_pos: a } | HitKind::WordEnd { frame_pos: a },
            HitKind::End { frame_pos: b } | HitKind::WordEnd { frame_pos: b },
        ) => a > b,
        _ => false,
    }
}

fn find_sub(haystack: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() || haystack.len() < needle.len() {
        return None;
    }
    let mut i = from;
    while i + needle.len() <= haystack.len() {
        if &haystack[i..i + needle.len()] == needle {
            return Some(i);
        }
        i += 1;
    }
    None
}

fn find_whitespace(haystack: &[u8], from: usize) -> Option<usize> {
    haystack[from.min(haystack.len())..]
        .iter()
        .position(|b| matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
        .map(|p| from + p)
}

/// Resolve one field's inline markup and convert its text.
///
/// Returns `None` when the field's language is flagged ignore (the field
/// is suppressed entirely).
pub fn resolve_field(
    data: &[u8],
    base_language: &str,
    inlines: &[ResolvedInline],
    encoders: &mut EncoderRegistry,
    line: usize,
    log: &mut DiagnosticsLog,
) -> Option<String> {
    if encoders.get(base_language).is_some_and(|e| e.is_ignore()) {
        return None;
    }

    let mut out = String::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut lang_stack: Vec<String> = vec![base_language.to_string()];
    let mut p = 0;

    loop {
        let mut best: Option<Hit> = None;
        let mut consider = |hit: Hit| {
            if best.as_ref().map_or(true, |cur| better(&hit, cur)) {
                best = Some(hit);
            }
        };
        for (pos, frame) in stack.iter().enumerate() {
            let marker = &inlines[frame.idx];
            for end in &marker.ends {
                if let Some(offset) = find_sub(data, p, end) {
                    consider(Hit {
                        offset,
                        len: end.len(),
                        kind: HitKind::End { frame_pos: pos },
                    });
                }
            }
            if marker.end_of_word {
                if let Some(offset) = find_whitespace(data, p) {
                    consider(Hit {
                        offset,
                        len: 0,
                        kind: HitKind::WordEnd { frame_pos: pos },
                    });
                }
            }
        }
        for (mi, marker) in inlines.iter().enumerate() {
            if let Some(offset) = find_sub(data, p, &marker.begin) {
                consider(Hit {
                    offset,
                    len: marker.begin.len(),
                    kind: HitKind::Begin { marker: mi },
                });
            }
        }

        let Some(hit) = best else { break };
        convert_segment(&data[p..hit.offset], &lang_stack, encoders, line, log, &mut out);
        p = hit.offset + hit.len;

        match hit.kind {
            HitKind::Begin { marker: mi } => {
                let marker = &inlines[mi];
                let mut switched = false;
                if !marker.ignore {
                    out.push('<');
                    out.push_str(&marker.element);
                    out.push('>');
                    if let Some(lang) = &marker.language {
                        lang_stack.push(lang.clone());
                        switched = true;
                    }
                }
                stack.push(Frame {
                    idx: mi,
                    switched_language: switched,
                });
            }
            HitKind::End { frame_pos } | HitKind::WordEnd { frame_pos } => {
                close_to(frame_pos, &mut stack, &mut lang_stack, inlines, &mut out);
            }
        }
    }

    convert_segment(&data[p..], &lang_stack, encoders, line, log, &mut out);

    // Whatever is still open closes in reverse order of opening. This also
    // satisfies end-of-field markers, whose end is the end of the data.
    while let Some(frame) = stack.pop() {
        let marker = &inlines[frame.idx];
        if !marker.ignore {
            out.push_str("</");
            out.push_str(&marker.element);
            out.push('>');
        }
        if frame.switched_language {
            lang_stack.pop();
        }
    }

    Some(out)
}

/// Close frames from the innermost outward until `target` is closed, then
/// reopen the frames that were only incidentally closed.
fn close_to(
    target: usize,
    stack: &mut Vec<Frame>,
    lang_stack: &mut Vec<String>,
    inlines: &[ResolvedInline],
    out: &mut String,
) {
    let mut reopen: Vec<Frame> = Vec::new();
    while stack.len() > target + 1 {
        let frame = stack.pop().expect("frames above target");
        emit_close(&frame, inlines, lang_stack, out);
        reopen.push(frame);
    }
    if let Some(frame) = stack.pop() {
        emit_close(&frame, inlines, lang_stack, out);
    }
    for frame in reopen.into_iter().rev() {
        let marker = &inlines[frame.idx];
        if !marker.ignore {
            out.push('<');
            out.push_str(&marker.element);
            out.push('>');
        }
        if frame.switched_language {
            let lang = marker.language.clone().expect("switched frame has a language");
            lang_stack.push(lang);
        }
        stack.push(frame);
    }
}

fn emit_close(
    frame: &Frame,
    inlines: &[ResolvedInline],
    lang_stack: &mut Vec<String>,
    out: &mut String,
) {
    let marker = &inlines[frame.idx];
    if !marker.ignore {
        out.push_str("</");
        out.push_str(&marker.element);
        out.push('>');
    }
    if frame.switched_language {
        lang_stack.pop();
    }
}

fn convert_segment(
    segment: &[u8],
    lang_stack: &[String],
    encoders: &mut EncoderRegistry,
    line: usize,
    log: &mut DiagnosticsLog,
    out: &mut String,
) {
    if segment.is_empty() {
        return;
    }
    let lang = lang_stack.last().map(String::as_str).unwrap_or("");
    match encoders.get_mut(lang) {
        Some(encoder) => {
            if let Some(text) = encoder.convert(segment, line, log) {
                out.push_str(&text);
            }
        }
        None => {
            // No encoder registered for this language; treat as UTF-8.
            let text = String::from_utf8_lossy(segment);
            out.push_str(&sanitize_xml_text(&text, line, log));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sfm::mapping::model::Language;

    fn registry() -> EncoderRegistry {
        let langs = vec![
            Language {
                id: "en".to_string(),
                xml_lang: "en".to_string(),
                encoding: None,
            },
            Language {
                id: "vern".to_string(),
                xml_lang: "xkal".to_string(),
                encoding: Some("windows-1252".to_string()),
            },
        ];
        let mut log = DiagnosticsLog::new();
        EncoderRegistry::from_languages(&langs, &mut log)
    }

    fn inline(begin: &str, ends: &[&str], element: &str) -> ResolvedInline {
        ResolvedInline {
            begin: begin.as_bytes().to_vec(),
            ends: ends.iter().map(|e| e.as_bytes().to_vec()).collect(),
            end_of_word: false,
            end_of_field: false,
            language: None,
            ignore: false,
            element: element.to_string(),
        }
    }

    fn resolve(data: &[u8], inlines: &[ResolvedInline]) -> String {
        let mut encoders = registry();
        let mut log = DiagnosticsLog::new();
        resolve_field(data, "en", inlines, &mut encoders, 1, &mut log).expect("not ignored")
    }

    #[test]
    fn test_plain_text_passes_through() {
        let inlines = [inline("**", &["**"], "em")];
        assert_eq!(resolve(b"no markup here", &inlines), "no markup here");
    }

    #[test]
    fn test_simple_pair_becomes_element() {
        let inlines = [inline("**", &["**"], "em")];
        assert_eq!(resolve(b"a **bold** b", &inlines), "a <em>bold</em> b");
    }

    #[test]
    fn test_overlapping_markers_reopen() {
        let inlines = [inline("**", &["**"], "em"), inline("[[", &["]]"], "q")];
        assert_eq!(
            resolve(b"**a[[b**c]]d", &inlines),
            "<em>a<q>b</q></em><q>c</q>d"
        );
    }

    #[test]
    fn test_unclosed_marker_force_closed_at_field_end() {
        let inlines = [inline("**", &["**"], "em"), inline("[[", &["]]"], "q")];
        assert_eq!(resolve(b"a **b [[c", &inlines), "a <em>b <q>c</q></em>");
    }

    #[test]
    fn test_longer_match_wins_at_same_offset() {
        // Both "|f" and "|fv{" match at offset 2; the longer begin wins.
        let inlines = [inline("|f", &["}"], "f"), inline("|fv{", &["}"], "fv")];
        assert_eq!(resolve(b"a |fv{x} b", &inlines), "a <fv>x</fv> b");
    }

    #[test]
    fn test_end_of_word_closes_at_whitespace() {
        let mut m = inline("@", &[], "w");
        m.end_of_word = true;
        assert_eq!(resolve(b"say @word here", &[m]), "say <w>word</w> here");
    }

    #[test]
    fn test_end_of_field_closes_at_end() {
        let mut m = inline("@@", &[], "rest");
        m.end_of_field = true;
        assert_eq!(resolve(b"x @@tail text", &[m]), "x <rest>tail text</rest>");
    }

    #[test]
    fn test_ignored_marker_consumes_markup_only() {
        let mut m = inline("~~", &["~~"], "gone");
        m.ignore = true;
        assert_eq!(resolve(b"a ~~b~~ c", &[m]), "a b c");
    }

    #[test]
    fn test_language_override_switches_encoder() {
        let mut m = inline("|fv{", &["}"], "fv");
        m.language = Some("vern".to_string());
        // 0xE9 is only meaningful in windows-1252; the override must route
        // the enclosed span through the vernacular encoder.
        assert_eq!(
            resolve(b"x |fv{caf\xE9} y", &[m]),
            "x <fv>caf\u{e9}</fv> y"
        );
    }

    #[test]
    fn test_text_segments_are_escaped() {
        let inlines = [inline("**", &["**"], "em")];
        assert_eq!(resolve(b"1 < 2 **a & b**", &inlines), "1 &lt; 2 <em>a &amp; b</em>");
    }

    #[test]
    fn test_ignored_base_language_suppresses_field() {
        let langs = vec![Language {
            id: "skip".to_string(),
            xml_lang: "und".to_string(),
            encoding: Some("ignore".to_string()),
        }];
        let mut log = DiagnosticsLog::new();
        let mut encoders = EncoderRegistry::from_languages(&langs, &mut log);
        assert_eq!(
            resolve_field(b"data", "skip", &[], &mut encoders, 1, &mut log),
            None
        );
    }

    #[test]
    fn test_balanced_nesting_property() {
        // Deliberately tangled input: every <x> must have a matching </x>.
        let inlines = [
            inline("**", &["**"], "em"),
            inline("[[", &["]]"], "q"),
            inline("{{", &["}}"], "t"),
        ];
        let out = resolve(b"{{a**b[[c}}d**e]]f", &inlines);
        for el in ["em", "q", "t"] {
            let opens = out.matches(&format!("<{}>", el)).count();
            let closes = out.matches(&format!("</{}>", el)).count();
            assert_eq!(opens, closes, "unbalanced <{}> in {}", el, out);
        }
    }

    #[test]
    fn test_same_offset_end_beats_begin() {
        // At the closing "**" both an end (of the open frame) and a new
        // begin match; the end must win or the output would never close.
        let inlines = [inline("**", &["**"], "em")];
        assert_eq!(resolve(b"**a**", &inlines), "<em>a</em>");
    }
}
