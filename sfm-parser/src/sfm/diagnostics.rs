//! Diagnostic collection for a conversion run.
//!
//! The converter recovers from almost everything, so the diagnostics log is
//! the primary quality report of a run: it is emitted as a trailing block of
//! the output document so callers can judge whether the conversion is good
//! enough to keep.
//!
//! Collections are bounded. Once a severity bucket reaches its cap, further
//! records of that severity are counted but not stored, which keeps memory
//! flat on pathological inputs. Per-marker deduplication works the same way:
//! the first occurrence is recorded in full, repeats only bump a counter.
//!
//! All grouping structures are insertion-ordered maps: the report must list
//! markers and entries in the order the run first encountered them, not in
//! whatever order a hash map happens to produce.

use indexmap::IndexMap;
use std::fmt;

/// Cap on stored records per severity bucket. Overflow is counted only.
pub const MAX_RECORDS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Fatal,
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Fatal => write!(f, "fatal"),
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// One recorded diagnostic.
#[derive(Debug, Clone)]
pub struct Record {
    pub severity: Severity,
    pub code: &'static str,
    pub message: String,
    pub line: Option<usize>,
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{} [{}] line {}: {}", self.severity, self.code, line, self.message),
            None => write!(f, "{} [{}]: {}", self.severity, self.code, self.message),
        }
    }
}

/// Per-marker usage statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarkerStats {
    pub with_data: usize,
    pub without_data: usize,
    pub undefined: usize,
}

/// One auto-imported marker, reported as synthesized metadata.
#[derive(Debug, Clone)]
pub struct AutoFieldNote {
    pub level: String,
    pub count: usize,
    pub first_line: usize,
}

/// Accumulates everything a run wants to tell the caller.
#[derive(Debug, Default)]
pub struct DiagnosticsLog {
    fatals: Vec<Record>,
    errors: Vec<Record>,
    warnings: Vec<Record>,
    dropped_errors: usize,
    dropped_warnings: usize,
    /// marker -> total occurrences of a deduplicated error.
    marker_errors: IndexMap<String, usize>,
    /// marker -> total occurrences of a deduplicated warning.
    marker_warnings: IndexMap<String, usize>,
    /// entry key -> marker -> lines where the marker arrived out of order.
    cautions: IndexMap<String, IndexMap<String, Vec<usize>>>,
    stats: IndexMap<String, MarkerStats>,
    auto_fields: IndexMap<String, AutoFieldNote>,
}

impl DiagnosticsLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fatal(&mut self, code: &'static str, message: impl Into<String>) {
        self.fatals.push(Record {
            severity: Severity::Fatal,
            code,
            message: message.into(),
            line: None,
        });
    }

    pub fn error(&mut self, code: &'static str, message: impl Into<String>, line: Option<usize>) {
        if self.errors.len() >= MAX_RECORDS {
            self.dropped_errors += 1;
            return;
        }
        self.errors.push(Record {
            severity: Severity::Error,
            code,
            message: message.into(),
            line,
        });
    }

    pub fn warning(&mut self, code: &'static str, message: impl Into<String>, line: Option<usize>) {
        if self.warnings.len() >= MAX_RECORDS {
            self.dropped_warnings += 1;
            return;
        }
        self.warnings.push(Record {
            severity: Severity::Warning,
            code,
            message: message.into(),
            line,
        });
    }

    /// Record an error once per marker; repeats only bump the marker counter.
    ///
    /// Returns true when the full record was stored (first occurrence).
    pub fn error_once(
        &mut self,
        marker: &str,
        code: &'static str,
        message: impl Into<String>,
        line: Option<usize>,
    ) -> bool {
        let count = self.marker_errors.entry(marker.to_string()).or_insert(0);
        *count += 1;
        if *count == 1 {
            self.error(code, message, line);
            true
        } else {
            false
        }
    }

    /// Record a warning once per marker; repeats only bump the marker counter.
    pub fn warning_once(
        &mut self,
        marker: &str,
        code: &'static str,
        message: impl Into<String>,
        line: Option<usize>,
    ) -> bool {
        let count = self.marker_warnings.entry(marker.to_string()).or_insert(0);
        *count += 1;
        if *count == 1 {
            self.warning(code, message, line);
            true
        } else {
            false
        }
    }

    /// Record an out-of-order caution for `marker` within the entry
    /// identified by `entry_key`.
    pub fn caution(&mut self, entry_key: &str, marker: &str, line: usize) {
        self.cautions
            .entry(entry_key.to_string())
            .or_default()
            .entry(marker.to_string())
            .or_default()
            .push(line);
    }

    pub fn count_marker(&mut self, marker: &str, has_data: bool) {
        let stats = self.stats.entry(marker.to_string()).or_default();
        if has_data {
            stats.with_data += 1;
        } else {
            stats.without_data += 1;
        }
    }

    pub fn count_undefined(&mut self, marker: &str) {
        self.stats.entry(marker.to_string()).or_default().undefined += 1;
    }

    pub fn note_auto_field(&mut self, marker: &str, level: &str, line: usize) {
        let note = self
            .auto_fields
            .entry(marker.to_string())
            .or_insert_with(|| AutoFieldNote {
                level: level.to_string(),
                count: 0,
                first_line: line,
            });
        note.count += 1;
    }

    pub fn fatals(&self) -> &[Record] {
        &self.fatals
    }

    pub fn errors(&self) -> &[Record] {
        &self.errors
    }

    pub fn warnings(&self) -> &[Record] {
        &self.warnings
    }

    pub fn cautions(&self) -> &IndexMap<String, IndexMap<String, Vec<usize>>> {
        &self.cautions
    }

    pub fn stats(&self) -> &IndexMap<String, MarkerStats> {
        &self.stats
    }

    pub fn auto_fields(&self) -> &IndexMap<String, AutoFieldNote> {
        &self.auto_fields
    }

    pub fn marker_error_repeats(&self) -> &IndexMap<String, usize> {
        &self.marker_errors
    }

    pub fn marker_warning_repeats(&self) -> &IndexMap<String, usize> {
        &self.marker_warnings
    }

    /// Total errors including records dropped past the cap.
    pub fn error_total(&self) -> usize {
        self.errors.len() + self.dropped_errors + self.fatals.len()
    }

    /// Total warnings including records dropped past the cap.
    pub fn warning_total(&self) -> usize {
        self.warnings.len() + self.dropped_warnings
    }

    pub fn caution_total(&self) -> usize {
        self.cautions
            .values()
            .map(|markers| markers.values().map(Vec::len).sum::<usize>())
            .sum()
    }

    pub fn dropped_errors(&self) -> usize {
        self.dropped_errors
    }

    pub fn dropped_warnings(&self) -> usize {
        self.dropped_warnings
    }

    pub fn has_fatal(&self) -> bool {
        !self.fatals.is_empty()
    }
}
