//! Byte tokenizer for SFM input.
//!
//!     This module performs the first stage of a conversion run: splitting a
//!     raw byte buffer into marker/data tokens. It knows nothing about the
//!     hierarchy or field semantics; those belong to the builder.
//!
//! Input Handling
//!
//!     On construction the buffer's byte-order mark is resolved. UTF-16
//!     variants are transcoded whole to UTF-8 before any tokenizing; a
//!     UTF-32 mark is unsupported and fails the run with all data discarded.
//!     No mark means the buffer is taken as UTF-8 (individual fields may
//!     still carry legacy encodings, which the per-language encoders handle
//!     later).
//!
//!     The dominant end-of-line convention is sniffed from the first 1000
//!     bytes by counting CRLF against lone CR and lone LF, ties going to
//!     CRLF. That single convention defines logical lines for the whole
//!     file; a stray foreign line ending inside a field is ordinary data.
//!
//! Tokens and Lookahead
//!
//!     A marker is a backslash at the start of a logical line, running to
//!     the next whitespace or end-of-line byte. Its data runs to the next
//!     line-initial backslash. Interior end-of-line sequences, platform
//!     newlines, and tabs inside the data each collapse to a single space;
//!     an occurrence that is the very last thing in the span stays verbatim.
//!
//!     The tokenizer keeps exactly one token of lookahead: the token handed
//!     back by `next` was scanned on the previous call, so its recorded line
//!     number is the line its marker was actually found on, independent of
//!     how far the scanner has since moved. Downstream diagnostics depend on
//!     this exact behavior.

use super::diagnostics::DiagnosticsLog;
use super::error::ConvertError;
use super::token::Token;

/// How many leading bytes are sampled to pick the line-ending convention.
const EOL_SAMPLE_BYTES: usize = 1000;

/// The platform newline collapsed inside field data alongside the sniffed
/// end-of-line sequence.
const PLATFORM_NEWLINE: &[u8] = b"\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eol {
    CrLf,
    Cr,
    Lf,
}

impl Eol {
    pub fn bytes(self) -> &'static [u8] {
        match self {
            Eol::CrLf => b"\r\n",
            Eol::Cr => b"\r",
            Eol::Lf => b"\n",
        }
    }
}

/// Count CRLF / lone CR / lone LF in the leading sample and pick the
/// dominant convention. Ties favor CRLF.
pub fn sniff_eol(buf: &[u8]) -> Eol {
    let sample = &buf[..buf.len().min(EOL_SAMPLE_BYTES)];
    let mut crlf = 0usize;
    let mut cr = 0usize;
    let mut lf = 0usize;
    let mut i = 0;
    while i < sample.len() {
        match sample[i] {
            b'\r' => {
                if i + 1 < sample.len() && sample[i + 1] == b'\n' {
                    crlf += 1;
                    i += 2;
                    continue;
                }
                cr += 1;
            }
            b'\n' => lf += 1,
            _ => {}
        }
        i += 1;
    }
    if crlf >= cr && crlf >= lf {
        Eol::CrLf
    } else if cr > lf {
        Eol::Cr
    } else {
        Eol::Lf
    }
}

/// Resolve the byte-order mark and transcode UTF-16 input to UTF-8.
///
/// UTF-32 marks are unsupported: the run fails and all data is discarded.
/// The UTF-32LE check must come before UTF-16LE, which shares its first two
/// bytes.
pub fn decode_input(bytes: Vec<u8>, log: &mut DiagnosticsLog) -> Result<Vec<u8>, ConvertError> {
    if bytes.starts_with(&[0xFF, 0xFE, 0x00, 0x00]) || bytes.starts_with(&[0x00, 0x00, 0xFE, 0xFF])
    {
        log.fatal(
            "utf32-bom",
            "Input file has a UTF-32 byte-order mark; the file cannot be converted",
        );
        return Err(ConvertError::Utf32Unsupported);
    }
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return Ok(bytes[3..].to_vec());
    }
    if bytes.starts_with(&[0xFF, 0xFE]) {
        let (text, had_errors) = encoding_rs::UTF_16LE.decode_without_bom_handling(&bytes[2..]);
        if had_errors {
            log.warning(
                "utf16-decode",
                "UTF-16LE input contained unpaired surrogates; they were replaced",
                None,
            );
        }
        return Ok(text.into_owned().into_bytes());
    }
    if bytes.starts_with(&[0xFE, 0xFF]) {
        let (text, had_errors) = encoding_rs::UTF_16BE.decode_without_bom_handling(&bytes[2..]);
        if had_errors {
            log.warning(
                "utf16-decode",
                "UTF-16BE input contained unpaired surrogates; they were replaced",
                None,
            );
        }
        return Ok(text.into_owned().into_bytes());
    }
    Ok(bytes)
}

fn is_marker_terminator(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n')
}

fn is_valid_marker_byte(b: u8) -> bool {
    (0x21..=0x7E).contains(&b)
}

fn find_seq(buf: &[u8], from: usize, seq: &[u8]) -> Option<usize> {
    if from >= buf.len() || seq.is_empty() || buf.len() < seq.len() {
        return None;
    }
    let mut i = from;
    while i + seq.len() <= buf.len() {
        if &buf[i..i + seq.len()] == seq {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Collapse interior end-of-line sequences, platform newlines, and tabs to
/// single spaces. An occurrence ending exactly at the end of the span is
/// left verbatim.
fn normalize_data(raw: &[u8], eol: Eol) -> Vec<u8> {
    let mut candidates: Vec<&[u8]> = vec![eol.bytes()];
    if !candidates.contains(&PLATFORM_NEWLINE) {
        candidates.push(PLATFORM_NEWLINE);
    }
    candidates.push(b"\t");
    // Longest first so CRLF is matched before its LF half.
    candidates.sort_by_key(|c| std::cmp::Reverse(c.len()));

    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    'outer: while i < raw.len() {
        for cand in &candidates {
            if raw[i..].starts_with(cand) {
                if i + cand.len() == raw.len() {
                    out.extend_from_slice(&raw[i..]);
                    break 'outer;
                }
                out.push(b' ');
                i += cand.len();
                continue 'outer;
            }
        }
        out.push(raw[i]);
        i += 1;
    }
    out
}

/// Stateful single-pass tokenizer over one decoded input buffer.
pub struct SfmTokenizer {
    buf: Vec<u8>,
    /// Next unread byte; always at a line-initial backslash or end of buffer.
    pos: usize,
    /// 1-based line number at `pos`.
    line: usize,
    eol: Eol,
    lookahead: Option<Token>,
}

impl SfmTokenizer {
    /// Resolve the byte-order mark, sniff the line-ending convention, check
    /// leading content, and scan the first token into the lookahead slot.
    pub fn new(bytes: Vec<u8>, log: &mut DiagnosticsLog) -> Result<Self, ConvertError> {
        let buf = decode_input(bytes, log)?;
        let eol = sniff_eol(&buf);
        let mut tokenizer = Self {
            buf,
            pos: 0,
            line: 1,
            eol,
            lookahead: None,
        };
        tokenizer.skip_leading_content(log);
        tokenizer.lookahead = tokenizer.scan_token(log);
        Ok(tokenizer)
    }

    pub fn eol(&self) -> Eol {
        self.eol
    }

    /// Hand out the previously scanned token and scan one more ahead.
    pub fn next(&mut self, log: &mut DiagnosticsLog) -> Option<Token> {
        let upcoming = self.scan_token(log);
        std::mem::replace(&mut self.lookahead, upcoming)
    }

    /// Consume lines until the first line-initial backslash. Whitespace-only
    /// leading content is fine; anything else is exactly one error.
    fn skip_leading_content(&mut self, log: &mut DiagnosticsLog) {
        let mut content_line = None;
        while self.pos < self.buf.len() && self.buf[self.pos] != b'\\' {
            let line_end = find_seq(&self.buf, self.pos, self.eol.bytes());
            let (end, next) = match line_end {
                Some(p) => (p, p + self.eol.bytes().len()),
                None => (self.buf.len(), self.buf.len()),
            };
            if content_line.is_none()
                && self.buf[self.pos..end].iter().any(|b| !b.is_ascii_whitespace())
            {
                content_line = Some(self.line);
            }
            self.pos = next;
            if line_end.is_some() {
                self.line += 1;
            }
        }
        if let Some(line) = content_line {
            log.error(
                "content-before-marker",
                "Character data found before the first marker",
                Some(line),
            );
        }
    }

    /// Scan one marker/data token starting at the current position.
    fn scan_token(&mut self, log: &mut DiagnosticsLog) -> Option<Token> {
        if self.pos >= self.buf.len() {
            return None;
        }
        let marker_line = self.line;

        // Marker span: past the backslash, up to whitespace or end of line.
        let marker_start = self.pos + 1;
        let mut i = marker_start;
        while i < self.buf.len() && !is_marker_terminator(self.buf[i]) {
            i += 1;
        }
        let marker_bytes = &self.buf[marker_start..i];
        let bad = marker_bytes.iter().filter(|b| !is_valid_marker_byte(**b)).count();
        let marker = String::from_utf8_lossy(marker_bytes).into_owned();
        if bad > 0 {
            log.error(
                "bad-marker-bytes",
                format!("Marker \\{} contains {} invalid byte(s)", marker, bad),
                Some(marker_line),
            );
        }

        // One space or tab separates marker from data; an end-of-line
        // terminator is part of the data span instead.
        let data_start = if i < self.buf.len() && matches!(self.buf[i], b' ' | b'\t') {
            i + 1
        } else {
            i
        };

        // Data runs line by line to the next line-initial backslash,
        // keeping the trailing end-of-line sequence in the span.
        let eol_len = self.eol.bytes().len();
        let mut j = data_start;
        let data_end = loop {
            match find_seq(&self.buf, j, self.eol.bytes()) {
                Some(p) => {
                    let after = p + eol_len;
                    self.line += 1;
                    if after >= self.buf.len() {
                        break self.buf.len();
                    }
                    if self.buf[after] == b'\\' {
                        break after;
                    }
                    j = after;
                }
                None => break self.buf.len(),
            }
        };

        let data = normalize_data(&self.buf[data_start..data_end], self.eol);
        self.pos = data_end;
        Some(Token::new(marker, data, marker_line))
    }
}
