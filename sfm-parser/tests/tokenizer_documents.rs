//! Tokenizer behavior over realistic documents, via the public API.

use sfm_parser::sfm::diagnostics::DiagnosticsLog;
use sfm_parser::sfm::token::Token;
use sfm_parser::sfm::tokenizing::{Eol, SfmTokenizer};

fn tokenize(input: &[u8]) -> (Vec<Token>, DiagnosticsLog) {
    let mut log = DiagnosticsLog::new();
    let mut tokenizer = SfmTokenizer::new(input.to_vec(), &mut log).expect("tokenizer");
    let mut tokens = Vec::new();
    while let Some(token) = tokenizer.next(&mut log) {
        tokens.push(token);
    }
    (tokens, log)
}

#[test]
fn shoebox_style_record() {
    let input = b"\\lx bada\n\
                  \\ps n\n\
                  \\ge mother\n\
                  \\de female parent,\n\
                  term of address\n\
                  \\xv bada na\n";
    let (tokens, log) = tokenize(input);
    let markers: Vec<&str> = tokens.iter().map(|t| t.marker.as_str()).collect();
    assert_eq!(markers, vec!["lx", "ps", "ge", "de", "xv"]);
    // The wrapped definition line folds into one field.
    assert_eq!(tokens[3].trimmed_data(), b"female parent, term of address");
    assert_eq!(tokens[3].line, 4);
    // \xv was found after the two-line definition.
    assert_eq!(tokens[4].line, 6);
    assert!(log.errors().is_empty());
}

#[test]
fn mac_classic_line_endings() {
    let (tokens, _) = tokenize(b"\\lx foo\r\\ge dog\r");
    assert_eq!(tokens.len(), 2);
    assert_eq!(tokens[1].marker, "ge");
    assert_eq!(tokens[1].line, 2);
}

#[test]
fn eol_convention_is_dominant_not_first() {
    // One stray CRLF up front, then LF throughout: LF wins the sample.
    let mut log = DiagnosticsLog::new();
    let input = b"\\a x\r\n\\b y\n\\c z\n\\d w\n\\e v\n".to_vec();
    let tokenizer = SfmTokenizer::new(input, &mut log).expect("tokenizer");
    assert_eq!(tokenizer.eol(), Eol::Lf);
}

#[test]
fn empty_and_whitespace_only_files() {
    let (tokens, log) = tokenize(b"");
    assert!(tokens.is_empty());
    assert!(log.errors().is_empty());

    let (tokens, log) = tokenize(b"  \n\t\n");
    assert!(tokens.is_empty());
    assert!(log.errors().is_empty());
}

#[test]
fn marker_without_data_followed_by_marker() {
    let (tokens, _) = tokenize(b"\\sn\n\\ge dog\n");
    assert_eq!(tokens[0].marker, "sn");
    assert!(!tokens[0].has_data());
    assert_eq!(tokens[1].marker, "ge");
}

#[test]
fn final_token_without_trailing_newline() {
    let (tokens, _) = tokenize(b"\\lx foo\n\\ge dog");
    assert_eq!(tokens.len(), 2);
    assert_eq!(tokens[1].trimmed_data(), b"dog");
}
