//! Morpheme-type inference for lexeme and allomorph fields.
//!
//! Field data in lexical databases conventionally marks affix and clitic
//! boundaries with punctuation on the citation form: `-sub` is a suffix,
//! `pre-` a prefix, `-in-` an infix, `~fix~` a circumfix, `=clit` / `clit=`
//! a clitic, `*bound` a bound stem. The converter strips those markers and
//! reports the inferred type as attributes on the emitted field element.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MorphType {
    Stem,
    BoundStem,
    Prefix,
    Suffix,
    Infix,
    Circumfix,
    Clitic,
}

impl MorphType {
    pub fn as_str(self) -> &'static str {
        match self {
            MorphType::Stem => "stem",
            MorphType::BoundStem => "bound-stem",
            MorphType::Prefix => "prefix",
            MorphType::Suffix => "suffix",
            MorphType::Infix => "infix",
            MorphType::Circumfix => "circumfix",
            MorphType::Clitic => "clitic",
        }
    }

    /// The allomorph class the type belongs to.
    pub fn class(self) -> &'static str {
        match self {
            MorphType::Stem | MorphType::BoundStem => "stem",
            MorphType::Prefix | MorphType::Suffix | MorphType::Infix | MorphType::Circumfix => {
                "affix"
            }
            MorphType::Clitic => "clitic",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MorphAnalysis {
    pub morph_type: MorphType,
    /// The citation form with boundary markers stripped.
    pub form: String,
}

/// Infer the morpheme type of a citation form from its boundary markers.
pub fn analyze(text: &str) -> MorphAnalysis {
    let text = text.trim();
    let strip = |t: &str, lead: bool, trail: bool| -> String {
        let mut s = t;
        if lead {
            s = &s[1..];
        }
        if trail {
            s = &s[..s.len() - 1];
        }
        s.to_string()
    };

    let (morph_type, form) = if text.len() > 1 && text.starts_with('-') && text.ends_with('-') {
        (MorphType::Infix, strip(text, true, true))
    } else if text.len() > 1 && text.starts_with('~') && text.ends_with('~') {
        (MorphType::Circumfix, strip(text, true, true))
    } else if text.starts_with('-') {
        (MorphType::Suffix, strip(text, true, false))
    } else if text.ends_with('-') {
        (MorphType::Prefix, strip(text, false, true))
    } else if text.starts_with('=') {
        (MorphType::Clitic, strip(text, true, false))
    } else if text.ends_with('=') {
        (MorphType::Clitic, strip(text, false, true))
    } else if text.starts_with('*') {
        (MorphType::BoundStem, strip(text, true, false))
    } else {
        (MorphType::Stem, text.to_string())
    };

    MorphAnalysis { morph_type, form }
}
