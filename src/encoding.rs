//! Transport-encoding helpers for stored comment text.
//!
//! Comment bodies were captured through several upstream pipelines, so the
//! same logical text can be stored raw, HTML-entity-escaped, or
//! percent-encoded. Search expands every literal into all three forms;
//! display reverses the escaping.
//!
//! Comparisons happen on [`fold`]ed text: NFC-normalized and lowercased.
//! Both sides of every comparison are folded, in memory and in `SQLite`.

use std::borrow::Cow;
use unicode_normalization::UnicodeNormalization;

/// Physical encodings a literal may take inside stored content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Raw,
    HtmlEscaped,
    PercentEncoded,
}

impl Encoding {
    pub const ALL: [Self; 3] = [Self::Raw, Self::HtmlEscaped, Self::PercentEncoded];

    /// Apply this encoding to `text`.
    #[must_use]
    pub fn apply(self, text: &str) -> Cow<'_, str> {
        match self {
            Self::Raw => Cow::Borrowed(text),
            Self::HtmlEscaped => html_escape(text),
            Self::PercentEncoded => percent_encode(text),
        }
    }
}

/// Escape `&`, `<`, `>`, `"` and `'` as HTML entities.
#[must_use]
pub fn html_escape(text: &str) -> Cow<'_, str> {
    html_escape::encode_quoted_attribute(text)
}

/// UTF-8 percent-encode everything except unreserved ASCII.
#[must_use]
pub fn percent_encode(text: &str) -> Cow<'_, str> {
    urlencoding::encode(text)
}

/// The distinct search candidates for `literal`, raw form first.
#[must_use]
pub fn variants(literal: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(Encoding::ALL.len());
    for encoding in Encoding::ALL {
        let candidate = encoding.apply(literal);
        if !out.iter().any(|existing| existing == candidate.as_ref()) {
            out.push(candidate.into_owned());
        }
    }
    out
}

/// Canonical form used for matching: NFC, then Unicode lowercase.
#[must_use]
pub fn fold(text: &str) -> String {
    text.nfc().collect::<String>().to_lowercase()
}

/// Folded search candidates for `literal`.
///
/// Variants are built from both the composed and the decomposed spelling,
/// so percent-encoded text captured from either form is found.
#[must_use]
pub fn folded_variants(literal: &str) -> Vec<String> {
    let composed: String = literal.nfc().collect();
    let decomposed: String = literal.nfd().collect();
    let mut out: Vec<String> = Vec::new();
    for form in [composed, decomposed] {
        for candidate in variants(&form) {
            let folded = fold(&candidate);
            if !out.contains(&folded) {
                out.push(folded);
            }
        }
    }
    out
}

/// Produce the human-readable form of stored content.
///
/// HTML entities are unescaped first, then percent-escapes are decoded.
/// When the percent-decoded bytes are not valid UTF-8 the unescaped text is
/// returned as is.
#[must_use]
pub fn decode_for_display(content: &str) -> String {
    let unescaped = html_escape::decode_html_entities(content);
    if !unescaped.contains('%') {
        return unescaped.into_owned();
    }
    match urlencoding::decode(&unescaped) {
        Ok(decoded) => decoded.into_owned(),
        Err(e) => {
            tracing::trace!(error = %e, "percent-decoding failed, keeping unescaped text");
            unescaped.into_owned()
        }
    }
}
