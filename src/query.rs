//! Query compilation.
//!
//! A raw content query is split on whitespace into words. Each word becomes
//! one [`Term`]:
//!
//! - `-word` excludes comments containing `word`
//! - `a|b|c` requires any one of the alternatives
//! - anything else requires the literal
//!
//! Terms are ANDed together, as is the optional author filter. Every literal
//! is expanded into its raw, HTML-escaped and percent-encoded forms (see
//! [`crate::encoding`]); a literal is present when any form occurs in the
//! content. Matching compares [`encoding::fold`]ed text, so it ignores
//! Unicode case and composed/decomposed spelling.
//!
//! The parsed [`Query`] compiles into either an in-memory predicate
//! ([`CompiledQuery`]) or a parameterized SQL filter ([`SqlFilter`]). The SQL
//! form calls [`FOLD_FUNCTION`], which the store registers on its connection.

use std::fmt;

use aho_corasick::AhoCorasick;
use unicode_normalization::UnicodeNormalization;

use crate::encoding::{self, fold};
use crate::model::Comment;

/// Name of the SQL scalar function applying [`encoding::fold`].
pub const FOLD_FUNCTION: &str = "kaso_fold";

/// One whitespace-separated word of a content query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    /// The literal must appear.
    Include(String),
    /// The literal must not appear in any encoding.
    Exclude(String),
    /// At least one alternative must appear. Empty alternatives match
    /// everything, which makes `a|` behave like no filter at all.
    AnyOf(Vec<String>),
}

impl Term {
    /// Classify a single word.
    #[must_use]
    pub fn classify(word: &str) -> Self {
        if let Some(rest) = word.strip_prefix('-') {
            if !rest.is_empty() {
                return Self::Exclude(normalize(rest));
            }
        }
        if word.contains('|') {
            return Self::AnyOf(word.split('|').map(normalize).collect());
        }
        Self::Include(normalize(word))
    }
}

fn normalize(literal: &str) -> String {
    literal.nfc().collect()
}

/// A parsed search request: author filter plus content terms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub author: Option<String>,
    pub terms: Vec<Term>,
}

impl Query {
    /// Parse the two free-text inputs. Blank inputs impose no filter.
    #[must_use]
    pub fn parse(author: Option<&str>, text: Option<&str>) -> Self {
        let author = author
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(normalize);
        let terms = text
            .map(|t| t.split_whitespace().map(Term::classify).collect())
            .unwrap_or_default();
        Self { author, terms }
    }

    /// True when the query accepts every comment.
    #[must_use]
    pub fn is_unfiltered(&self) -> bool {
        self.author.is_none() && self.terms.is_empty()
    }

    /// Compile into an in-memory predicate.
    #[must_use]
    pub fn compile(&self) -> CompiledQuery {
        CompiledQuery {
            author: self.author.as_deref().map(fold),
            terms: self
                .terms
                .iter()
                .map(|term| match term {
                    Term::Include(lit) => CompiledTerm::Include(LiteralMatcher::new(lit)),
                    Term::Exclude(lit) => CompiledTerm::Exclude(LiteralMatcher::new(lit)),
                    Term::AnyOf(alts) => CompiledTerm::AnyOf(
                        alts.iter().map(|alt| LiteralMatcher::new(alt)).collect(),
                    ),
                })
                .collect(),
        }
    }

    /// Compile into a `WHERE` clause over the `comments` table.
    ///
    /// User text only ever travels as bound parameters.
    #[must_use]
    pub fn to_sql(&self) -> SqlFilter {
        let mut clauses = Vec::new();
        let mut params = Vec::new();

        if let Some(author) = &self.author {
            clauses.push(contains_clause("user"));
            params.push(fold(author));
        }

        for term in &self.terms {
            match term {
                Term::Include(lit) => clauses.push(literal_clause(lit, &mut params)),
                Term::Exclude(lit) => {
                    clauses.push(format!("NOT {}", literal_clause(lit, &mut params)));
                }
                Term::AnyOf(alts) => {
                    let any: Vec<String> = alts
                        .iter()
                        .map(|alt| literal_clause(alt, &mut params))
                        .collect();
                    clauses.push(format!("({})", any.join(" OR ")));
                }
            }
        }

        let clause = if clauses.is_empty() {
            "1 = 1".to_string()
        } else {
            clauses.join(" AND ")
        };
        SqlFilter { clause, params }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(author) = &self.author {
            parts.push(format!("user~{author}"));
        }
        for term in &self.terms {
            parts.push(match term {
                Term::Include(lit) => format!("+{lit}"),
                Term::Exclude(lit) => format!("-{lit}"),
                Term::AnyOf(alts) => format!("({})", alts.join("|")),
            });
        }
        if parts.is_empty() {
            f.write_str("*")
        } else {
            f.write_str(&parts.join(" "))
        }
    }
}

fn contains_clause(column: &str) -> String {
    format!("instr({FOLD_FUNCTION}({column}), ?) > 0")
}

fn literal_clause(literal: &str, params: &mut Vec<String>) -> String {
    let variants = encoding::folded_variants(literal);
    let ors: Vec<String> = variants.iter().map(|_| contains_clause("content")).collect();
    params.extend(variants);
    format!("({})", ors.join(" OR "))
}

/// A `WHERE` clause and its positional parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlFilter {
    pub clause: String,
    pub params: Vec<String>,
}

/// Case-insensitive multi-variant substring matcher for one literal.
#[derive(Debug, Clone)]
struct LiteralMatcher {
    patterns: Vec<String>,
    automaton: Option<AhoCorasick>,
    matches_all: bool,
}

impl LiteralMatcher {
    fn new(literal: &str) -> Self {
        let patterns = encoding::folded_variants(literal);
        Self {
            matches_all: literal.is_empty(),
            automaton: AhoCorasick::new(&patterns).ok(),
            patterns,
        }
    }

    /// `haystack` must already be folded.
    fn is_match(&self, haystack: &str) -> bool {
        if self.matches_all {
            return true;
        }
        self.automaton.as_ref().map_or_else(
            || self.patterns.iter().any(|p| haystack.contains(p.as_str())),
            |ac| ac.is_match(haystack),
        )
    }
}

#[derive(Debug, Clone)]
enum CompiledTerm {
    Include(LiteralMatcher),
    Exclude(LiteralMatcher),
    AnyOf(Vec<LiteralMatcher>),
}

impl CompiledTerm {
    fn is_match(&self, content: &str) -> bool {
        match self {
            Self::Include(m) => m.is_match(content),
            Self::Exclude(m) => !m.is_match(content),
            Self::AnyOf(ms) => ms.iter().any(|m| m.is_match(content)),
        }
    }
}

/// In-memory predicate compiled from a [`Query`].
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    author: Option<String>,
    terms: Vec<CompiledTerm>,
}

impl CompiledQuery {
    /// Evaluate the predicate against one comment.
    #[must_use]
    pub fn matches(&self, comment: &Comment) -> bool {
        if let Some(author) = &self.author {
            if !fold(&comment.user).contains(author.as_str()) {
                return false;
            }
        }
        if self.terms.is_empty() {
            return true;
        }
        let content = fold(&comment.content);
        self.terms.iter().all(|term| term.is_match(&content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(id: i64, user: &str, content: &str) -> Comment {
        Comment::original(id, user, "2024-01-01T00:00:00Z", content)
    }

    fn matches(text: &str, content: &str) -> bool {
        Query::parse(None, Some(text))
            .compile()
            .matches(&comment(1, "someone", content))
    }

    #[test]
    fn classify_words() {
        assert_eq!(Term::classify("猫"), Term::Include("猫".into()));
        assert_eq!(Term::classify("-宣伝"), Term::Exclude("宣伝".into()));
        assert_eq!(
            Term::classify("バグ|不具合"),
            Term::AnyOf(vec!["バグ".into(), "不具合".into()])
        );
        // A lone dash has nothing to exclude and is searched literally.
        assert_eq!(Term::classify("-"), Term::Include("-".into()));
        // Exclusion wins over alternation.
        assert_eq!(Term::classify("-a|b"), Term::Exclude("a|b".into()));
    }

    #[test]
    fn parse_splits_on_whitespace_runs() {
        let q = Query::parse(Some("  "), Some("  scratch \t\n -宣伝  "));
        assert_eq!(q.author, None);
        assert_eq!(
            q.terms,
            vec![Term::Include("scratch".into()), Term::Exclude("宣伝".into())]
        );
        assert!(Query::parse(None, Some("   ")).is_unfiltered());
        assert!(Query::parse(None, None).is_unfiltered());
    }

    #[test]
    fn literals_are_nfc_normalized() {
        // "が" written as "か" + combining voiced mark.
        let q = Query::parse(None, Some("\u{304B}\u{3099}"));
        assert_eq!(q.terms, vec![Term::Include("\u{304C}".into())]);
    }

    #[test]
    fn inclusion_matches_every_encoding() {
        assert!(matches("猫", "scratchで猫を"));
        assert!(matches("猫", "scratch%E7%8C%ABdata"));
        assert!(matches("<b>", "bold &lt;b&gt; tag"));
        assert!(matches("<b>", "bold %3Cb%3E tag"));
        assert!(!matches("猫", "犬しかいない"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert!(matches("Scratch", "SCRATCH rocks"));
        assert!(matches("猫", "%e7%8c%ab lowercase escapes"));
    }

    #[test]
    fn exclusion_requires_all_variants_absent() {
        assert!(matches("scratch -宣伝", "scratchで猫を"));
        assert!(!matches("scratch -宣伝", "scratch 宣伝です"));
        assert!(!matches("scratch -宣伝", "scratch %E5%AE%A3%E4%BC%9D"));
    }

    #[test]
    fn alternation_matches_any() {
        assert!(matches("バグ|不具合", "バグを見つけた"));
        assert!(matches("バグ|不具合", "不具合がある"));
        assert!(!matches("バグ|不具合", "問題ない"));
    }

    #[test]
    fn words_are_conjunctive() {
        assert!(matches("a b", "b then a"));
        assert!(!matches("a b", "only a"));
    }

    #[test]
    fn empty_alternative_matches_everything() {
        assert!(matches("バグ|", "問題ない"));
        assert!(matches("|", "anything"));
    }

    #[test]
    fn author_filter_is_case_insensitive_substring() {
        let q = Query::parse(Some("Neko"), Some("")).compile();
        assert!(q.matches(&comment(1, "xxnekoxx", "hi")));
        assert!(!q.matches(&comment(2, "inu", "hi")));
    }

    #[test]
    fn sql_uses_placeholders_only() {
        let q = Query::parse(Some("A_b"), Some("100% -宣伝 x|y"));
        let sql = q.to_sql();
        assert!(!sql.clause.contains("宣伝"));
        assert!(!sql.clause.contains("100"));
        assert_eq!(sql.clause.matches('?').count(), sql.params.len());
        assert_eq!(sql.params[0], "a_b");
        assert!(sql.params.contains(&"100%".to_string()));
        assert!(sql.params.contains(&"%e5%ae%a3%e4%bc%9d".to_string()));
        assert!(sql.clause.contains("NOT ("));
        assert!(sql.clause.contains("instr(kaso_fold(content), ?) > 0"));
    }

    #[test]
    fn sql_for_unfiltered_query() {
        let sql = Query::default().to_sql();
        assert_eq!(sql.clause, "1 = 1");
        assert!(sql.params.is_empty());
    }

    #[test]
    fn decomposed_content_matches_decomposed_query() {
        let nfd = "\u{304B}\u{3099}";
        let content = format!("x{nfd}y");
        assert!(matches(nfd, &content));
        assert!(matches("\u{304C}", &content));
        assert!(matches(nfd, "x\u{304C}y"));
        assert!(!matches(&format!("-{nfd}"), &content));
    }

    #[test]
    fn decomposed_percent_encoding_matches() {
        // "が" as "か" + U+3099, percent-encoded.
        assert!(matches("\u{304C}", "%E3%81%8B%E3%82%99"));
        assert!(matches("\u{304B}\u{3099}", "%E3%81%8C"));
    }

    #[test]
    fn full_width_latin_is_case_insensitive() {
        assert!(matches("ｓｃｒａｔｃｈ", "ＳＣＲＡＴＣＨ最高"));
        let q = Query::parse(Some("ＮＥＫＯ"), None).compile();
        assert!(q.matches(&comment(1, "ｎｅｋｏ", "hi")));
    }

    #[test]
    fn display_describes_terms() {
        let q = Query::parse(Some("ann"), Some("猫 -犬 a|b"));
        assert_eq!(q.to_string(), "user~ann +猫 -犬 (a|b)");
        assert_eq!(Query::default().to_string(), "*");
    }
}
