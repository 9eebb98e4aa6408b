//! Candidate query construction for parameterized statements
//!
//! A statement with positional placeholders cannot be costed as-is, and the
//! parameter types are usually unknown without a schema round trip. This
//! module produces a small ordered list of fillable variants; the simulation
//! engine tries them in order and keeps the first one the planner accepts
//! with a nonzero total cost.

use once_cell::sync::Lazy;
use regex::Regex;

/// Literal filled in for every remaining placeholder of one variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderFill {
    /// UUID literal, the most common key type in the monitored schemas
    Uuid,
    /// Integer literal `1`
    Integer,
    /// Generic string literal
    Text,
    /// `NULL`, the last resort the planner accepts for any type
    Null,
}

impl PlaceholderFill {
    /// Substitution priority, best guess first
    pub const ORDERED: [PlaceholderFill; 4] = [
        PlaceholderFill::Uuid,
        PlaceholderFill::Integer,
        PlaceholderFill::Text,
        PlaceholderFill::Null,
    ];

    fn literal(&self) -> &'static str {
        match self {
            PlaceholderFill::Uuid => "'00000000-0000-0000-0000-000000000000'",
            PlaceholderFill::Integer => "1",
            PlaceholderFill::Text => "'sample'",
            PlaceholderFill::Null => "NULL",
        }
    }
}

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\d+").expect("valid regex"));
static LIMIT_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bLIMIT\s+\$\d+").expect("valid regex"));
static OFFSET_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bOFFSET\s+\$\d+").expect("valid regex"));

/// Builds the ordered candidate list for a SQL template
///
/// `LIMIT`/`OFFSET` placeholders are always resolved to small literal
/// integers first, regardless of variant, because the planner cannot cost a
/// plan with a placeholder in that position. A template without
/// placeholders yields a single candidate: itself.
pub fn candidate_queries(sql: &str) -> Vec<String> {
    let base = LIMIT_PLACEHOLDER.replace_all(sql, "LIMIT 10");
    let base = OFFSET_PLACEHOLDER.replace_all(&base, "OFFSET 0");

    if !PLACEHOLDER.is_match(&base) {
        return vec![base.into_owned()];
    }

    PlaceholderFill::ORDERED
        .iter()
        .map(|fill| PLACEHOLDER.replace_all(&base, fill.literal()).into_owned())
        .collect()
}
