//! Fuzzy name resolver
//!
//! Scores a free-text query against candidate names and classifies the
//! result as a single match, no match, or a tie between several best
//! matches. Ties are never broken by list order: the caller must ask the
//! user to choose.
//!
//! Scoring works on normalized tokens (NFKC, lowercase, punctuation
//! stripped). Each query token takes its best similarity against the
//! candidate's tokens using Damerau-Levenshtein, with prefix matches
//! counted as near-exact. The score is the mean token distance in
//! thousandths (0 is perfect), plus one point when the whole normalized
//! name differs from the query so an exact name beats a longer name that
//! merely contains every query token. Integer scores make tie detection
//! exact equality.

use unicode_normalization::UnicodeNormalization;

use crate::model::{EntityKind, Network, Organization};
use crate::resolution::ResolutionOutcome;

/// Scores above this (in thousandths) are not considered matches
pub const MATCH_THRESHOLD: u32 = 400;

/// Similarity credited when a query token is a prefix of a candidate token
const PREFIX_SIMILARITY: f64 = 0.9;

/// Minimum query token length for prefix credit
const MIN_PREFIX_LEN: usize = 2;

/// Anything that can be matched by name
pub trait Named {
    fn name(&self) -> &str;
}

impl Named for Organization {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for Network {
    fn name(&self) -> &str {
        &self.name
    }
}

impl<T: Named + ?Sized> Named for &T {
    fn name(&self) -> &str {
        (**self).name()
    }
}

/// A bare `{id, name}` candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: String,
    pub name: String,
}

impl Named for Candidate {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Normalize text for matching: NFKC fold, lowercase, punctuation to
/// spaces, whitespace collapsed.
pub fn normalize(s: &str) -> String {
    let folded: String = s.nfkc().collect();
    let stripped: String = folded
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                ' '
            }
        })
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Tokenize text into normalized words
pub fn tokenize(s: &str) -> Vec<String> {
    normalize(s).split_whitespace().map(str::to_string).collect()
}

fn token_similarity(query: &str, candidate: &str) -> f64 {
    if query == candidate {
        return 1.0;
    }
    let edit = strsim::normalized_damerau_levenshtein(query, candidate);
    if query.chars().count() >= MIN_PREFIX_LEN && candidate.starts_with(query) {
        edit.max(PREFIX_SIMILARITY)
    } else {
        edit
    }
}

/// Score `name` against an already tokenized query.
///
/// Returns `None` when the name does not match closely enough.
fn score_tokens(query_tokens: &[String], query_norm: &str, name: &str) -> Option<u32> {
    let name_tokens = tokenize(name);
    if query_tokens.is_empty() || name_tokens.is_empty() {
        return None;
    }

    let total: f64 = query_tokens
        .iter()
        .map(|q| {
            name_tokens
                .iter()
                .map(|c| token_similarity(q, c))
                .fold(0.0, f64::max)
        })
        .sum();
    let mean = total / query_tokens.len() as f64;
    let distance = ((1.0 - mean) * 1000.0).round() as u32;

    if distance > MATCH_THRESHOLD {
        return None;
    }

    let exact = name_tokens.join(" ") == query_norm;
    Some(if exact { distance } else { distance + 1 })
}

/// Score a single name against a query. Lower is better, `None` is no match.
pub fn score(query: &str, name: &str) -> Option<u32> {
    let query_tokens = tokenize(query);
    let query_norm = query_tokens.join(" ");
    score_tokens(&query_tokens, &query_norm, name)
}

/// Resolve `query` against `candidates`.
///
/// - nothing scores: `NotFound(kind)`
/// - exactly one candidate holds the best score: `Resolved(candidate)`
/// - several candidates share the best score: `Ambiguous(kind, names)`,
///   names sorted alphabetically
pub fn resolve<T: Named>(
    query: &str,
    candidates: impl IntoIterator<Item = T>,
    kind: EntityKind,
) -> ResolutionOutcome<T> {
    let query_tokens = tokenize(query);
    let query_norm = query_tokens.join(" ");

    let mut best: Option<u32> = None;
    let mut tied: Vec<T> = Vec::new();

    for candidate in candidates {
        let Some(s) = score_tokens(&query_tokens, &query_norm, candidate.name()) else {
            continue;
        };
        match best {
            Some(b) if s > b => {}
            Some(b) if s == b => tied.push(candidate),
            _ => {
                best = Some(s);
                tied.clear();
                tied.push(candidate);
            }
        }
    }

    match tied.len() {
        0 => ResolutionOutcome::NotFound(kind),
        1 => match tied.pop() {
            Some(only) => ResolutionOutcome::Resolved(only),
            None => ResolutionOutcome::NotFound(kind),
        },
        _ => {
            let mut names: Vec<String> = tied.iter().map(|c| c.name().to_string()).collect();
            sort_names(&mut names);
            ResolutionOutcome::Ambiguous(kind, names)
        }
    }
}

/// Case-insensitive alphabetical order, raw string as tie-break
pub fn sort_names(names: &mut [String]) {
    names.sort_by(|a, b| {
        a.to_lowercase()
            .cmp(&b.to_lowercase())
            .then_with(|| a.cmp(b))
    });
}
