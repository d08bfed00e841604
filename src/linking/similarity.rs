//! String similarity between vocabulary terms and concept phrases

use crate::lexicon::{ConceptLexicon, Phrase};
use std::cmp::Ordering;

/// Comparable surface form of a vocabulary term: joiners become spaces,
/// case is folded.
pub fn surface_form(term: &str) -> String {
    term.replace('_', " ").to_lowercase()
}

/// Normalized Levenshtein similarity in `[0, 1]`.
pub fn string_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

/// Upper bound on [`string_similarity`] from character counts alone.
fn length_bound(a_len: usize, b_len: usize) -> f64 {
    let max = a_len.max(b_len);
    if max == 0 {
        return 1.0;
    }
    1.0 - a_len.abs_diff(b_len) as f64 / max as f64
}

/// Preference between two equally scored concepts: fewer tokens, then
/// lexical order.
fn prefer(a: &Phrase, b: &Phrase) -> Ordering {
    a.token_count()
        .cmp(&b.token_count())
        .then_with(|| a.text().cmp(b.text()))
}

/// The best-scoring concept for `query` (a surface form), if it scores at
/// least `min_score`.
pub fn best_concept<'a>(
    query: &str,
    lexicon: &'a ConceptLexicon,
    min_score: f64,
) -> Option<(&'a Phrase, f64)> {
    let query_len = query.chars().count();
    let mut best: Option<(&Phrase, f64)> = None;
    for phrase in lexicon.iter() {
        let bound = length_bound(query_len, phrase.char_len());
        let floor = best.map_or(min_score, |(_, s)| s.max(min_score));
        if bound < floor {
            continue;
        }
        let score = string_similarity(query, phrase.text());
        if score < min_score {
            continue;
        }
        best = match best {
            None => Some((phrase, score)),
            Some((current, current_score)) => {
                if score > current_score
                    || (score == current_score && prefer(phrase, current) == Ordering::Less)
                {
                    Some((phrase, score))
                } else {
                    Some((current, current_score))
                }
            }
        };
    }
    best
}
