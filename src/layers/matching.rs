//! Strategy matching: the candidate gate and weighted relevance ranking.
//!
//! Terms match case-insensitively as whole words or phrases against the
//! paper's title, abstract and keywords. A phrase such as
//! "traumatic brain injury" must appear contiguously; runs of whitespace on
//! either side are collapsed before comparison.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;

use crate::layers::config::{ScoringWeights, SearchStrategy};
use crate::layers::ResearchPaper;

#[derive(Debug, Clone, Serialize)]
pub struct ScoredPaper {
    pub paper: ResearchPaper,
    pub score: u32,
    pub matched_terms: Vec<String>,
}

/// Lower-cases and collapses whitespace.
pub fn normalize_term(term: &str) -> String {
    term.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalized concatenation of title, abstract and keywords.
pub fn searchable_text(paper: &ResearchPaper) -> String {
    let mut text = String::with_capacity(paper.title().len() + paper.abstract_text().len() + 64);
    text.push_str(paper.title());
    text.push(' ');
    text.push_str(paper.abstract_text());
    for keyword in paper.keywords() {
        // Separator keeps adjacent keywords from forming accidental phrases.
        text.push_str(" | ");
        text.push_str(keyword);
    }
    normalize_term(&text)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric()
}

/// Whole-word containment of an already normalized `term` in normalized `text`.
pub fn contains_term(text: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }
    let needs_left = term.chars().next().is_some_and(is_word_char);
    let needs_right = term.chars().next_back().is_some_and(is_word_char);

    // Hits may overlap, so a rejected hit only advances one character.
    let mut from = 0;
    while let Some(offset) = text[from..].find(term) {
        let start = from + offset;
        let end = start + term.len();
        let left_ok = !needs_left || !text[..start].chars().next_back().is_some_and(is_word_char);
        let right_ok = !needs_right || !text[end..].chars().next().is_some_and(is_word_char);
        if left_ok && right_ok {
            return true;
        }
        from = start + text[start..].chars().next().map_or(1, char::len_utf8);
    }
    false
}

/// Gate: every required term present. A strategy without required terms
/// needs at least one optional or technology term instead; a strategy with no
/// terms at all admits everything.
pub fn is_candidate(strategy: &SearchStrategy, text: &str) -> bool {
    if strategy.is_unconstrained() {
        return true;
    }
    if !strategy.required_terms().is_empty() {
        return strategy
            .required_terms()
            .iter()
            .all(|t| contains_term(text, t));
    }
    strategy
        .optional_terms()
        .iter()
        .chain(strategy.technology_terms())
        .any(|t| contains_term(text, t))
}

/// Sum of weights of distinct matched terms. A term listed in several sets
/// counts once, at its highest weight.
pub fn score(strategy: &SearchStrategy, weights: ScoringWeights, text: &str) -> (u32, Vec<String>) {
    let mut weighted: BTreeMap<&str, u32> = BTreeMap::new();
    let sets = [
        (strategy.required_terms(), weights.required),
        (strategy.technology_terms(), weights.technology),
        (strategy.optional_terms(), weights.optional),
    ];
    for (terms, weight) in sets {
        for term in terms {
            let entry = weighted.entry(term.as_str()).or_insert(weight);
            *entry = (*entry).max(weight);
        }
    }

    let mut total = 0;
    let mut matched = Vec::new();
    for (term, weight) in weighted {
        if contains_term(text, term) {
            total += weight;
            matched.push(term.to_string());
        }
    }
    (total, matched)
}

/// Score descending, then newest first (undated last), then title.
fn rank_order(a: &ScoredPaper, b: &ScoredPaper) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| b.paper.publication_date().cmp(&a.paper.publication_date()))
        .then_with(|| a.paper.title().cmp(b.paper.title()))
        .then_with(|| a.paper.identity_key().cmp(&b.paper.identity_key()))
}

/// Filters `papers` through the strategy gate, ranks them and keeps at most `limit`.
pub fn rank(
    strategy: &SearchStrategy,
    weights: ScoringWeights,
    papers: Vec<ResearchPaper>,
    limit: usize,
) -> Vec<ScoredPaper> {
    let mut scored: Vec<ScoredPaper> = papers
        .into_iter()
        .filter_map(|paper| {
            let text = searchable_text(&paper);
            if !is_candidate(strategy, &text) {
                return None;
            }
            let (score, matched_terms) = score(strategy, weights, &text);
            tracing::debug!("Candidate: {} (score: {}, matched: {:?})", paper.title(), score, matched_terms);
            Some(ScoredPaper {
                paper,
                score,
                matched_terms,
            })
        })
        .collect();

    scored.sort_by(rank_order);
    scored.truncate(limit);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn paper(title: &str, abstract_text: &str, year: i32) -> ResearchPaper {
        ResearchPaper::builder(title)
            .author("Tester")
            .abstract_text(abstract_text)
            .published(Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn test_normalize_term() {
        assert_eq!(normalize_term("  Traumatic\tBrain \n Injury "), "traumatic brain injury");
    }

    #[test]
    fn test_contains_term_whole_word() {
        let text = normalize_term("Painful HRV-guided rehab after TBI.");
        assert!(contains_term(&text, "hrv"));
        assert!(contains_term(&text, "tbi"));
        assert!(!contains_term(&text, "ai"));
        assert!(!contains_term(&text, "rehabilitation"));
    }

    #[test]
    fn test_contains_term_phrase_not_token_set() {
        let text = normalize_term("Injury to the brain, traumatic in nature");
        assert!(!contains_term(&text, "traumatic brain injury"));
        let text = normalize_term("Mild TRAUMATIC   brain\ninjury cohort");
        assert!(contains_term(&text, "traumatic brain injury"));
    }

    #[test]
    fn test_contains_term_finds_overlapping_hit() {
        let text = normalize_term("hrvhrv hrv hrv");
        assert!(contains_term(&text, "hrv hrv"));
        assert!(!contains_term(&normalize_term("hrvhrv hrvx"), "hrv hrv"));
    }

    #[test]
    fn test_contains_term_with_symbols() {
        let text = normalize_term("Implemented in C++ with R");
        assert!(contains_term(&text, "c++"));
    }

    #[test]
    fn test_keywords_are_searchable() {
        let p = ResearchPaper::builder("Untitled study")
            .author("A")
            .keywords(["Autonomic Dysfunction"])
            .build()
            .unwrap();
        assert!(contains_term(&searchable_text(&p), "autonomic dysfunction"));
    }

    #[test]
    fn test_gate_requires_all_required_terms() {
        let strategy = SearchStrategy::new("s", 10)
            .unwrap()
            .with_required(["hrv", "concussion"]);
        assert!(is_candidate(&strategy, "hrv after concussion"));
        assert!(!is_candidate(&strategy, "hrv only"));
    }

    #[test]
    fn test_gate_without_required_needs_one_optional_or_technology() {
        let strategy = SearchStrategy::new("s", 10)
            .unwrap()
            .with_optional(["hrv"])
            .with_technology(["wearable"]);
        assert!(is_candidate(&strategy, "a wearable study"));
        assert!(is_candidate(&strategy, "hrv study"));
        assert!(!is_candidate(&strategy, "unrelated"));
    }

    #[test]
    fn test_gate_unconstrained_matches_everything() {
        let strategy = SearchStrategy::new("all", 10).unwrap();
        assert!(is_candidate(&strategy, "anything at all"));
        assert!(is_candidate(&strategy, ""));
    }

    #[test]
    fn test_score_weights_and_dedup() {
        let strategy = SearchStrategy::new("s", 10)
            .unwrap()
            .with_required(["tbi"])
            .with_technology(["wearable", "tbi"])
            .with_optional(["hrv", "sleep"]);
        let (total, matched) = score(&strategy, ScoringWeights::default(), "tbi hrv wearable");
        // tbi counts once at weight 3, wearable 2, hrv 1
        assert_eq!(total, 6);
        assert_eq!(matched, vec!["hrv", "tbi", "wearable"]);
    }

    #[test]
    fn test_rank_orders_by_score_then_date_then_title() {
        let strategy = SearchStrategy::new("s", 10)
            .unwrap()
            .with_optional(["hrv", "tbi"]);
        let papers = vec![
            paper("B older", "hrv", 2019),
            paper("Both terms", "hrv and tbi", 2015),
            paper("A newer", "hrv", 2021),
            paper("A same year", "tbi", 2019),
            paper("Nothing", "unrelated", 2023),
        ];
        let ranked = rank(&strategy, ScoringWeights::default(), papers, 10);
        let titles: Vec<&str> = ranked.iter().map(|s| s.paper.title()).collect();
        assert_eq!(titles, vec!["Both terms", "A newer", "A same year", "B older"]);
    }

    #[test]
    fn test_rank_undated_sorts_after_dated() {
        let strategy = SearchStrategy::new("s", 10).unwrap().with_optional(["hrv"]);
        let undated = ResearchPaper::builder("Aardvark hrv").author("A").build().unwrap();
        let dated = paper("Zebra hrv", "", 2000);
        let ranked = rank(&strategy, ScoringWeights::default(), vec![undated, dated], 10);
        assert_eq!(ranked[0].paper.title(), "Zebra hrv");
    }

    #[test]
    fn test_rank_truncates_and_handles_empty_corpus() {
        let strategy = SearchStrategy::new("s", 10).unwrap().with_optional(["hrv"]);
        assert!(rank(&strategy, ScoringWeights::default(), vec![], 5).is_empty());

        let papers = (0..6).map(|i| paper(&format!("hrv {i}"), "", 2000 + i)).collect();
        let ranked = rank(&strategy, ScoringWeights::default(), papers, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].paper.title(), "hrv 5");
    }
}
