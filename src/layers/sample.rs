use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::layers::discovery::PaperRepository;
use crate::layers::matching::{contains_term, normalize_term, searchable_text};
use crate::layers::{RepositoryError, ResearchPaper, SearchQuery, ValidationError};

const SAMPLE: &str = "sample repository";

/// In-memory store keyed by DOI (or title when a paper has none).
///
/// Reads return copies. The lock makes it safe to share across threads.
#[derive(Debug, Default)]
pub struct InMemoryPaperRepository {
    papers: RwLock<BTreeMap<String, ResearchPaper>>,
}

impl InMemoryPaperRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_papers(papers: impl IntoIterator<Item = ResearchPaper>) -> Self {
        let map = papers
            .into_iter()
            .map(|p| (p.identity_key(), p))
            .collect();
        Self {
            papers: RwLock::new(map),
        }
    }

    /// Preloaded HRV/TBI sample corpus.
    pub fn sample() -> Result<Self, ValidationError> {
        Ok(Self::with_papers(sample_papers()?))
    }

    pub fn len(&self) -> Result<usize, RepositoryError> {
        Ok(self.papers.read().map_err(|_| RepositoryError::Poisoned)?.len())
    }
}

#[async_trait]
impl PaperRepository for InMemoryPaperRepository {
    fn name(&self) -> &'static str {
        SAMPLE
    }

    fn enumerable(&self) -> bool {
        true
    }

    async fn all_papers(&self) -> Result<Vec<ResearchPaper>, RepositoryError> {
        let papers = self.papers.read().map_err(|_| RepositoryError::Poisoned)?;
        Ok(papers.values().cloned().collect())
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<ResearchPaper>, RepositoryError> {
        let terms: Vec<String> = query.terms().iter().map(|t| normalize_term(t)).collect();
        let range = query.date_range().unwrap_or_default();
        let papers = self.papers.read().map_err(|_| RepositoryError::Poisoned)?;

        let matches = papers.values().filter(|paper| {
            if !range.contains(paper.publication_date()) {
                return false;
            }
            let text = searchable_text(paper);
            if query.requires_all() {
                terms.iter().all(|t| contains_term(&text, t))
            } else {
                terms.iter().any(|t| contains_term(&text, t))
            }
        });

        Ok(match query.max_results() {
            Some(max) => matches.take(max).cloned().collect(),
            None => matches.cloned().collect(),
        })
    }

    async fn save_paper(&self, paper: ResearchPaper) -> Result<(), RepositoryError> {
        let mut papers = self.papers.write().map_err(|_| RepositoryError::Poisoned)?;
        let key = paper.identity_key();
        if papers.insert(key, paper).is_some() {
            tracing::debug!("Replaced existing paper in {}", SAMPLE);
        }
        Ok(())
    }
}

fn sample_papers() -> Result<Vec<ResearchPaper>, ValidationError> {
    let date = |y, m, d| Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).single();

    let specs = [
        (
            "Heart Rate Variability as a Marker of Autonomic Dysfunction after Traumatic Brain Injury",
            vec!["M. Alvarez", "J. Chen", "R. Okafor"],
            "We review time- and frequency-domain heart rate variability measures in adults with moderate to severe traumatic brain injury and their association with functional outcome.",
            date(2021, 3, 15),
            "10.5555/sample.hrv.0001",
            "Journal of Neurotrauma",
            142,
            vec!["HRV", "autonomic dysfunction", "TBI"],
        ),
        (
            "Wearable ECG Monitoring of Heart Rate Variability During Concussion Recovery",
            vec!["S. Patel", "L. Moreau"],
            "A prospective study using wearable chest-strap sensors to track HRV in collegiate athletes after sports-related concussion, a form of mild traumatic brain injury.",
            date(2022, 9, 1),
            "10.5555/sample.hrv.0002",
            "Sensors",
            58,
            vec!["wearable", "concussion", "photoplethysmography"],
        ),
        (
            "Machine Learning Prediction of Intracranial Pressure from Heart Rate Variability",
            vec!["K. Nakamura", "D. Ferreira", "A. Schmidt"],
            "Gradient boosted models trained on continuous ICU monitoring predict intracranial hypertension episodes in patients with traumatic brain injury using HRV features.",
            date(2023, 1, 20),
            "10.5555/sample.hrv.0003",
            "Critical Care Medicine",
            31,
            vec!["machine learning", "intracranial pressure", "ICU"],
        ),
        (
            "Short-Term Heart Rate Variability Norms in Healthy Adults",
            vec!["E. Johansson"],
            "Reference values for RMSSD, SDNN and LF/HF ratio from five-minute ECG recordings in 1,200 healthy adults.",
            date(2020, 6, 10),
            "10.5555/sample.hrv.0004",
            "Frontiers in Physiology",
            310,
            vec!["RMSSD", "SDNN", "normative data"],
        ),
        (
            "Biofeedback Training to Improve Vagal Tone in Post-Concussion Syndrome",
            vec!["P. Gallagher", "N. Osei"],
            "A randomized pilot trial of resonance-frequency breathing biofeedback for persistent post-concussive symptoms, with heart rate variability as the primary outcome.",
            date(2019, 11, 5),
            "10.5555/sample.hrv.0005",
            "Applied Psychophysiology and Biofeedback",
            44,
            vec!["biofeedback", "vagal tone", "post-concussion syndrome"],
        ),
        (
            "Sleep Architecture and Autonomic Balance in Military Blast Exposure",
            vec!["T. Brooks", "H. Kim"],
            "Polysomnography and nocturnal HRV in service members with blast-related mild TBI compared with matched controls.",
            date(2021, 8, 30),
            "10.5555/sample.hrv.0006",
            "Sleep",
            27,
            vec!["sleep", "blast injury", "military"],
        ),
    ];

    specs
        .into_iter()
        .map(|(title, authors, abstract_text, published, doi, venue, citations, keywords)| {
            let mut builder = ResearchPaper::builder(title)
                .authors(authors)
                .abstract_text(abstract_text)
                .doi(doi)
                .venue(venue)
                .citations(citations)
                .keywords(keywords);
            if let Some(published) = published {
                builder = builder.published(published);
            }
            builder.build()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::DateRange;
    use chrono::NaiveDate;

    fn paper(title: &str, doi: &str) -> ResearchPaper {
        ResearchPaper::builder(title).author("A").doi(doi).build().unwrap()
    }

    #[tokio::test]
    async fn test_sample_corpus_loads() {
        let repo = InMemoryPaperRepository::sample().unwrap();
        let all = repo.all_papers().await.unwrap();
        assert_eq!(all.len(), 6);
        assert!(all.iter().all(|p| p.publication_date().is_some()));
    }

    #[tokio::test]
    async fn test_save_paper_replaces_by_doi() {
        let repo = InMemoryPaperRepository::new();
        repo.save_paper(paper("First title", "10.5555/X")).await.unwrap();
        repo.save_paper(paper("Second title", "10.5555/x")).await.unwrap();
        let all = repo.all_papers().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title(), "Second title");
    }

    #[tokio::test]
    async fn test_reads_are_idempotent_snapshots() {
        let repo = InMemoryPaperRepository::sample().unwrap();
        let first = repo.all_papers().await.unwrap();
        let second = repo.all_papers().await.unwrap();
        assert_eq!(first, second);

        repo.save_paper(paper("New", "10.5555/new")).await.unwrap();
        // Earlier snapshot is unaffected by the later save.
        assert_eq!(first.len(), 6);
        assert_eq!(repo.len().unwrap(), 7);
    }

    #[tokio::test]
    async fn test_search_any_all_and_limit() {
        let repo = InMemoryPaperRepository::sample().unwrap();

        let any = SearchQuery::new(["concussion", "blast injury"]).unwrap();
        assert_eq!(repo.search(&any).await.unwrap().len(), 3);

        let all = SearchQuery::new(["concussion", "wearable"]).unwrap().match_all(true);
        let found = repo.search(&all).await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].title().starts_with("Wearable ECG"));

        let limited = SearchQuery::new(["heart rate variability"])
            .unwrap()
            .with_max_results(2)
            .unwrap();
        assert_eq!(repo.search(&limited).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_search_date_range() {
        let repo = InMemoryPaperRepository::sample().unwrap();
        let range = DateRange::new(NaiveDate::from_ymd_opt(2022, 1, 1), None).unwrap();
        let q = SearchQuery::new(["heart rate variability"]).unwrap().with_date_range(range);
        let found = repo.search(&q).await.unwrap();
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_repository() {
        let repo = InMemoryPaperRepository::new();
        assert!(repo.all_papers().await.unwrap().is_empty());
        let q = SearchQuery::new(["hrv"]).unwrap();
        assert!(repo.search(&q).await.unwrap().is_empty());
    }
}
