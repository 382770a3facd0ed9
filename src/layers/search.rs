use crate::layers::config::{KeywordConfig, SearchStrategy};
use crate::layers::discovery::PaperRepository;
use crate::layers::matching::{rank, ScoredPaper};
use crate::layers::{DateRange, ResearchPaper, SearchError, SearchQuery, ValidationError};

/// Name under which ad-hoc term searches run.
pub const CUSTOM_STRATEGY: &str = "custom";

/// Turns a strategy name or an ad-hoc term list into ranked papers.
///
/// Holds only borrowed collaborators and never mutates the repository, so a
/// single instance can serve any number of calls.
pub struct ExecuteKeywordSearchUseCase<'a> {
    repository: &'a dyn PaperRepository,
    config: &'a KeywordConfig,
    date_range: Option<DateRange>,
    limit: Option<usize>,
}

impl<'a> ExecuteKeywordSearchUseCase<'a> {
    pub fn new(repository: &'a dyn PaperRepository, config: &'a KeywordConfig) -> Self {
        Self {
            repository,
            config,
            date_range: None,
            limit: None,
        }
    }

    pub fn with_date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    /// Caps results below each strategy's own `max_results`.
    pub fn with_limit(mut self, limit: usize) -> Result<Self, ValidationError> {
        if limit == 0 {
            return Err(ValidationError::ZeroMaxResults);
        }
        self.limit = Some(limit);
        Ok(self)
    }

    pub async fn execute_strategy(&self, name: &str) -> Result<Vec<ResearchPaper>, SearchError> {
        Ok(into_papers(self.execute_strategy_scored(name).await?))
    }

    pub async fn execute_strategy_scored(&self, name: &str) -> Result<Vec<ScoredPaper>, SearchError> {
        let strategy = self.config.strategy(name)?;
        tracing::info!("Executing strategy '{}' against {}", name, self.repository.name());
        let limit = self
            .limit
            .map_or(strategy.max_results(), |l| l.min(strategy.max_results()));
        self.run(strategy, limit).await
    }

    pub async fn execute_custom_search(&self, terms: &[String]) -> Result<Vec<ResearchPaper>, SearchError> {
        Ok(into_papers(self.execute_custom_search_scored(terms).await?))
    }

    /// Terms become optional terms of an implicit strategy.
    pub async fn execute_custom_search_scored(&self, terms: &[String]) -> Result<Vec<ScoredPaper>, SearchError> {
        if terms.iter().all(|t| t.trim().is_empty()) {
            return Err(ValidationError::EmptyTerms.into());
        }
        let max_results = self.limit.unwrap_or(self.config.default_max_results());
        let strategy = SearchStrategy::new(CUSTOM_STRATEGY, max_results)?
            .with_description("Ad-hoc keyword search")
            .with_optional(terms);
        tracing::info!("Executing custom search {:?} against {}", terms, self.repository.name());
        self.run(&strategy, max_results).await
    }

    async fn run(&self, strategy: &SearchStrategy, limit: usize) -> Result<Vec<ScoredPaper>, SearchError> {
        let papers = self.fetch(strategy).await?;
        let range = self.date_range.unwrap_or_default();
        let papers: Vec<ResearchPaper> = papers
            .into_iter()
            .filter(|p| range.contains(p.publication_date()))
            .collect();
        tracing::debug!("{} papers fetched for strategy '{}'", papers.len(), strategy.name());
        Ok(rank(strategy, self.config.weights(), papers, limit))
    }

    async fn fetch(&self, strategy: &SearchStrategy) -> Result<Vec<ResearchPaper>, SearchError> {
        if strategy.is_unconstrained() || self.repository.enumerable() {
            return Ok(self.repository.all_papers().await?);
        }

        // Every candidate must contain all required terms, so those alone
        // make the narrowest repository query.
        let query = if strategy.required_terms().is_empty() {
            SearchQuery::new(strategy.optional_terms().iter().chain(strategy.technology_terms()))?
        } else {
            SearchQuery::new(strategy.required_terms())?.match_all(true)
        };
        let mut query = query.with_max_results(self.config.fetch_limit())?;
        if let Some(range) = self.date_range {
            query = query.with_date_range(range);
        }
        Ok(self.repository.search(&query).await?)
    }
}

fn into_papers(scored: Vec<ScoredPaper>) -> Vec<ResearchPaper> {
    scored.into_iter().map(|s| s.paper).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::matching::{contains_term, searchable_text};
    use crate::layers::sample::InMemoryPaperRepository;
    use crate::layers::RepositoryError;
    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone, Utc};

    const CONFIG: &str = r#"
search_strategies:
  tbi_focused:
    description: "TBI papers"
    required_terms: ["traumatic brain injury"]
    max_results: 3
  hrv_wearables:
    description: "HRV with wearables"
    optional_terms: ["heart rate variability", "hrv"]
    technology_terms: ["wearable"]
    max_results: 2
  everything:
    description: "No filter"
    max_results: 10
search_configuration:
  default_strategy: tbi_focused
  default_max_results: 4
"#;

    fn config() -> KeywordConfig {
        KeywordConfig::from_yaml_str(CONFIG).unwrap()
    }

    fn paper(title: &str, abstract_text: &str, year: i32, month: u32) -> ResearchPaper {
        ResearchPaper::builder(title)
            .author("Author")
            .abstract_text(abstract_text)
            .published(Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).unwrap())
            .doi(format!("10.5555/{}", title.to_lowercase().replace(' ', "-")))
            .build()
            .unwrap()
    }

    fn five_papers() -> InMemoryPaperRepository {
        InMemoryPaperRepository::with_papers([
            paper("Outcomes after traumatic brain injury", "Cohort study", 2020, 1),
            paper("HRV in athletes", "Heart rate variability after traumatic brain injury", 2022, 5),
            paper("Wearable sensors", "Continuous monitoring", 2021, 2),
            paper("Autonomic recovery", "Traumatic Brain Injury and vagal tone", 2022, 5),
            paper("Stroke rehabilitation", "Motor recovery", 2023, 7),
        ])
    }

    #[tokio::test]
    async fn test_tbi_focused_scenario() {
        let repo = five_papers();
        let config = config();
        let use_case = ExecuteKeywordSearchUseCase::new(&repo, &config);

        let papers = use_case.execute_strategy("tbi_focused").await.unwrap();
        let titles: Vec<&str> = papers.iter().map(|p| p.title()).collect();
        // Equal scores: newest first, then title order for the shared date.
        assert_eq!(
            titles,
            vec!["Autonomic recovery", "HRV in athletes", "Outcomes after traumatic brain injury"]
        );
    }

    #[tokio::test]
    async fn test_required_terms_present_and_max_results_respected() {
        let repo = InMemoryPaperRepository::sample().unwrap();
        let config = config();
        let use_case = ExecuteKeywordSearchUseCase::new(&repo, &config);

        for strategy in config.strategies() {
            let papers = use_case.execute_strategy(strategy.name()).await.unwrap();
            assert!(papers.len() <= strategy.max_results());
            for p in &papers {
                let text = searchable_text(p);
                for term in strategy.required_terms() {
                    assert!(contains_term(&text, term), "{} lacks {}", p.title(), term);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_execute_strategy_is_idempotent() {
        let repo = InMemoryPaperRepository::sample().unwrap();
        let config = config();
        let use_case = ExecuteKeywordSearchUseCase::new(&repo, &config);
        let first = use_case.execute_strategy("hrv_wearables").await.unwrap();
        let second = use_case.execute_strategy("hrv_wearables").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert!(first[0].title().starts_with("Wearable ECG"));
    }

    #[tokio::test]
    async fn test_unconstrained_strategy_lists_everything_up_to_cap() {
        let repo = five_papers();
        let config = config();
        let use_case = ExecuteKeywordSearchUseCase::new(&repo, &config);
        let papers = use_case.execute_strategy("everything").await.unwrap();
        assert_eq!(papers.len(), 5);
        assert_eq!(papers[0].title(), "Stroke rehabilitation");
    }

    #[tokio::test]
    async fn test_unknown_strategy() {
        let repo = five_papers();
        let config = config();
        let use_case = ExecuteKeywordSearchUseCase::new(&repo, &config);
        let err = use_case.execute_strategy("unknown_strategy").await.unwrap_err();
        assert!(matches!(err, SearchError::StrategyNotFound(_)));
        assert!(err.to_string().contains("unknown_strategy"));
    }

    #[tokio::test]
    async fn test_empty_corpus_is_not_an_error() {
        let repo = InMemoryPaperRepository::new();
        let config = config();
        let use_case = ExecuteKeywordSearchUseCase::new(&repo, &config);
        assert!(use_case.execute_strategy("tbi_focused").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_custom_search() {
        let repo = five_papers();
        let config = config();
        let use_case = ExecuteKeywordSearchUseCase::new(&repo, &config);

        let err = use_case.execute_custom_search(&[]).await.unwrap_err();
        assert!(matches!(err, SearchError::Validation(ValidationError::EmptyTerms)));
        let err = use_case.execute_custom_search(&["  ".to_string()]).await.unwrap_err();
        assert!(matches!(err, SearchError::Validation(ValidationError::EmptyTerms)));

        let terms = vec!["vagal tone".to_string(), "heart rate variability".to_string()];
        let papers = use_case.execute_custom_search(&terms).await.unwrap();
        let titles: Vec<&str> = papers.iter().map(|p| p.title()).collect();
        assert_eq!(titles, vec!["Autonomic recovery", "HRV in athletes"]);
    }

    #[tokio::test]
    async fn test_limit_and_date_range() {
        let repo = five_papers();
        let config = config();

        let use_case = ExecuteKeywordSearchUseCase::new(&repo, &config).with_limit(1).unwrap();
        assert_eq!(use_case.execute_strategy("tbi_focused").await.unwrap().len(), 1);

        // A limit above the strategy's cap does not raise it.
        let use_case = ExecuteKeywordSearchUseCase::new(&repo, &config).with_limit(50).unwrap();
        assert_eq!(use_case.execute_strategy("everything").await.unwrap().len(), 5);

        assert!(ExecuteKeywordSearchUseCase::new(&repo, &config).with_limit(0).is_err());

        let range = DateRange::new(None, NaiveDate::from_ymd_opt(2021, 12, 31)).unwrap();
        let use_case = ExecuteKeywordSearchUseCase::new(&repo, &config).with_date_range(range);
        let papers = use_case.execute_strategy("tbi_focused").await.unwrap();
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].title(), "Outcomes after traumatic brain injury");
    }

    #[tokio::test]
    async fn test_best_paper_ranked_beyond_fetch_limit() {
        let config = KeywordConfig::from_yaml_str(
            r#"
search_strategies:
  s:
    description: "TBI, wearables preferred"
    required_terms: ["tbi"]
    technology_terms: ["wearable"]
    max_results: 1
search_configuration:
  default_strategy: s
  fetch_limit: 3
"#,
        )
        .unwrap();
        let mut papers: Vec<ResearchPaper> = (0..10)
            .map(|i| {
                ResearchPaper::builder(format!("tbi plain {i}"))
                    .author("A")
                    .doi(format!("10.1/a{i:03}"))
                    .build()
                    .unwrap()
            })
            .collect();
        papers.push(
            ResearchPaper::builder("tbi wearable best")
                .author("A")
                .doi("10.1/zzz")
                .build()
                .unwrap(),
        );
        let repo = InMemoryPaperRepository::with_papers(papers);
        let use_case = ExecuteKeywordSearchUseCase::new(&repo, &config);

        let top = use_case.execute_strategy_scored("s").await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].paper.title(), "tbi wearable best");
        assert_eq!(top[0].score, 5);
    }

    struct DownRepository;

    #[async_trait]
    impl PaperRepository for DownRepository {
        fn name(&self) -> &'static str {
            "down"
        }

        async fn all_papers(&self) -> Result<Vec<ResearchPaper>, RepositoryError> {
            Err(RepositoryError::Malformed {
                repository: "down",
                reason: "offline".to_string(),
            })
        }

        async fn search(&self, _query: &SearchQuery) -> Result<Vec<ResearchPaper>, RepositoryError> {
            self.all_papers().await
        }

        async fn save_paper(&self, _paper: ResearchPaper) -> Result<(), RepositoryError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_repository_error_propagates() {
        let config = config();
        let use_case = ExecuteKeywordSearchUseCase::new(&DownRepository, &config);
        let err = use_case.execute_strategy("tbi_focused").await.unwrap_err();
        assert!(matches!(err, SearchError::Repository(_)));
    }
}
