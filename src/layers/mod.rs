use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeSet;

pub use error::{
    ConfigError, DownloadServiceError, FetchError, RepositoryError, SearchError,
    StrategyNotFoundError, ValidationError,
};

/// A paper as loaded or fetched by a repository. Immutable once built.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ResearchPaper {
    title: String,
    authors: Vec<String>,
    abstract_text: String,
    publication_date: Option<DateTime<Utc>>,
    doi: Option<String>,
    venue: String,
    citation_count: u32,
    keywords: BTreeSet<String>,
    arxiv_id: Option<String>,
    pdf_url: Option<String>,
}

impl ResearchPaper {
    pub fn builder(title: impl Into<String>) -> ResearchPaperBuilder {
        ResearchPaperBuilder {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn authors(&self) -> &[String] {
        &self.authors
    }

    pub fn abstract_text(&self) -> &str {
        &self.abstract_text
    }

    pub fn publication_date(&self) -> Option<DateTime<Utc>> {
        self.publication_date
    }

    pub fn doi(&self) -> Option<&str> {
        self.doi.as_deref()
    }

    pub fn venue(&self) -> &str {
        &self.venue
    }

    pub fn citation_count(&self) -> u32 {
        self.citation_count
    }

    /// Lower-cased keyword set.
    pub fn keywords(&self) -> &BTreeSet<String> {
        &self.keywords
    }

    pub fn arxiv_id(&self) -> Option<&str> {
        self.arxiv_id.as_deref()
    }

    pub fn pdf_url(&self) -> Option<&str> {
        self.pdf_url.as_deref()
    }

    /// Storage key: the DOI (case-folded) when present, else the title.
    pub fn identity_key(&self) -> String {
        match &self.doi {
            Some(doi) => doi.to_lowercase(),
            None => format!("title:{}", self.title.to_lowercase()),
        }
    }
}

#[derive(Debug, Default)]
pub struct ResearchPaperBuilder {
    title: String,
    authors: Vec<String>,
    abstract_text: String,
    publication_date: Option<DateTime<Utc>>,
    doi: Option<String>,
    venue: String,
    citation_count: u32,
    keywords: BTreeSet<String>,
    arxiv_id: Option<String>,
    pdf_url: Option<String>,
}

impl ResearchPaperBuilder {
    pub fn author(mut self, name: impl Into<String>) -> Self {
        self.authors.push(name.into());
        self
    }

    pub fn authors<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authors.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn abstract_text(mut self, text: impl Into<String>) -> Self {
        self.abstract_text = text.into();
        self
    }

    pub fn published(mut self, date: DateTime<Utc>) -> Self {
        self.publication_date = Some(date);
        self
    }

    pub fn doi(mut self, doi: impl Into<String>) -> Self {
        self.doi = Some(doi.into());
        self
    }

    pub fn venue(mut self, venue: impl Into<String>) -> Self {
        self.venue = venue.into();
        self
    }

    pub fn citations(mut self, count: u32) -> Self {
        self.citation_count = count;
        self
    }

    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.keywords.extend(
            keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty()),
        );
        self
    }

    pub fn arxiv_id(mut self, id: impl Into<String>) -> Self {
        self.arxiv_id = Some(id.into());
        self
    }

    pub fn pdf_url(mut self, url: impl Into<String>) -> Self {
        self.pdf_url = Some(url.into());
        self
    }

    pub fn build(self) -> Result<ResearchPaper, ValidationError> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        let authors: Vec<String> = self
            .authors
            .into_iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
        if authors.is_empty() {
            return Err(ValidationError::NoAuthors(title));
        }

        Ok(ResearchPaper {
            title,
            authors,
            abstract_text: self.abstract_text.trim().to_string(),
            publication_date: self.publication_date,
            doi: self.doi.map(|d| d.trim().to_string()).filter(|d| !d.is_empty()),
            venue: self.venue.trim().to_string(),
            citation_count: self.citation_count,
            keywords: self.keywords,
            arxiv_id: self.arxiv_id.filter(|id| !id.is_empty()),
            pdf_url: self.pdf_url.filter(|u| !u.is_empty()),
        })
    }
}

/// Inclusive publication date window. Either bound may be open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateRange {
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self, ValidationError> {
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(ValidationError::InvertedDateRange { start, end });
            }
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> Option<NaiveDate> {
        self.start
    }

    pub fn end(&self) -> Option<NaiveDate> {
        self.end
    }

    /// Undated papers never fall inside a bounded range.
    pub fn contains(&self, date: Option<DateTime<Utc>>) -> bool {
        if self.start.is_none() && self.end.is_none() {
            return true;
        }
        let Some(day) = date.map(|d| d.date_naive()) else {
            return false;
        };
        self.start.map_or(true, |s| day >= s) && self.end.map_or(true, |e| day <= e)
    }
}

/// Free-text query handed to a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    terms: Vec<String>,
    match_all: bool,
    max_results: Option<usize>,
    date_range: Option<DateRange>,
}

impl SearchQuery {
    pub fn new<I, S>(terms: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let terms: Vec<String> = terms
            .into_iter()
            .map(|t| t.as_ref().trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if terms.is_empty() {
            return Err(ValidationError::EmptyTerms);
        }
        Ok(Self {
            terms,
            match_all: false,
            max_results: None,
            date_range: None,
        })
    }

    /// Require every term instead of any one of them.
    pub fn match_all(mut self, yes: bool) -> Self {
        self.match_all = yes;
        self
    }

    pub fn with_max_results(mut self, max: usize) -> Result<Self, ValidationError> {
        if max == 0 {
            return Err(ValidationError::ZeroMaxResults);
        }
        self.max_results = Some(max);
        Ok(self)
    }

    pub fn with_date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn requires_all(&self) -> bool {
        self.match_all
    }

    pub fn max_results(&self) -> Option<usize> {
        self.max_results
    }

    pub fn date_range(&self) -> Option<DateRange> {
        self.date_range
    }
}

pub mod config;
pub mod discovery;
pub mod download;
pub mod error;
pub mod matching;
pub mod resolution;
pub mod sample;
pub mod search;
