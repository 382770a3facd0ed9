use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::time::Duration;

use crate::layers::{RepositoryError, ResearchPaper, SearchQuery};

/// Source of candidate papers.
///
/// Reads must be idempotent while nothing is saved, and `save_paper` replaces
/// an existing paper with the same identity instead of adding a duplicate.
#[async_trait]
pub trait PaperRepository: Send + Sync {
    fn name(&self) -> &'static str;

    /// Every paper the repository can enumerate.
    async fn all_papers(&self) -> Result<Vec<ResearchPaper>, RepositoryError>;

    /// Whether `all_papers` is cheap and complete. Ranking then sees the
    /// whole store instead of a capped `search` page.
    fn enumerable(&self) -> bool {
        false
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<ResearchPaper>, RepositoryError>;

    async fn save_paper(&self, paper: ResearchPaper) -> Result<(), RepositoryError>;
}

use governor::clock::DefaultClock;
use governor::state::{direct::NotKeyed, InMemoryState};
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use std::sync::Arc;

pub const ARXIV_API_URL: &str = "http://export.arxiv.org/api/query";
const ARXIV: &str = "arXiv";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ArxivRepository {
    client: Client,
    api_url: String,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl ArxivRepository {
    pub fn new(api_url: impl Into<String>) -> Result<Self, RepositoryError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| RepositoryError::Unreachable {
                repository: ARXIV,
                source,
            })?;
        // arXiv asks clients to stay around one request every three seconds.
        let quota = Quota::per_minute(nonzero!(20u32));

        Ok(Self {
            client,
            api_url: api_url.into(),
            limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    fn build_search_query(query: &SearchQuery) -> String {
        let joiner = if query.requires_all() { " AND " } else { " OR " };
        let terms: Vec<String> = query
            .terms()
            .iter()
            .map(|t| format!("all:\"{}\"", t.replace('"', "")))
            .collect();
        let mut search = if terms.len() > 1 {
            format!("({})", terms.join(joiner))
        } else {
            terms.join(joiner)
        };

        if let Some(range) = query.date_range() {
            if range.start().is_some() || range.end().is_some() {
                let start = range
                    .start()
                    .map(|d| format!("{}0000", d.format("%Y%m%d")))
                    .unwrap_or_else(|| "000001010000".to_string());
                let end = range
                    .end()
                    .map(|d| format!("{}2359", d.format("%Y%m%d")))
                    .unwrap_or_else(|| "999912312359".to_string());
                search.push_str(&format!(" AND submittedDate:[{} TO {}]", start, end));
            }
        }
        search
    }
}

#[async_trait]
impl PaperRepository for ArxivRepository {
    fn name(&self) -> &'static str {
        ARXIV
    }

    async fn all_papers(&self) -> Result<Vec<ResearchPaper>, RepositoryError> {
        Err(RepositoryError::Unsupported {
            repository: ARXIV,
            operation: "listing every paper",
        })
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<ResearchPaper>, RepositoryError> {
        self.limiter.until_ready().await;

        let search = Self::build_search_query(query);
        let max_results = query.max_results().unwrap_or(100);
        let url = format!(
            "{}?search_query={}&start=0&max_results={}&sortBy=relevance&sortOrder=descending",
            self.api_url,
            urlencoding::encode(&search),
            max_results
        );
        tracing::info!("Querying arXiv: {}", url);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| RepositoryError::Unreachable {
                repository: ARXIV,
                source,
            })?;
        if !resp.status().is_success() {
            return Err(RepositoryError::Status {
                repository: ARXIV,
                status: resp.status(),
            });
        }
        let text = resp.text().await.map_err(|source| RepositoryError::Unreachable {
            repository: ARXIV,
            source,
        })?;

        let papers = parse_feed(&text)?;
        tracing::info!("arXiv returned {} papers", papers.len());
        Ok(papers)
    }

    async fn save_paper(&self, _paper: ResearchPaper) -> Result<(), RepositoryError> {
        Err(RepositoryError::ReadOnly(ARXIV))
    }
}

use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

#[derive(Default)]
struct EntryFields {
    id: String,
    title: String,
    summary: String,
    published: String,
    doi: String,
    journal_ref: String,
    authors: Vec<String>,
    categories: Vec<String>,
    pdf_url: Option<String>,
}

#[derive(PartialEq, Clone, Copy)]
enum TagState {
    None,
    Title,
    Summary,
    Published,
    AuthorName,
    Id,
    Doi,
    JournalRef,
}

fn attr(e: &BytesStart, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name)
        .map(|a| String::from_utf8_lossy(&a.value).to_string())
}

fn resolve_entity(name: &str) -> Option<String> {
    if let Some(hex) = name.strip_prefix("#x") {
        u32::from_str_radix(hex, 16).ok().and_then(char::from_u32).map(String::from)
    } else if let Some(dec) = name.strip_prefix('#') {
        dec.parse().ok().and_then(char::from_u32).map(String::from)
    } else {
        resolve_predefined_entity(name).map(str::to_string)
    }
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parses an arXiv Atom feed. Entries without a title or authors are skipped.
pub fn parse_feed(text: &str) -> Result<Vec<ResearchPaper>, RepositoryError> {
    let mut reader = Reader::from_str(text);

    let mut papers = Vec::new();
    let mut buf = Vec::new();
    let mut in_entry = false;
    let mut entry = EntryFields::default();
    let mut state = TagState::None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"entry" => {
                    in_entry = true;
                    entry = EntryFields::default();
                }
                b"title" if in_entry => state = TagState::Title,
                b"summary" if in_entry => state = TagState::Summary,
                b"published" if in_entry => state = TagState::Published,
                b"name" if in_entry => {
                    state = TagState::AuthorName;
                    entry.authors.push(String::new());
                }
                b"id" if in_entry => state = TagState::Id,
                b"arxiv:doi" if in_entry => state = TagState::Doi,
                b"arxiv:journal_ref" if in_entry => state = TagState::JournalRef,
                _ => state = TagState::None,
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"link" if in_entry => {
                    let title = attr(&e, b"title").unwrap_or_default();
                    let kind = attr(&e, b"type").unwrap_or_default();
                    if title == "pdf" || kind == "application/pdf" {
                        entry.pdf_url = attr(&e, b"href");
                    }
                }
                b"category" if in_entry => {
                    if let Some(term) = attr(&e, b"term") {
                        entry.categories.push(term);
                    }
                }
                _ => {}
            },
            Ok(Event::Text(e)) if in_entry => {
                let txt = String::from_utf8_lossy(&e.into_inner()).into_owned();
                push_text(&mut entry, state, &txt);
            }
            Ok(Event::GeneralRef(e)) if in_entry => {
                let name = String::from_utf8_lossy(&e).into_owned();
                if let Some(resolved) = resolve_entity(&name) {
                    push_text(&mut entry, state, &resolved);
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"entry" => {
                    in_entry = false;
                    if entry.id.contains("/api/errors") {
                        return Err(RepositoryError::Malformed {
                            repository: ARXIV,
                            reason: collapse(&entry.summary),
                        });
                    }
                    if let Some(paper) = finish_entry(std::mem::take(&mut entry)) {
                        papers.push(paper);
                    }
                    state = TagState::None;
                }
                _ => state = TagState::None,
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(RepositoryError::Malformed {
                    repository: ARXIV,
                    reason: format!("XML error at position {}: {}", reader.buffer_position(), e),
                });
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(papers)
}

fn push_text(entry: &mut EntryFields, state: TagState, txt: &str) {
    match state {
        TagState::Title => entry.title.push_str(txt),
        TagState::Summary => entry.summary.push_str(txt),
        TagState::Published => entry.published.push_str(txt),
        TagState::Id => entry.id.push_str(txt),
        TagState::Doi => entry.doi.push_str(txt),
        TagState::JournalRef => entry.journal_ref.push_str(txt),
        TagState::AuthorName => {
            if let Some(last) = entry.authors.last_mut() {
                last.push_str(txt);
            }
        }
        TagState::None => {}
    }
}

fn finish_entry(entry: EntryFields) -> Option<ResearchPaper> {
    let id = entry.id.trim();
    let arxiv_id = id.rsplit("/abs/").next().unwrap_or(id).to_string();
    let venue = match collapse(&entry.journal_ref) {
        j if j.is_empty() => ARXIV.to_string(),
        j => j,
    };

    let mut builder = ResearchPaper::builder(collapse(&entry.title))
        .authors(entry.authors.iter().map(|a| collapse(a)))
        .abstract_text(collapse(&entry.summary))
        .venue(venue)
        .keywords(&entry.categories)
        .arxiv_id(arxiv_id);

    match DateTime::parse_from_rfc3339(entry.published.trim()) {
        Ok(date) => builder = builder.published(date.with_timezone(&Utc)),
        Err(e) => tracing::debug!("Entry {} has no usable published date: {}", id, e),
    }
    let doi = entry.doi.trim();
    if !doi.is_empty() {
        builder = builder.doi(doi);
    }
    if let Some(url) = entry.pdf_url {
        builder = builder.pdf_url(url);
    }

    match builder.build() {
        Ok(paper) => Some(paper),
        Err(e) => {
            tracing::warn!("Skipping arXiv entry {}: {}", id, e);
            None
        }
    }
}
