// Download URL resolution for open-access artifacts
use url::Url;

use crate::layers::ResearchPaper;

const ARXIV_PDF_URL: &str = "https://arxiv.org/pdf";
const ARXIV_DOI_PREFIX: &str = "10.48550/arxiv.";

pub struct Resolver;

impl Resolver {
    /// Direct PDF link first, then arXiv id, then an arXiv DOI.
    pub fn resolve(paper: &ResearchPaper) -> Option<Url> {
        if let Some(raw) = paper.pdf_url() {
            match Url::parse(raw) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => return Some(url),
                Ok(url) => tracing::debug!("Ignoring non-HTTP PDF link {} for {}", url, paper.title()),
                Err(e) => tracing::debug!("Ignoring unparsable PDF link {:?} for {}: {}", raw, paper.title(), e),
            }
        }

        let arxiv_id = paper.arxiv_id().map(str::to_string).or_else(|| {
            paper.doi().and_then(|doi| {
                let split = ARXIV_DOI_PREFIX.len();
                doi.get(..split)
                    .filter(|prefix| prefix.eq_ignore_ascii_case(ARXIV_DOI_PREFIX))
                    .and_then(|_| doi.get(split..))
                    .map(str::to_string)
            })
        })?;

        let url = format!("{}/{}", ARXIV_PDF_URL, arxiv_id.trim());
        Url::parse(&url).ok()
    }

    pub fn is_downloadable(paper: &ResearchPaper) -> bool {
        Self::resolve(paper).is_some()
    }
}
