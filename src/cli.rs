use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{ArgAction, Parser, ValueEnum};
use std::io::Write;
use std::path::PathBuf;

use crate::layers::config::KeywordConfig;
use crate::layers::discovery::{ArxivRepository, PaperRepository, ARXIV_API_URL};
use crate::layers::download::{CancellationFlag, DownloadReport, HttpFetcher, PaperDownloadService};
use crate::layers::matching::ScoredPaper;
use crate::layers::resolution::Resolver;
use crate::layers::sample::InMemoryPaperRepository;
use crate::layers::search::{ExecuteKeywordSearchUseCase, CUSTOM_STRATEGY};
use crate::layers::{DateRange, ResearchPaper};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SourceKind {
    /// Built-in HRV/TBI sample papers
    Sample,
    /// Live arXiv API
    Arxiv,
}

/// Search HRV/TBI research papers by keyword strategy and optionally download them.
#[derive(Parser, Debug)]
#[command(name = "research-aggregator", version)]
pub struct Cli {
    /// Named search strategy from the configuration (defaults to its default_strategy)
    #[arg(short, long, conflicts_with = "custom")]
    pub strategy: Option<String>,

    /// Ad-hoc search terms instead of a strategy
    #[arg(short, long, num_args = 1.., value_name = "TERM")]
    pub custom: Vec<String>,

    /// Maximum number of results
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// List configured strategies and exit
    #[arg(long)]
    pub list_strategies: bool,

    /// Download available PDFs for the results
    #[arg(short, long)]
    pub download: bool,

    /// Root directory for downloads
    #[arg(short, long, env = "DOWNLOAD_DIR", default_value = "outputs")]
    pub output_dir: PathBuf,

    /// Where papers come from
    #[arg(long, value_enum, default_value_t = SourceKind::Sample)]
    pub source: SourceKind,

    /// Keyword configuration file
    #[arg(long, env = "RESEARCH_CONFIG", default_value = "config/search_keywords.yaml")]
    pub config: PathBuf,

    /// arXiv API endpoint
    #[arg(long, env = "ARXIV_API_URL", default_value = ARXIV_API_URL, hide = true)]
    pub arxiv_url: String,

    /// Only papers published on or after this date (YYYY-MM-DD)
    #[arg(long)]
    pub since: Option<NaiveDate>,

    /// Only papers published on or before this date (YYYY-MM-DD)
    #[arg(long)]
    pub until: Option<NaiveDate>,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

pub async fn run(cli: Cli, cancel: CancellationFlag, out: &mut dyn Write) -> Result<()> {
    let config = KeywordConfig::load(&cli.config)
        .with_context(|| format!("cannot load keyword configuration {}", cli.config.display()))?;

    if cli.list_strategies {
        return list_strategies(&config, out);
    }

    let repository: Box<dyn PaperRepository> = match cli.source {
        SourceKind::Sample => {
            let repository = InMemoryPaperRepository::sample().context("built-in sample papers are invalid")?;
            tracing::info!("Loaded {} sample papers", repository.len()?);
            Box::new(repository)
        }
        SourceKind::Arxiv => Box::new(ArxivRepository::new(cli.arxiv_url.clone())?),
    };

    let mut use_case = ExecuteKeywordSearchUseCase::new(repository.as_ref(), &config);
    if cli.since.is_some() || cli.until.is_some() {
        use_case = use_case.with_date_range(DateRange::new(cli.since, cli.until)?);
    }
    if let Some(limit) = cli.limit {
        use_case = use_case.with_limit(limit)?;
    }

    let (label, results) = if cli.custom.is_empty() {
        let name = cli
            .strategy
            .as_deref()
            .unwrap_or(config.default_strategy_name());
        (name.to_string(), use_case.execute_strategy_scored(name).await?)
    } else {
        let results = use_case.execute_custom_search_scored(&cli.custom).await?;
        (CUSTOM_STRATEGY.to_string(), results)
    };

    if cli.json {
        writeln!(out, "{}", serde_json::to_string_pretty(&results)?)?;
    } else {
        print_results(out, &label, repository.name(), &results)?;
    }

    if !cli.download {
        return Ok(());
    }

    let papers: Vec<ResearchPaper> = results.into_iter().map(|s| s.paper).collect();
    let available = papers.iter().filter(|p| Resolver::is_downloadable(p)).count();
    eprintln!("{} of {} papers have an open-access PDF", available, papers.len());
    let fetcher = HttpFetcher::new().context("cannot build HTTP client")?;
    let service = PaperDownloadService::new(&cli.output_dir, Box::new(fetcher)).with_cancellation(cancel);
    let report = service
        .download_papers(&papers, &label, |current, total, title| {
            eprintln!("[{}/{}] {}", current, total, title);
        })
        .await
        .context("download batch aborted")?;

    let summary = download_summary(&report, papers.len(), &service.strategy_dir(&label));
    if cli.json {
        eprint!("{}", summary);
    } else {
        write!(out, "{}", summary)?;
    }
    Ok(())
}

fn list_strategies(config: &KeywordConfig, out: &mut dyn Write) -> Result<()> {
    writeln!(out, "Available search strategies:")?;
    for strategy in config.strategies() {
        let marker = if strategy.name() == config.default_strategy_name() {
            " (default)"
        } else {
            ""
        };
        writeln!(out, "  {}{}: {}", strategy.name(), marker, strategy.description())?;
        writeln!(
            out,
            "      {} required, {} optional, {} technology terms; max {} results",
            strategy.required_terms().len(),
            strategy.optional_terms().len(),
            strategy.technology_terms().len(),
            strategy.max_results()
        )?;
    }
    Ok(())
}

fn print_results(out: &mut dyn Write, label: &str, source: &str, results: &[ScoredPaper]) -> Result<()> {
    writeln!(out, "Found {} papers for '{}' in {}", results.len(), label, source)?;
    for (i, scored) in results.iter().enumerate() {
        let paper = &scored.paper;
        writeln!(out, "\n{}. {}", i + 1, paper.title())?;
        let date = paper
            .publication_date()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "undated".to_string());
        writeln!(out, "   {} | {} | {}", paper.authors().join(", "), date, paper.venue())?;
        if let Some(doi) = paper.doi() {
            writeln!(out, "   DOI: {}", doi)?;
        }
        writeln!(
            out,
            "   score {} | citations {} | matched: {}",
            scored.score,
            paper.citation_count(),
            scored.matched_terms.join(", ")
        )?;
    }
    Ok(())
}

fn download_summary(report: &DownloadReport, attempted: usize, dir: &std::path::Path) -> String {
    let mut summary = format!(
        "\nDownloaded {} of {} papers to {}\n",
        report.downloaded.len(),
        attempted,
        dir.display()
    );
    for skipped in &report.skipped {
        summary.push_str(&format!("  skipped: {} ({})\n", skipped.title, skipped.reason));
    }
    if report.cancelled {
        summary.push_str("  batch cancelled before completion\n");
    }
    summary
}
