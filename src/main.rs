use anyhow::Context;
use clap::Parser;
use litrev::tools::{sort_for_display, EnrichedPaper, Resolution};
use litrev::{
    Config, Credentials, EnrichmentCoordinator, LogProgress, MetaSearchClient, Paper, SearchQuery,
    SearchTool, YearFilter,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "litrev")]
#[command(about = "Federated literature search across academic sources")]
#[command(version)]
struct Cli {
    /// Keyword group; terms separated by commas must all match (repeat to OR groups)
    #[arg(short, long = "keywords", value_name = "TERMS", value_delimiter = ';')]
    keyword_groups: Vec<String>,

    /// Exclude papers mentioning any of these terms
    #[arg(short = 'x', long, value_delimiter = ',')]
    exclude: Vec<String>,

    /// Author names (any may match)
    #[arg(short, long, value_delimiter = ',')]
    authors: Vec<String>,

    /// Venue names (any may match)
    #[arg(short, long, value_delimiter = ',')]
    venues: Vec<String>,

    /// Broad subject areas, e.g. "computer science"
    #[arg(long, value_delimiter = ',')]
    areas: Vec<String>,

    /// Publication year (`2020`) or inclusive range (`2018-2022`)
    #[arg(short, long, value_parser = parse_years)]
    years: Option<YearFilter>,

    /// Maximum results per source
    #[arg(short = 'n', long)]
    max_results: Option<u32>,

    /// Only search these sources
    #[arg(short, long, value_delimiter = ',')]
    sources: Vec<String>,

    /// Source preference order for duplicate resolution
    #[arg(short, long, value_delimiter = ',')]
    prefer: Vec<String>,

    /// Configuration file
    #[arg(short, long, env = "LITREV_CONFIG")]
    config: Option<PathBuf>,

    /// Take the first candidate of every unresolved duplicate instead of prompting
    #[arg(long)]
    first_on_conflict: bool,

    /// Fetch standardized metadata from the translation server
    #[arg(long)]
    enrich: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// List the available sources and exit
    #[arg(long)]
    list_sources: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", env = "RUST_LOG")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn parse_years(value: &str) -> Result<YearFilter, String> {
    let parse = |s: &str| {
        s.trim()
            .parse::<i32>()
            .map_err(|e| format!("invalid year '{}': {e}", s.trim()))
    };
    match value.split_once('-') {
        Some((start, end)) => Ok(YearFilter::range(parse(start)?, parse(end)?)),
        None => parse(value).map(YearFilter::Single),
    }
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

impl Cli {
    fn query(&self, config: &Config) -> SearchQuery {
        let split = |group: &String| -> Vec<String> { group.split(',').map(str::to_string).collect() };
        SearchQuery {
            keyword_groups: self.keyword_groups.iter().map(split).collect(),
            exclusion_keywords: self.exclude.clone(),
            authors: self.authors.clone(),
            venues: self.venues.clone(),
            macro_areas: self.areas.clone(),
            years: self.years,
            max_results: self.max_results.unwrap_or(config.search.max_results),
            sources: self.sources.clone(),
        }
    }
}

/// Ask on stdin which candidate to keep for every unresolved duplicate
fn prompt_choices(resolution: &Resolution) -> anyhow::Result<HashMap<String, usize>> {
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    let mut stderr = std::io::stderr();
    let mut choices = HashMap::new();

    for group in resolution.conflicts() {
        writeln!(stderr, "\nDuplicate found: \"{}\"", group.papers[0].title)?;
        for (i, paper) in group.papers.iter().enumerate() {
            writeln!(
                stderr,
                "  [{}] {} ({}, {})",
                i + 1,
                paper.source,
                paper.year.map_or_else(|| "n.d.".to_string(), |y| y.to_string()),
                paper.venue.as_deref().unwrap_or("unknown venue")
            )?;
        }

        let choice = loop {
            write!(stderr, "Keep which version? [1-{}, default 1]: ", group.papers.len())?;
            stderr.flush()?;
            let Some(line) = lines.next().transpose()? else {
                break 0;
            };
            match line.trim() {
                "" => break 0,
                input => match input.parse::<usize>() {
                    Ok(n) if (1..=group.papers.len()).contains(&n) => break n - 1,
                    _ => writeln!(stderr, "Please enter a number between 1 and {}", group.papers.len())?,
                },
            }
        };
        choices.insert(group.key.clone(), choice);
    }
    Ok(choices)
}

#[derive(Serialize)]
struct PaperView<'a> {
    title: &'a str,
    authors: Vec<String>,
    year: Option<i32>,
    venue: Option<&'a str>,
    url: Option<&'a str>,
    doi: Option<&'a str>,
    source: &'a str,
    enriched: bool,
}

impl<'a> From<&'a EnrichedPaper> for PaperView<'a> {
    fn from(paper: &'a EnrichedPaper) -> Self {
        Self {
            title: paper.title(),
            authors: paper.authors(),
            year: paper.year(),
            venue: paper.venue(),
            url: paper.url(),
            doi: paper.doi(),
            source: paper.source(),
            enriched: paper.is_enriched(),
        }
    }
}

#[derive(Serialize)]
struct Report<'a> {
    papers: Vec<PaperView<'a>>,
    errors: &'a [litrev::client::SourceFailure],
    query_log: &'a BTreeMap<String, String>,
    total_found: usize,
}

fn print_text(papers: &[EnrichedPaper]) {
    for (i, paper) in papers.iter().enumerate() {
        let year = paper
            .year()
            .map_or_else(|| "n.d.".to_string(), |y| y.to_string());
        println!("{:>3}. {} ({})", i + 1, paper.title(), year);
        let authors = paper.authors();
        if !authors.is_empty() {
            println!("     {}", authors.join(", "));
        }
        if let Some(venue) = paper.venue() {
            println!("     {venue}");
        }
        if let Some(url) = paper.url() {
            println!("     {url}");
        }
        println!("     [{}]", paper.source());
    }
}

async fn enrich(config: &Config, papers: Vec<Paper>) -> anyhow::Result<Vec<EnrichedPaper>> {
    let coordinator = EnrichmentCoordinator::new(&config.enrichment.to_enrichment_config())?;
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, returning papers without further enrichment");
            on_interrupt.cancel();
        }
    });
    Ok(coordinator.enrich_until(papers, &LogProgress, &cancel).await)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.json_logs);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting litrev");

    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    let credentials = Credentials::from_env()?;

    let preferences = if cli.prefer.is_empty() {
        config.search.preferred_sources.clone()
    } else {
        cli.prefer.clone()
    };
    let client = MetaSearchClient::from_config(&config, &credentials)?;
    if cli.list_sources {
        for (name, description, ceiling) in client.describe_providers() {
            match ceiling {
                Some(ceiling) => println!("{name:<14} {description} (max {ceiling} per request)"),
                None => println!("{name:<14} {description}"),
            }
        }
        return Ok(());
    }
    let tool = SearchTool::new(Arc::new(client), preferences);

    let outcome = tool.search(cli.query(&config), &LogProgress).await?;
    for failure in &outcome.errors {
        eprintln!("warning: {} failed: {}", failure.source, failure.message);
    }

    let choices = if cli.first_on_conflict || outcome.resolution.conflicts().is_empty() {
        outcome.resolution.first_choices()
    } else {
        prompt_choices(&outcome.resolution)?
    };
    let papers = outcome.resolution.clone().finalize(&choices)?;

    let mut papers = if cli.enrich {
        enrich(&config, papers).await?
    } else {
        papers.into_iter().map(EnrichedPaper::unenriched).collect()
    };
    sort_for_display(&mut papers);

    if cli.json {
        let report = Report {
            papers: papers.iter().map(PaperView::from).collect(),
            errors: &outcome.errors,
            query_log: &outcome.query_log,
            total_found: outcome.total_found,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_text(&papers);
        eprintln!(
            "\n{} unique papers ({} fetched) in {:.1}s",
            papers.len(),
            outcome.total_found,
            outcome.elapsed.as_secs_f64()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_years() {
        assert_eq!(parse_years("2020").unwrap(), YearFilter::Single(2020));
        assert_eq!(parse_years("2022-2018").unwrap(), YearFilter::range(2018, 2022));
        assert!(parse_years("soon").is_err());
    }

    #[test]
    fn test_keyword_groups_from_cli() {
        let cli = Cli::parse_from([
            "litrev",
            "-k",
            "large language model,bias",
            "-k",
            "fairness",
            "--years",
            "2019-2021",
        ]);
        let query = cli.query(&Config::default());
        assert_eq!(
            query.keyword_groups,
            vec![
                vec!["large language model".to_string(), "bias".to_string()],
                vec!["fairness".to_string()]
            ]
        );
        assert_eq!(query.years, Some(YearFilter::range(2019, 2021)));
        assert_eq!(query.max_results, 20);
    }
}
