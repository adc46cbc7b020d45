use std::io;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use super::analyze::PageAnalyzer;
use super::config::CrawlConfig;
use super::control::rotate_circuit;
use super::crawl::Crawler;
use super::data_io::{
    DiscoveryFile, ResultSink, default_found_links_path, default_results_path, detect_data_format,
    load_seeds,
};
use super::fetch::{ProxyFetcher, build_client, probe_exit_ip};
use super::keywords::{Keyword, KeywordTracker};
use super::registry::CrawlRegistry;
use super::scheduler::SeedScheduler;
use super::types::{Cli, CrawlEvent, DataFormat, ResultRecord};

#[derive(Debug, Clone)]
pub struct OutputTargets {
    pub results_path: String,
    pub results_format: DataFormat,
    pub found_links_path: String,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub records: usize,
    pub discovered: usize,
    pub visited: usize,
    pub seeds_finished: usize,
}

#[derive(Default)]
struct RunState {
    appended: usize,
    seeds_finished: usize,
    records: Option<Vec<ResultRecord>>,
}

fn handle_crawl_event(state: &mut RunState, discovery: &mut DiscoveryFile, event: CrawlEvent) {
    match event {
        CrawlEvent::Discovered(url) => {
            match discovery.append(&url) {
                Ok(()) => state.appended += 1,
                Err(err) => error!(url = %url, error = %err, "could not record discovered address"),
            }
        }
        CrawlEvent::SeedFinished { seed, records } => {
            state.seeds_finished += 1;
            debug!(seed = %seed, records, "seed batch received");
        }
        CrawlEvent::Finished(records) => state.records = Some(records),
    }
}

fn init_logging(fallback: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}

pub async fn run() -> io::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = CrawlConfig::from_cli(&cli)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err.to_string()))?;
    let configured_format: DataFormat = cli.format.into();
    let results_format = cli
        .output
        .as_deref()
        .map(|path| detect_data_format(path, configured_format))
        .unwrap_or(configured_format);
    let targets = OutputTargets {
        results_path: cli
            .output
            .clone()
            .unwrap_or_else(|| default_results_path(results_format)),
        results_format,
        found_links_path: cli
            .found_links
            .clone()
            .unwrap_or_else(default_found_links_path),
    };

    if config.rotate_circuit {
        if let Err(err) = rotate_circuit(&config.control).await {
            warn!(error = %err, "could not rotate tor identity, continuing with current circuit");
        }
    }

    let seeds = load_seeds(&cli.seeds)?;
    let started = Instant::now();
    let summary = execute(&config, seeds, &targets).await?;
    info!(
        records = summary.records,
        discovered = summary.discovered,
        visited = summary.visited,
        seeds = summary.seeds_finished,
        elapsed_secs = format!("{:.2}", started.elapsed().as_secs_f64()),
        "run complete"
    );
    Ok(())
}

/// Crawls `seeds` with `config` and writes both sinks. Always writes the
/// result file, even when every seed failed.
pub async fn execute(
    config: &CrawlConfig,
    seeds: Vec<String>,
    targets: &OutputTargets,
) -> io::Result<RunSummary> {
    let client = build_client(config.proxy.as_ref()).map_err(io::Error::other)?;
    if let Some(probe_url) = config.probe_url.as_deref() {
        match probe_exit_ip(&client, probe_url, config.probe_timeout).await {
            Ok(ip) => info!(exit_ip = %ip, "proxy is connected"),
            Err(err) => error!(error = %err, "proxy is not connected"),
        }
    }

    info!(
        seeds = seeds.len(),
        keywords = config.keywords.len(),
        depth = config.budget.depth,
        pages = config.budget.pages,
        workers = config.workers,
        "starting crawl"
    );

    let mut discovery = DiscoveryFile::open(&targets.found_links_path)?;
    let registry = Arc::new(CrawlRegistry::new());
    let tracker = Arc::new(KeywordTracker::new());
    let (tx, mut rx) = mpsc::unbounded_channel::<CrawlEvent>();

    let crawler = Crawler::new(
        Arc::new(ProxyFetcher::new(client, config.delay, config.fetch_timeout)),
        Arc::new(PageAnalyzer::new(
            config.keywords.clone(),
            &config.restricted_suffix,
        )),
        tracker.clone(),
        registry.clone(),
        Arc::new(tx.clone()),
    );
    let scheduler = SeedScheduler::new(crawler, config.budget, config.workers).with_events(tx.clone());
    let crawl_handle = tokio::spawn(async move {
        let records = scheduler.run(seeds).await;
        let _ = tx.send(CrawlEvent::Finished(records));
    });

    let state = drain_events(&mut rx, &mut discovery).await;
    if let Err(err) = crawl_handle.await {
        error!(error = %err, "crawler task join error");
    }

    let records = state.records.unwrap_or_default();
    let mut sink = ResultSink::new(&targets.results_path, targets.results_format)?;
    sink.write_all(&records)?;
    sink.finalize()?;

    log_keyword_totals(&config.keywords, &tracker);
    info!(
        appended = state.appended,
        output = %targets.results_path,
        found_links = %targets.found_links_path,
        "results saved"
    );

    Ok(RunSummary {
        records: records.len(),
        discovered: registry.discovered_count(),
        visited: registry.visited_count(),
        seeds_finished: state.seeds_finished,
    })
}

async fn drain_events(
    rx: &mut UnboundedReceiver<CrawlEvent>,
    discovery: &mut DiscoveryFile,
) -> RunState {
    let mut state = RunState::default();
    while let Some(event) = rx.recv().await {
        handle_crawl_event(&mut state, discovery, event);
        if state.records.is_some() {
            break;
        }
    }
    state
}

fn log_keyword_totals(keywords: &[Keyword], tracker: &KeywordTracker) {
    let labels = keywords
        .iter()
        .map(|keyword| keyword.label().to_string())
        .collect::<Vec<_>>();
    for label in tracker.prioritize(&labels) {
        info!(keyword = %label, pages = tracker.count(&label), "keyword total");
    }
}
