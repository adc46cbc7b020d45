use std::sync::Arc;

use chrono::Local;
use tracing::{debug, info, warn};

use super::analyze::{DiscoverySink, PageAnalyzer, normalize_crawl_url};
use super::fetch::PageFetcher;
use super::keywords::KeywordTracker;
use super::registry::CrawlRegistry;
use super::types::{CrawlBudget, Finding, ResultRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
struct CrawlTask {
    url: String,
    budget: CrawlBudget,
}

#[derive(Clone)]
pub struct Crawler {
    fetcher: Arc<dyn PageFetcher>,
    analyzer: Arc<PageAnalyzer>,
    tracker: Arc<KeywordTracker>,
    registry: Arc<CrawlRegistry>,
    discovery: Arc<dyn DiscoverySink>,
}

impl Crawler {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        analyzer: Arc<PageAnalyzer>,
        tracker: Arc<KeywordTracker>,
        registry: Arc<CrawlRegistry>,
        discovery: Arc<dyn DiscoverySink>,
    ) -> Self {
        Self {
            fetcher,
            analyzer,
            tracker,
            registry,
            discovery,
        }
    }

    /// Crawls depth-first from `seed` and returns every record of the branch,
    /// each attributed to `seed`.
    ///
    /// Fetch failures end only the step that hit them. Children of a page
    /// inherit its budget minus one on both axes.
    pub async fn crawl_branch(&self, seed: &str, budget: CrawlBudget) -> Vec<ResultRecord> {
        let start = normalize_crawl_url(seed).unwrap_or_else(|| seed.trim().to_string());
        let mut stack = vec![CrawlTask { url: start, budget }];
        let mut records = Vec::new();

        while let Some(task) = stack.pop() {
            if task.budget.is_exhausted() {
                continue;
            }
            if !self.registry.try_mark_visited(&task.url) {
                debug!(url = %task.url, "skipping already processed url");
                continue;
            }

            info!(
                url = %task.url,
                seed = %seed,
                depth = task.budget.depth,
                pages = task.budget.pages,
                "crawling"
            );
            let body = match self.fetcher.fetch(&task.url).await {
                Ok(body) => body,
                Err(err) => {
                    warn!(url = %task.url, seed = %seed, error = %err, "fetch failed");
                    continue;
                }
            };

            let analysis =
                self.analyzer
                    .analyze(&body, &task.url, &self.registry, self.discovery.as_ref());
            self.tracker.record_found(&analysis.found);
            let prioritized = self.tracker.prioritize(&analysis.found);

            let now = Local::now();
            records.extend(
                prioritized
                    .iter()
                    .map(|keyword| ResultRecord::new(keyword, seed, Finding::Found, now)),
            );
            records.extend(
                analysis
                    .not_found
                    .iter()
                    .map(|keyword| ResultRecord::new(keyword, seed, Finding::NotFound, now)),
            );
            debug!(
                url = %task.url,
                found = analysis.found.len(),
                not_found = analysis.not_found.len(),
                links = analysis.links.len(),
                restricted = analysis.restricted_links.len(),
                eligible = analysis.eligible.len(),
                "page analyzed"
            );

            let child = task.budget.child();
            // Reverse so the first link in the document is crawled first.
            stack.extend(analysis.eligible.into_iter().rev().map(|url| CrawlTask {
                url,
                budget: child,
            }));
        }

        records
    }
}
