use std::collections::VecDeque;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinSet;
use tracing::{error, info};

use super::config::sanitize_workers;
use super::crawl::Crawler;
use super::types::{CrawlBudget, CrawlEvent, ResultRecord};

pub struct SeedScheduler {
    crawler: Crawler,
    budget: CrawlBudget,
    workers: usize,
    events: Option<UnboundedSender<CrawlEvent>>,
}

impl SeedScheduler {
    pub fn new(crawler: Crawler, budget: CrawlBudget, workers: usize) -> Self {
        Self {
            crawler,
            budget,
            workers: sanitize_workers(workers),
            events: None,
        }
    }

    pub fn with_events(mut self, events: UnboundedSender<CrawlEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Crawls every seed and returns the records in completion order.
    ///
    /// A seed whose task fails is logged and skipped; its siblings still run.
    pub async fn run(&self, seeds: Vec<String>) -> Vec<ResultRecord> {
        let total = seeds.len();
        let mut queue = VecDeque::from(seeds);
        let mut set = JoinSet::new();
        let mut all = Vec::new();
        let mut finished = 0usize;

        loop {
            while set.len() < self.workers {
                let Some(seed) = queue.pop_front() else {
                    break;
                };
                let crawler = self.crawler.clone();
                let budget = self.budget;
                set.spawn(async move {
                    let records = crawler.crawl_branch(&seed, budget).await;
                    (seed, records)
                });
            }

            let Some(joined) = set.join_next().await else {
                break;
            };
            finished += 1;
            match joined {
                Ok((seed, records)) => {
                    info!(
                        seed = %seed,
                        records = records.len(),
                        progress = %format!("{finished}/{total}"),
                        "seed finished"
                    );
                    if let Some(events) = &self.events {
                        let _ = events.send(CrawlEvent::SeedFinished {
                            seed,
                            records: records.len(),
                        });
                    }
                    all.extend(records);
                }
                Err(err) => {
                    error!(error = %err, "seed worker failed");
                }
            }
        }

        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::app::analyze::PageAnalyzer;
    use crate::app::keywords::{Keyword, KeywordTracker};
    use crate::app::registry::CrawlRegistry;
    use crate::app::testing::{CollectingSink, FakeFetcher, html_page};
    use crate::app::types::Finding;

    const KEYWORDS: [&str; 2] = ["Hospital", "re:plus\\d+"];

    fn scheduler(
        fetcher: Arc<FakeFetcher>,
        sink: Arc<CollectingSink>,
        budget: CrawlBudget,
        workers: usize,
    ) -> SeedScheduler {
        let keywords = KEYWORDS.iter().map(|k| Keyword::parse(k).unwrap()).collect();
        let crawler = Crawler::new(
            fetcher,
            Arc::new(PageAnalyzer::new(keywords, ".onion")),
            Arc::new(KeywordTracker::new()),
            Arc::new(CrawlRegistry::new()),
            sink,
        );
        SeedScheduler::new(crawler, budget, workers)
    }

    fn tally(records: &[ResultRecord]) -> HashMap<(String, String, Finding), usize> {
        let mut out = HashMap::new();
        for r in records {
            *out.entry((r.keyword.clone(), r.link.clone(), r.findings))
                .or_insert(0) += 1;
        }
        out
    }

    #[tokio::test]
    async fn no_seeds_no_records() {
        let fetcher = Arc::new(FakeFetcher::new());
        let sink = Arc::new(CollectingSink::default());
        let records = scheduler(fetcher.clone(), sink, CrawlBudget::new(1, 5), 5)
            .run(Vec::new())
            .await;
        assert!(records.is_empty());
        assert_eq!(fetcher.total_calls(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn shared_link_is_fetched_once_across_seeds() {
        let a = "http://aaaa.onion/";
        let b = "http://bbbb.onion/";
        let c = "http://cccc.onion/";
        let fetcher = Arc::new(
            FakeFetcher::new()
                .with_latency(Duration::from_millis(20))
                .page(a, html_page("hospital", &[c]))
                .page(b, html_page("plus91", &[c]))
                .page(c, html_page("", &[])),
        );
        let sink = Arc::new(CollectingSink::default());
        let records = scheduler(fetcher.clone(), sink.clone(), CrawlBudget::new(2, 5), 5)
            .run(vec![a.to_string(), b.to_string()])
            .await;

        assert_eq!(fetcher.calls(c), 1);
        assert_eq!(sink.count(c), 1);
        assert_eq!(records.len(), 3 * KEYWORDS.len());

        let counts = tally(&records);
        assert_eq!(
            counts.get(&("Hospital".to_string(), a.to_string(), Finding::Found)),
            Some(&1)
        );
        assert_eq!(
            counts.get(&("plus\\d+".to_string(), b.to_string(), Finding::Found)),
            Some(&1)
        );
    }

    #[tokio::test]
    async fn failing_seed_does_not_affect_siblings() {
        let good = "http://good.onion/";
        let bad = "http://bad.onion/";
        let fetcher = Arc::new(
            FakeFetcher::new()
                .page(good, html_page("hospital plus91", &[]))
                .failing(bad, 500),
        );
        let sink = Arc::new(CollectingSink::default());
        let records = scheduler(fetcher.clone(), sink, CrawlBudget::new(1, 5), 2)
            .run(vec![bad.to_string(), good.to_string()])
            .await;

        assert_eq!(records.len(), KEYWORDS.len());
        assert!(records.iter().all(|r| r.link == good));
        assert!(records.iter().all(|r| r.findings == Finding::Found));
        assert_eq!(fetcher.calls(bad), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn worker_pool_bounds_concurrency() {
        let seeds = (0..6)
            .map(|i| format!("http://seed{i}.onion/"))
            .collect::<Vec<_>>();
        let fetcher = seeds.iter().fold(
            FakeFetcher::new().with_latency(Duration::from_millis(30)),
            |f, seed| f.page(seed, html_page("", &[])),
        );
        let fetcher = Arc::new(fetcher);
        let sink = Arc::new(CollectingSink::default());
        let records = scheduler(fetcher.clone(), sink, CrawlBudget::new(1, 5), 2)
            .run(seeds.clone())
            .await;

        assert_eq!(records.len(), seeds.len() * KEYWORDS.len());
        assert!(fetcher.peak_in_flight() <= 2);
        assert_eq!(fetcher.total_calls(), seeds.len());
    }

    #[tokio::test]
    async fn duplicate_seeds_are_crawled_once() {
        let a = "http://aaaa.onion/";
        let fetcher = Arc::new(FakeFetcher::new().page(a, html_page("", &[])));
        let sink = Arc::new(CollectingSink::default());
        let records = scheduler(fetcher.clone(), sink, CrawlBudget::new(1, 5), 3)
            .run(vec![a.to_string(), a.to_string()])
            .await;

        assert_eq!(fetcher.calls(a), 1);
        assert_eq!(records.len(), KEYWORDS.len());
    }

    #[tokio::test]
    async fn seed_completion_is_reported() {
        let a = "http://aaaa.onion/";
        let fetcher = Arc::new(FakeFetcher::new().page(a, html_page("", &[])));
        let sink = Arc::new(CollectingSink::default());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let records = scheduler(fetcher, sink, CrawlBudget::new(1, 5), 1)
            .with_events(tx)
            .run(vec![a.to_string()])
            .await;

        assert_eq!(records.len(), KEYWORDS.len());
        match rx.try_recv() {
            Ok(CrawlEvent::SeedFinished { seed, records }) => {
                assert_eq!(seed, a);
                assert_eq!(records, KEYWORDS.len());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
