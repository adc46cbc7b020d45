use chrono::{DateTime, Local};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

pub const DEFAULT_KEYWORDS: [&str; 9] = [
    "BHAVYA",
    "Bihar",
    "medixcel",
    "bihar digital health",
    "plus91",
    "Ayushman Bharat Health",
    "ABHA",
    "Hospital",
    "Health",
];

#[derive(Debug, Parser, Clone)]
#[command(
    name = "onionwatch",
    version,
    about = "Keyword monitor for onion services, crawled through a Tor SOCKS proxy"
)]
pub struct Cli {
    #[arg(long, value_name = "FILE", default_value = "url.txt")]
    pub seeds: String,

    /// Keyword to track; prefix with `re:` for a regular expression.
    #[arg(short = 'k', long = "keyword", value_name = "KEYWORD")]
    pub keywords: Vec<String>,

    #[arg(long, value_name = "FILE")]
    pub keywords_file: Option<String>,

    #[arg(long, value_name = "N", default_value_t = 1)]
    pub depth: usize,

    #[arg(long, value_name = "N", default_value_t = 5)]
    pub max_pages: usize,

    #[arg(long, value_name = "N", default_value_t = 5)]
    pub workers: usize,

    #[arg(long, value_name = "MS", default_value_t = 1000)]
    pub min_delay_ms: u64,

    #[arg(long, value_name = "MS", default_value_t = 5000)]
    pub max_delay_ms: u64,

    #[arg(long, value_name = "SECS", default_value_t = 30)]
    pub timeout_secs: u64,

    #[arg(long, value_name = "SECS", default_value_t = 10)]
    pub probe_timeout_secs: u64,

    /// SOCKS proxy url, or `none` to connect directly.
    #[arg(long, value_name = "URL", default_value = "socks5h://127.0.0.1:9050")]
    pub proxy: String,

    #[arg(long, value_name = "SUFFIX", default_value = ".onion")]
    pub restricted_suffix: String,

    #[arg(long, value_name = "HOST", default_value = "127.0.0.1")]
    pub control_host: String,

    #[arg(long, value_name = "PORT", default_value_t = 9051)]
    pub control_port: u16,

    #[arg(long, value_name = "PASSWORD", env = "TOR_CONTROL_PASSWORD")]
    pub control_password: Option<String>,

    #[arg(long, value_name = "BRIDGE")]
    pub bridge: Vec<String>,

    #[arg(long, default_value_t = false)]
    pub skip_rotate: bool,

    #[arg(long, default_value_t = false)]
    pub skip_probe: bool,

    #[arg(long, value_name = "URL", default_value = "http://httpbin.org/ip")]
    pub probe_url: String,

    #[arg(short, long, value_name = "FILE")]
    pub output: Option<String>,

    #[arg(long, value_enum, default_value_t = FileFormatArg::Csv)]
    pub format: FileFormatArg,

    #[arg(long, value_name = "FILE")]
    pub found_links: Option<String>,

    #[arg(long, value_name = "FILTER", default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Copy, Clone, ValueEnum, PartialEq, Eq)]
pub enum FileFormatArg {
    Csv,
    Json,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DataFormat {
    Csv,
    Json,
}

impl From<FileFormatArg> for DataFormat {
    fn from(value: FileFormatArg) -> Self {
        match value {
            FileFormatArg::Csv => DataFormat::Csv,
            FileFormatArg::Json => DataFormat::Json,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Finding {
    #[serde(rename = "Keyword found")]
    Found,
    #[serde(rename = "Keyword not found")]
    NotFound,
}

/// Fetch outcome column. Failed fetches never produce records, so only
/// success is representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkResponse {
    Success,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    #[serde(rename = "Keyword")]
    pub keyword: String,
    #[serde(rename = "Link")]
    pub link: String,
    #[serde(rename = "Findings")]
    pub findings: Finding,
    #[serde(rename = "Link Response")]
    pub link_response: LinkResponse,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Time")]
    pub time: String,
}

impl ResultRecord {
    pub fn new(keyword: &str, seed: &str, findings: Finding, at: DateTime<Local>) -> Self {
        Self {
            keyword: keyword.to_string(),
            link: seed.to_string(),
            findings,
            link_response: LinkResponse::Success,
            date: at.format("%Y-%m-%d").to_string(),
            time: at.format("%H:%M:%S").to_string(),
        }
    }
}

/// Remaining exploration allowance of one branch. Children receive a copy
/// decremented by one on both axes; siblings never share a budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlBudget {
    pub depth: usize,
    pub pages: usize,
}

impl CrawlBudget {
    pub fn new(depth: usize, pages: usize) -> Self {
        Self { depth, pages }
    }

    pub fn is_exhausted(self) -> bool {
        self.depth == 0 || self.pages == 0
    }

    pub fn child(self) -> Self {
        Self {
            depth: self.depth.saturating_sub(1),
            pages: self.pages.saturating_sub(1),
        }
    }
}

#[derive(Debug)]
pub enum CrawlEvent {
    Discovered(String),
    SeedFinished { seed: String, records: usize },
    Finished(Vec<ResultRecord>),
}
