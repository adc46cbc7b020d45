use std::fs;
use std::time::Duration;

use url::Url;

use super::error::ConfigError;
use super::keywords::Keyword;
use super::types::{Cli, CrawlBudget, DEFAULT_KEYWORDS};

const MAX_WORKERS: usize = 256;

pub fn sanitize_workers(value: usize) -> usize {
    value.clamp(1, MAX_WORKERS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub fn from_millis(min_ms: u64, max_ms: u64) -> Result<Self, ConfigError> {
        if min_ms > max_ms {
            return Err(ConfigError::InvertedDelay { min_ms, max_ms });
        }
        Ok(Self {
            min: Duration::from_millis(min_ms),
            max: Duration::from_millis(max_ms),
        })
    }

    pub fn none() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }
}

impl Default for DelayRange {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(1),
            max: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControlConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub bridges: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub keywords: Vec<Keyword>,
    pub budget: CrawlBudget,
    pub workers: usize,
    pub delay: DelayRange,
    pub fetch_timeout: Duration,
    pub probe_timeout: Duration,
    /// `None` connects directly.
    pub proxy: Option<Url>,
    pub restricted_suffix: String,
    pub control: ControlConfig,
    pub rotate_circuit: bool,
    pub probe_url: Option<String>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            keywords: DEFAULT_KEYWORDS.iter().map(|k| Keyword::literal(k)).collect(),
            budget: CrawlBudget::new(1, 5),
            workers: 5,
            delay: DelayRange::default(),
            fetch_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(10),
            proxy: Url::parse("socks5h://127.0.0.1:9050").ok(),
            restricted_suffix: ".onion".to_string(),
            control: ControlConfig {
                host: "127.0.0.1".to_string(),
                port: 9051,
                password: None,
                bridges: Vec::new(),
            },
            rotate_circuit: true,
            probe_url: Some("http://httpbin.org/ip".to_string()),
        }
    }
}

impl CrawlConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let mut entries = cli.keywords.clone();
        if let Some(path) = cli.keywords_file.as_deref() {
            entries.extend(read_keyword_file(path)?);
        }
        let keywords = if entries.is_empty() {
            DEFAULT_KEYWORDS.iter().map(|k| Keyword::literal(k)).collect()
        } else {
            entries
                .iter()
                .map(|entry| Keyword::parse(entry))
                .collect::<Result<Vec<_>, _>>()?
        };

        Ok(Self {
            keywords,
            budget: CrawlBudget::new(cli.depth, cli.max_pages),
            workers: sanitize_workers(cli.workers),
            delay: DelayRange::from_millis(cli.min_delay_ms, cli.max_delay_ms)?,
            fetch_timeout: Duration::from_secs(cli.timeout_secs),
            probe_timeout: Duration::from_secs(cli.probe_timeout_secs),
            proxy: parse_proxy(&cli.proxy)?,
            restricted_suffix: normalize_suffix(&cli.restricted_suffix),
            control: ControlConfig {
                host: cli.control_host.clone(),
                port: cli.control_port,
                password: cli.control_password.clone(),
                bridges: cli.bridge.clone(),
            },
            rotate_circuit: !cli.skip_rotate,
            probe_url: (!cli.skip_probe).then(|| cli.probe_url.clone()),
        })
    }
}

fn read_keyword_file(path: &str) -> Result<Vec<String>, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::KeywordsFile {
        path: path.to_string(),
        source,
    })?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect())
}

fn parse_proxy(raw: &str) -> Result<Option<Url>, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    let url = Url::parse(trimmed).map_err(|_| ConfigError::Proxy(trimmed.to_string()))?;
    match url.scheme() {
        "socks5" | "socks5h" | "http" | "https" => Ok(Some(url)),
        _ => Err(ConfigError::Proxy(trimmed.to_string())),
    }
}

fn normalize_suffix(raw: &str) -> String {
    let lower = raw.trim().to_ascii_lowercase();
    if lower.starts_with('.') {
        lower
    } else {
        format!(".{lower}")
    }
}
