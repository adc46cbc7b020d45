use std::borrow::Cow;
use std::collections::HashSet;

use scraper::{Html, Selector};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};
use url::Url;

use super::error::AnalyzeError;
use super::keywords::Keyword;
use super::registry::CrawlRegistry;
use super::types::CrawlEvent;

/// Receives each restricted-network address the first time any worker sees it.
pub trait DiscoverySink: Send + Sync {
    fn discovered(&self, url: &str);
}

impl DiscoverySink for UnboundedSender<CrawlEvent> {
    fn discovered(&self, url: &str) {
        let _ = self.send(CrawlEvent::Discovered(url.to_string()));
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PageAnalysis {
    pub links: Vec<String>,
    pub restricted_links: Vec<String>,
    /// Restricted links not yet visited when the page was analyzed.
    pub eligible: Vec<String>,
    pub found: Vec<String>,
    pub not_found: Vec<String>,
}

pub struct PageAnalyzer {
    keywords: Vec<Keyword>,
    restricted_suffix: String,
}

impl PageAnalyzer {
    pub fn new(keywords: Vec<Keyword>, restricted_suffix: &str) -> Self {
        Self {
            keywords,
            restricted_suffix: restricted_suffix.to_ascii_lowercase(),
        }
    }

    pub fn is_restricted(&self, url: &str) -> bool {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
            .map(|host| host.ends_with(&self.restricted_suffix))
            .unwrap_or(false)
    }

    /// Classifies every keyword against the page and extracts its links.
    ///
    /// Newly seen restricted links are claimed in `registry` and pushed to
    /// `sink` during the call. Invalid UTF-8 is replaced, not rejected; only
    /// binary content is analyzed as an empty document.
    pub fn analyze(
        &self,
        body: &[u8],
        base_url: &str,
        registry: &CrawlRegistry,
        sink: &dyn DiscoverySink,
    ) -> PageAnalysis {
        let html = match decode_body(body) {
            Ok(html) => html,
            Err(err) => {
                warn!(url = %base_url, error = %err, "treating page as empty document");
                Cow::Borrowed("")
            }
        };
        let doc = Html::parse_document(&html);

        let text = doc.root_element().text().collect::<String>().to_lowercase();
        let (found, not_found) = self.classify_keywords(&text);

        let links = self.extract_links(&doc, base_url);
        let mut restricted_links = Vec::new();
        let mut eligible = Vec::new();
        for link in &links {
            if !self.is_restricted(link) {
                continue;
            }
            if !registry.is_discovered(link) && registry.mark_discovered(link) {
                info!(url = %link, from = %base_url, "discovered restricted address");
                sink.discovered(link);
            }
            if !registry.is_visited(link) {
                eligible.push(link.clone());
            }
            restricted_links.push(link.clone());
        }

        PageAnalysis {
            links,
            restricted_links,
            eligible,
            found,
            not_found,
        }
    }

    fn classify_keywords(&self, folded_text: &str) -> (Vec<String>, Vec<String>) {
        let mut found = Vec::new();
        let mut not_found = Vec::new();
        for keyword in &self.keywords {
            if keyword.matches(folded_text) {
                found.push(keyword.label().to_string());
            } else {
                not_found.push(keyword.label().to_string());
            }
        }
        (found, not_found)
    }

    fn extract_links(&self, doc: &Html, page_url: &str) -> Vec<String> {
        let selector = match Selector::parse("a[href]") {
            Ok(s) => s,
            Err(_) => return Vec::new(),
        };

        let mut out = Vec::new();
        let mut seen = HashSet::new();
        for el in doc.select(&selector) {
            let Some(href) = el.value().attr("href") else {
                continue;
            };
            let Some(resolved) = resolve_href(page_url, href.trim()) else {
                continue;
            };
            if seen.insert(resolved.clone()) {
                out.push(resolved);
            }
        }
        out
    }
}

const SNIFF_LEN: usize = 1024;

fn decode_body(body: &[u8]) -> Result<Cow<'_, str>, AnalyzeError> {
    let head = &body[..body.len().min(SNIFF_LEN)];
    if let Some(offset) = head.iter().position(|byte| *byte == 0) {
        return Err(AnalyzeError::Binary(offset));
    }
    Ok(String::from_utf8_lossy(body))
}

pub fn normalize_crawl_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut url = Url::parse(trimmed).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    url.set_fragment(None);
    Some(url.to_string())
}

fn resolve_href(page_url: &str, href: &str) -> Option<String> {
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("mailto:")
        || href.starts_with("javascript:")
        || href.starts_with("tel:")
    {
        return None;
    }

    let base = Url::parse(page_url).ok()?;
    let resolved = base.join(href).ok()?;
    normalize_crawl_url(resolved.as_str())
}
