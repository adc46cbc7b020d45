use dashmap::DashSet;

// Both sets only grow; each claim is a single `DashSet::insert`.
#[derive(Debug, Default)]
pub struct CrawlRegistry {
    visited: DashSet<String>,
    discovered: DashSet<String>,
}

impl CrawlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_mark_visited(&self, url: &str) -> bool {
        self.visited.insert(url.to_string())
    }

    pub fn is_visited(&self, url: &str) -> bool {
        self.visited.contains(url)
    }

    pub fn is_discovered(&self, url: &str) -> bool {
        self.discovered.contains(url)
    }

    pub fn mark_discovered(&self, url: &str) -> bool {
        self.discovered.insert(url.to_string())
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    pub fn discovered_count(&self) -> usize {
        self.discovered.len()
    }
}
