use crate::model::EngineTemplate;
use crate::{Error, Result};
use std::time::Duration;

// region:        --- Constants

// timeouts
pub const HTTP_REQUEST_TIMEOUT_MS: u64 = 10000;
pub const RESOLVE_DNS_TIMEOUT_MS: u64 = 4000;

// concurrency numbers
pub const SEARCH_QUERY_CONCURRENCY: usize = 5;
pub const RESOLVE_DNS_CONCURRENCY: usize = 10;

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/85.0.4183.121 Safari/537.36";

pub const DEFAULT_ENGINES: [&str; 3] = [
    "https://www.google.com/search?q=site:{}",
    "https://www.bing.com/search?q=site:{}",
    "https://search.yahoo.com/search?p=site:{}",
];

// endregion:     --- Constants

#[derive(Debug, Clone)]
pub struct EnumerationConfig {
    pub engines: Vec<EngineTemplate>,
    pub query_concurrency: usize,
    pub resolve_concurrency: usize,
    pub http_timeout: Duration,
    pub dns_timeout: Duration,
    pub user_agent: String,
}

// region:        --- Constructors

impl Default for EnumerationConfig {
    fn default() -> Self {
        Self {
            engines: default_engines(),
            query_concurrency: SEARCH_QUERY_CONCURRENCY,
            resolve_concurrency: RESOLVE_DNS_CONCURRENCY,
            http_timeout: Duration::from_millis(HTTP_REQUEST_TIMEOUT_MS),
            dns_timeout: Duration::from_millis(RESOLVE_DNS_TIMEOUT_MS),
            user_agent: USER_AGENT.to_string(),
        }
    }
}

impl EnumerationConfig {
    pub fn with_engines(mut self, engines: Vec<EngineTemplate>) -> Self {
        self.engines = engines;
        self
    }

    pub fn with_query_concurrency(mut self, concurrency: usize) -> Self {
        self.query_concurrency = concurrency;
        self
    }

    pub fn with_resolve_concurrency(mut self, concurrency: usize) -> Self {
        self.resolve_concurrency = concurrency;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }
}

// endregion:     --- Constructors

impl EnumerationConfig {
    /// Checks everything that must hold before the first request goes out.
    pub fn validate(&self) -> Result<()> {
        if self.engines.is_empty() {
            return Err(Error::InvalidConfig("no search engine configured".into()));
        }
        if self.query_concurrency == 0 || self.resolve_concurrency == 0 {
            return Err(Error::InvalidConfig(
                "concurrency values must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Parses user supplied templates, failing on the first malformed one.
pub fn parse_engines<S: AsRef<str>>(raw: &[S]) -> Result<Vec<EngineTemplate>> {
    raw.iter()
        .map(|template| EngineTemplate::parse(template.as_ref()))
        .collect()
}

pub fn default_engines() -> Vec<EngineTemplate> {
    DEFAULT_ENGINES
        .iter()
        .filter_map(|template| EngineTemplate::parse(template).ok())
        .collect()
}
