use crate::config::EnumerationConfig;
use crate::model::{Domain, EngineTemplate};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use select::document::Document;
use select::predicate::Name;
use std::collections::HashSet;
use tracing::{debug, error, info, instrument, trace};

/// Anything able to hand back result links for a domain.
///
/// Implementations swallow their own failures: an unreachable source is an
/// empty set, never an error.
#[async_trait]
pub trait SearchSource: Send + Sync {
    fn name(&self) -> String;
    async fn query(&self, domain: &Domain) -> HashSet<String>;
}

// region:        --- Search engine

pub struct SearchEngine {
    http_client: Client,
    template: EngineTemplate,
}

impl SearchEngine {
    pub fn new(http_client: Client, template: EngineTemplate) -> Self {
        Self {
            http_client,
            template,
        }
    }

    async fn fetch_links(&self, domain: &Domain) -> Result<HashSet<String>> {
        let url = self.template.render(domain);
        let res = http_request(&self.http_client, &url).await?;

        if !res.status().is_success() {
            return Err(Error::InvalidHttpResponse(format!(
                "{} answered with {}",
                self.name(),
                res.status()
            )));
        }

        let body = res.text().await?;
        trace!("HTML response: {:?}", body);
        Ok(extract_links(&body, domain))
    }
}

#[async_trait]
impl SearchSource for SearchEngine {
    fn name(&self) -> String {
        self.template.name().to_string()
    }

    #[instrument(name = "query", level = "info", fields(engine = %self.name()), skip_all)]
    async fn query(&self, domain: &Domain) -> HashSet<String> {
        match self.fetch_links(domain).await {
            Ok(links) => {
                debug!("{} links collected", links.len());
                links
            }
            Err(err) => {
                error!("Error querying {}: {}", self.template.as_str(), err);
                HashSet::new()
            }
        }
    }
}

// endregion:     --- Search engine

// region:        --- HTTP utils

pub fn http_client(config: &EnumerationConfig) -> Result<Client> {
    let http_client = Client::builder()
        .timeout(config.http_timeout)
        .user_agent(config.user_agent.as_str())
        .build()?;
    debug!("HTTP Client created: {:?}", http_client);
    Ok(http_client)
}

#[instrument(name = "HTTP_request", level = "debug", skip_all, fields(url = url))]
async fn http_request(http_client: &Client, url: &str) -> Result<Response> {
    info!("Querying {}", url);
    match http_client.get(url).send().await {
        Ok(res) => {
            debug!("Receive with status: {}", res.status());
            Ok(res)
        }
        Err(err) => Err(Error::Reqwest(err)),
    }
}

/// Every anchor `href` mentioning the domain.
///
/// Case-sensitive substring match only; siblings like `notexample.com` get
/// through and are dropped by the extractor, mixed-case hrefs are dropped here.
pub fn extract_links(html: &str, domain: &Domain) -> HashSet<String> {
    Document::from(html)
        .find(Name("a"))
        .filter_map(|node| node.attr("href"))
        .filter(|href| href.contains(domain.as_str()))
        .inspect(|href| trace!("Collecting: {:?}", href))
        .map(String::from)
        .collect()
}

// endregion:     --- HTTP utils
