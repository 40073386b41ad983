use crate::config::EnumerationConfig;
use crate::dns::{self, ARecordLookup};
use crate::model::{ConfirmedSubdomain, Domain, EngineTemplate};
use crate::search::{self, SearchEngine, SearchSource};
use crate::{subdomains, Result};
use futures::{stream, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument::WithSubscriber;
use tracing::{debug, info, instrument, Dispatch};

// region:        --- Report

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOutcome {
    pub engine: String,
    pub urls: usize,
}

#[derive(Debug)]
pub struct EnumerationReport {
    pub engines: Vec<EngineOutcome>,
    pub urls_collected: usize,
    pub candidates: usize,
    pub attempted: usize,
    pub confirmed: Vec<ConfirmedSubdomain>,
    pub elapsed: Duration,
}

// endregion:     --- Report

pub struct Enumerator {
    sources: Vec<Box<dyn SearchSource>>,
    dns_resolver: Arc<dyn ARecordLookup>,
    query_concurrency: usize,
    resolve_concurrency: usize,
    dispatch: Option<Dispatch>,
}

// region:        --- Constructors

impl Enumerator {
    pub fn new(
        sources: Vec<Box<dyn SearchSource>>,
        dns_resolver: Arc<dyn ARecordLookup>,
        query_concurrency: usize,
        resolve_concurrency: usize,
    ) -> Self {
        Self {
            sources,
            dns_resolver,
            query_concurrency: query_concurrency.max(1),
            resolve_concurrency: resolve_concurrency.max(1),
            dispatch: None,
        }
    }

    /// Real search engines and resolver, after validating the whole config.
    pub fn from_config(config: &EnumerationConfig) -> Result<Self> {
        config.validate()?;

        let http_client = search::http_client(config)?;
        let sources = config
            .engines
            .iter()
            .cloned()
            .map(|template| {
                Box::new(SearchEngine::new(http_client.clone(), template)) as Box<dyn SearchSource>
            })
            .collect();
        let dns_resolver = dns::new_resolver(config.dns_timeout);

        Ok(Self::new(
            sources,
            dns_resolver,
            config.query_concurrency,
            config.resolve_concurrency,
        ))
    }

    /// Routes every event of a run to `dispatch` instead of the ambient subscriber.
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }
}

// endregion:     --- Constructors

// region:        --- Enumeration

impl Enumerator {
    pub async fn run(&self, domain: &Domain) -> EnumerationReport {
        match &self.dispatch {
            Some(dispatch) => self.run_phases(domain).with_subscriber(dispatch.clone()).await,
            None => self.run_phases(domain).await,
        }
    }

    #[instrument(name = "enumerate", level = "info", fields(domain = %domain), skip_all)]
    async fn run_phases(&self, domain: &Domain) -> EnumerationReport {
        let start = Instant::now();
        info!("Starting subdomain enumeration for {}", domain);

        let (engines, urls) = self.query_engines(domain).await;
        let urls_collected = urls.len();

        let candidates = subdomains::extract(&urls, domain);
        info!(
            "{} candidates extracted from {} urls",
            candidates.len(),
            urls_collected
        );

        let candidates_count = candidates.len();
        let (attempted, confirmed) = self.resolve_candidates(candidates, domain).await;

        EnumerationReport {
            engines,
            urls_collected,
            candidates: candidates_count,
            attempted,
            confirmed,
            elapsed: start.elapsed(),
        }
    }

    #[instrument(name = "queries", level = "info", skip_all)]
    async fn query_engines(&self, domain: &Domain) -> (Vec<EngineOutcome>, Vec<String>) {
        let results: Vec<(String, HashSet<String>)> = stream::iter(self.sources.iter())
            .map(|source| async move { (source.name(), source.query(domain).await) })
            .buffer_unordered(self.query_concurrency)
            .collect()
            .await;

        let mut engines = Vec::with_capacity(results.len());
        let mut urls = Vec::new();
        for (engine, found) in results {
            debug!("{} returned {} urls", engine, found.len());
            engines.push(EngineOutcome {
                engine,
                urls: found.len(),
            });
            urls.extend(found);
        }

        info!("{} urls collected", urls.len());
        (engines, urls)
    }

    #[instrument(name = "resolves", level = "info", skip_all)]
    async fn resolve_candidates(
        &self,
        candidates: HashSet<String>,
        domain: &Domain,
    ) -> (usize, Vec<ConfirmedSubdomain>) {
        let dns_resolver = self.dns_resolver.as_ref();
        let results: Vec<(String, Option<ConfirmedSubdomain>)> = stream::iter(candidates)
            .map(|candidate| async move {
                let confirmed = dns::resolve(dns_resolver, &candidate, domain).await;
                (candidate, confirmed)
            })
            .buffer_unordered(self.resolve_concurrency)
            .collect()
            .await;

        let attempted = results.len();
        let confirmed: Vec<ConfirmedSubdomain> = results
            .into_iter()
            .filter_map(|(candidate, confirmed)| {
                if confirmed.is_none() {
                    debug!("{} not confirmed", candidate);
                }
                confirmed
            })
            .collect();

        info!("{} of {} domains resolved", confirmed.len(), attempted);
        (attempted, confirmed)
    }
}

// endregion:     --- Enumeration

/// One-shot enumeration with default settings and the given engines.
pub async fn enumerate(
    domain: &Domain,
    engines: &[EngineTemplate],
) -> Result<Vec<ConfirmedSubdomain>> {
    let config = EnumerationConfig::default().with_engines(engines.to_vec());
    let enumerator = Enumerator::from_config(&config)?;
    Ok(enumerator.run(domain).await.confirmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::LookupOutcome;
    use crate::Error;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::io::Write;
    use std::sync::Mutex;
    use tracing::Level;
    use tracing_subscriber::fmt::MakeWriter;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // region:        --- Fakes

    struct StaticSource(Vec<&'static str>);

    #[async_trait]
    impl SearchSource for StaticSource {
        fn name(&self) -> String {
            "static".to_string()
        }

        async fn query(&self, _domain: &Domain) -> HashSet<String> {
            self.0.iter().map(|url| url.to_string()).collect()
        }
    }

    /// Resolves names listed in `live`, NXDOMAIN otherwise, and tracks how
    /// many lookups ran and how many overlapped.
    #[derive(Default)]
    struct CountingLookup {
        live: Vec<&'static str>,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ARecordLookup for CountingLookup {
        async fn lookup_a(&self, fqdn: &str) -> LookupOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.seen.lock().unwrap().push(fqdn.to_string());

            tokio::time::sleep(Duration::from_millis(10)).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.live.iter().any(|live| *live == fqdn) {
                LookupOutcome::Resolved(1)
            } else {
                LookupOutcome::NxDomain
            }
        }
    }

    /// Engine that takes a while to answer and tracks overlapping queries.
    struct SlowSource {
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SearchSource for SlowSource {
        fn name(&self) -> String {
            "slow".to_string()
        }

        async fn query(&self, _domain: &Domain) -> HashSet<String> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            HashSet::from([format!("https://s{}.example.com/", now)])
        }
    }

    struct ScriptedLookup(Vec<(&'static str, LookupOutcome)>);

    #[async_trait]
    impl ARecordLookup for ScriptedLookup {
        async fn lookup_a(&self, fqdn: &str) -> LookupOutcome {
            self.0
                .iter()
                .find(|(name, _)| *name == fqdn)
                .map(|(_, outcome)| outcome.clone())
                .unwrap_or(LookupOutcome::NxDomain)
        }
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
        }
    }

    impl Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for LogBuffer {
        type Writer = LogBuffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    // endregion:     --- Fakes

    fn domain() -> Domain {
        Domain::parse("example.com").unwrap()
    }

    fn links(count: usize) -> Vec<&'static str> {
        [
            "https://a.example.com/",
            "https://b.example.com/",
            "https://c.example.com/",
            "https://d.example.com/",
            "https://e.example.com/",
            "https://f.example.com/",
            "https://g.example.com/",
            "https://h.example.com/",
            "https://i.example.com/",
            "https://j.example.com/",
            "https://k.example.com/",
            "https://l.example.com/",
        ][..count]
            .to_vec()
    }

    #[tokio::test]
    async fn every_candidate_is_resolved_exactly_once() {
        let lookup = Arc::new(CountingLookup {
            live: vec!["a.example.com", "c.example.com"],
            ..Default::default()
        });
        let sources: Vec<Box<dyn SearchSource>> = vec![
            Box::new(StaticSource(links(3))),
            Box::new(StaticSource(vec![
                "https://a.example.com/dup",
                "https://example.com/",
                "https://evil.com/",
            ])),
        ];
        let enumerator = Enumerator::new(sources, lookup.clone(), 5, 10);

        let report = enumerator.run(&domain()).await;

        assert_eq!(3, report.candidates);
        assert_eq!(3, report.attempted);
        assert_eq!(3, lookup.calls.load(Ordering::SeqCst));
        let mut confirmed: Vec<&str> = report.confirmed.iter().map(|c| c.as_str()).collect();
        confirmed.sort();
        assert_eq!(vec!["a.example.com", "c.example.com"], confirmed);
    }

    #[tokio::test]
    async fn nxdomain_everywhere_is_an_empty_result() {
        let lookup = Arc::new(CountingLookup::default());
        let sources: Vec<Box<dyn SearchSource>> = vec![Box::new(StaticSource(links(4)))];
        let enumerator = Enumerator::new(sources, lookup.clone(), 5, 10);

        let report = enumerator.run(&domain()).await;

        assert_eq!(4, report.attempted);
        assert!(report.confirmed.is_empty());
    }

    #[tokio::test]
    async fn no_links_means_no_lookups() {
        let lookup = Arc::new(CountingLookup::default());
        let sources: Vec<Box<dyn SearchSource>> = vec![Box::new(StaticSource(Vec::new()))];
        let enumerator = Enumerator::new(sources, lookup.clone(), 5, 10);

        let report = enumerator.run(&domain()).await;

        assert_eq!(0, report.candidates);
        assert_eq!(0, lookup.calls.load(Ordering::SeqCst));
        assert!(report.confirmed.is_empty());
    }

    #[tokio::test]
    async fn resolutions_respect_the_concurrency_cap() {
        let lookup = Arc::new(CountingLookup::default());
        let sources: Vec<Box<dyn SearchSource>> = vec![Box::new(StaticSource(links(12)))];
        let enumerator = Enumerator::new(sources, lookup.clone(), 5, 3);

        let report = enumerator.run(&domain()).await;

        assert_eq!(12, report.attempted);
        let max_in_flight = lookup.max_in_flight.load(Ordering::SeqCst);
        assert!(max_in_flight <= 3);
        assert!(max_in_flight > 1, "resolutions ran one at a time");
        assert_eq!(12, lookup.seen.lock().unwrap().len());
    }

    #[tokio::test]
    async fn queries_respect_the_concurrency_cap() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));
        let sources: Vec<Box<dyn SearchSource>> = (0..8)
            .map(|_| {
                Box::new(SlowSource {
                    in_flight: in_flight.clone(),
                    max_in_flight: max_in_flight.clone(),
                }) as Box<dyn SearchSource>
            })
            .collect();
        let enumerator = Enumerator::new(sources, Arc::new(CountingLookup::default()), 2, 10);

        let (outcomes, urls) = enumerator.query_engines(&domain()).await;

        assert_eq!(8, outcomes.len());
        assert_eq!(8, urls.len());
        let max_in_flight = max_in_flight.load(Ordering::SeqCst);
        assert!(max_in_flight <= 2);
        assert!(max_in_flight > 1, "queries ran one at a time");
    }

    #[tokio::test]
    async fn failing_engines_do_not_poison_the_others() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;
        let page = links(5)
            .iter()
            .map(|link| format!("<a href=\"{link}\">result</a>"))
            .collect::<String>();
        Mock::given(method("GET"))
            .and(path("/up"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page))
            .mount(&server)
            .await;

        let engines = ["/down", "/slow", "/up"]
            .iter()
            .map(|route| EngineTemplate::parse(&format!("{}{}?q=site:{{}}", server.uri(), route)))
            .collect::<Result<Vec<_>>>()
            .unwrap();
        let config = EnumerationConfig::default()
            .with_engines(engines)
            .with_http_timeout(Duration::from_millis(300));
        let lookup = Arc::new(CountingLookup::default());
        let enumerator = Enumerator::from_config(&config).unwrap();
        let enumerator = Enumerator::new(enumerator.sources, lookup, 5, 10);

        let (outcomes, urls) = enumerator.query_engines(&domain()).await;

        let expected: HashSet<String> = links(5).into_iter().map(String::from).collect();
        assert_eq!(5, urls.len());
        assert_eq!(expected, urls.into_iter().collect::<HashSet<String>>());
        let mut counts: Vec<usize> = outcomes.iter().map(|o| o.urls).collect();
        counts.sort();
        assert_eq!(vec![0, 0, 5], counts);
    }

    #[tokio::test]
    async fn invalid_config_fails_before_any_request() {
        let config = EnumerationConfig::default().with_engines(Vec::new());
        assert!(matches!(
            Enumerator::from_config(&config),
            Err(Error::InvalidConfig(_))
        ));

        let result = enumerate(&domain(), &[]).await;
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn injected_dispatch_gets_levelled_events() {
        let logs = LogBuffer::default();
        let dispatch = Dispatch::new(
            tracing_subscriber::fmt()
                .with_max_level(Level::DEBUG)
                .with_ansi(false)
                .with_writer(logs.clone())
                .finish(),
        );
        let lookup = Arc::new(ScriptedLookup(vec![
            ("a.example.com", LookupOutcome::Resolved(1)),
            ("b.example.com", LookupOutcome::NxDomain),
            ("c.example.com", LookupOutcome::Failure("boom".into())),
        ]));
        let sources: Vec<Box<dyn SearchSource>> = vec![Box::new(StaticSource(links(3)))];
        let enumerator = Enumerator::new(sources, lookup, 0, 0).with_dispatch(dispatch);

        let report = enumerator.run(&domain()).await;

        assert_eq!(1, report.confirmed.len());
        let output = logs.contents();
        let line_of = |needle: &str| {
            output
                .lines()
                .find(|line| line.contains(needle))
                .unwrap_or_else(|| panic!("no log line with {needle:?} in:\n{output}"))
                .to_string()
        };
        assert!(line_of("NXDOMAIN for b.example.com").contains("DEBUG"));
        assert!(line_of("DNS resolution error for c.example.com: boom").contains("ERROR"));
        assert!(line_of("Valid subdomain found: a.example.com").contains("INFO"));
    }
}
