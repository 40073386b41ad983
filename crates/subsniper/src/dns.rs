use crate::model::{ConfirmedSubdomain, Domain};
use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::proto::error::ProtoErrorKind;
use hickory_resolver::proto::op::ResponseCode;
use hickory_resolver::system_conf::read_system_conf;
use hickory_resolver::TokioAsyncResolver;
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, info, instrument, warn};

pub type DnsResolver = Arc<TokioAsyncResolver>;

/// What a single A lookup ended with. Only `Failure` is a real error, the
/// negatives are the expected bulk of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Resolved(usize),
    NxDomain,
    NoAnswer,
    Timeout,
    Failure(String),
}

#[async_trait]
pub trait ARecordLookup: Send + Sync {
    async fn lookup_a(&self, fqdn: &str) -> LookupOutcome;
}

/// Resolver built from the system configuration (`/etc/resolv.conf` on
/// unix), falling back to hickory's default upstream when it can't be read.
pub fn new_resolver(timeout: Duration) -> DnsResolver {
    let (config, mut opts) = resolver_settings(read_system_conf());
    opts.timeout = timeout;
    debug!("DNS resolver options: {:?}", opts);
    let dns_resolver = TokioAsyncResolver::tokio(config, opts);

    debug!("DNS resolver created: {:?}", dns_resolver);
    Arc::new(dns_resolver)
}

fn resolver_settings<E: std::fmt::Display>(
    system_conf: core::result::Result<(ResolverConfig, ResolverOpts), E>,
) -> (ResolverConfig, ResolverOpts) {
    match system_conf {
        Ok(settings) => settings,
        Err(err) => {
            warn!("System DNS configuration unavailable, using defaults: {}", err);
            (ResolverConfig::default(), ResolverOpts::default())
        }
    }
}

#[async_trait]
impl ARecordLookup for TokioAsyncResolver {
    async fn lookup_a(&self, fqdn: &str) -> LookupOutcome {
        match self.ipv4_lookup(fqdn).await {
            Ok(lookup) => match lookup.iter().count() {
                0 => LookupOutcome::NoAnswer,
                addresses => LookupOutcome::Resolved(addresses),
            },
            Err(err) => classify(&err),
        }
    }
}

fn classify(err: &ResolveError) -> LookupOutcome {
    match err.kind() {
        ResolveErrorKind::NoRecordsFound { response_code, .. }
            if *response_code == ResponseCode::NXDomain =>
        {
            LookupOutcome::NxDomain
        }
        ResolveErrorKind::NoRecordsFound { .. } => LookupOutcome::NoAnswer,
        ResolveErrorKind::Timeout => LookupOutcome::Timeout,
        ResolveErrorKind::Proto(proto) if matches!(proto.kind(), ProtoErrorKind::Timeout) => {
            LookupOutcome::Timeout
        }
        _ => LookupOutcome::Failure(err.to_string()),
    }
}

/// Confirms `candidate.domain` through an A lookup; every failure collapses
/// to `None`.
#[instrument(name = "resolve", level = "debug", skip_all, fields(candidate = candidate))]
pub async fn resolve(
    dns_resolver: &dyn ARecordLookup,
    candidate: &str,
    domain: &Domain,
) -> Option<ConfirmedSubdomain> {
    let fqdn = format!("{}.{}", candidate, domain);

    match dns_resolver.lookup_a(&fqdn).await {
        LookupOutcome::Resolved(addresses) => {
            info!("Valid subdomain found: {} ({} A records)", fqdn, addresses);
            Some(ConfirmedSubdomain::new(fqdn))
        }
        LookupOutcome::NxDomain => {
            debug!("NXDOMAIN for {}", fqdn);
            None
        }
        LookupOutcome::NoAnswer => {
            debug!("No answer for {}", fqdn);
            None
        }
        LookupOutcome::Timeout => {
            debug!("Timeout while resolving {}", fqdn);
            None
        }
        LookupOutcome::Failure(reason) => {
            error!("DNS resolution error for {}: {}", fqdn, reason);
            None
        }
    }
}
