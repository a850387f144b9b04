use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::proto::op::ResponseCode;
use hickory_resolver::TokioAsyncResolver;
use tracing::debug;

use crate::types::{ResolutionResult, Target};

pub const DNS_PORT: u16 = 53;

/// Public resolvers queried when none are configured.
pub const DEFAULT_NAMESERVERS: [IpAddr; 2] = [
    IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)),
    IpAddr::V4(Ipv4Addr::new(8, 8, 4, 4)),
];

/// One IPv4 lookup for a target.
///
/// Implementations report every outcome as a value; the poller decides what to retry.
#[async_trait]
pub trait Resolve: Send + Sync {
    async fn resolve_ipv4(&self, target: &Target) -> ResolutionResult;
}

#[async_trait]
impl<T: Resolve + ?Sized> Resolve for &T {
    async fn resolve_ipv4(&self, target: &Target) -> ResolutionResult {
        (**self).resolve_ipv4(target).await
    }
}

/// Queries a fixed list of upstream nameservers directly.
///
/// The system resolver, `/etc/hosts` and any answer cache are bypassed, so a
/// record created moments ago is not masked by a cached NXDOMAIN.
pub struct UpstreamResolver {
    inner: TokioAsyncResolver,
    nameservers: Vec<IpAddr>,
}

impl UpstreamResolver {
    pub fn new(nameservers: &[IpAddr], attempt_timeout: Duration) -> Result<Self> {
        if nameservers.is_empty() {
            bail!("at least one upstream nameserver is required");
        }
        let group = NameServerConfigGroup::from_ips_clear(nameservers, DNS_PORT, true);
        let config = ResolverConfig::from_parts(None, Vec::new(), group);

        let mut opts = ResolverOpts::default();
        opts.timeout = attempt_timeout;
        opts.attempts = 1;
        opts.cache_size = 0;
        opts.negative_max_ttl = Some(Duration::ZERO);
        opts.use_hosts_file = false;

        Ok(Self {
            inner: TokioAsyncResolver::tokio(config, opts),
            nameservers: nameservers.to_vec(),
        })
    }

    pub fn nameservers(&self) -> &[IpAddr] {
        &self.nameservers
    }
}

#[async_trait]
impl Resolve for UpstreamResolver {
    async fn resolve_ipv4(&self, target: &Target) -> ResolutionResult {
        // Absolute name: no search-domain expansion.
        let fqdn = format!("{}.", target.as_str());
        match self.inner.ipv4_lookup(fqdn.as_str()).await {
            Ok(lookup) => match lookup.iter().next() {
                Some(a) => ResolutionResult::Resolved(a.0),
                None => ResolutionResult::NoAnswer,
            },
            Err(err) => classify_error(&err),
        }
    }
}

/// Map a resolver error onto the three retryable negative outcomes.
pub fn classify_error(err: &ResolveError) -> ResolutionResult {
    match err.kind() {
        ResolveErrorKind::NoRecordsFound { response_code, .. }
            if *response_code == ResponseCode::NXDomain =>
        {
            ResolutionResult::NotFound
        }
        ResolveErrorKind::NoRecordsFound { .. } => ResolutionResult::NoAnswer,
        ResolveErrorKind::Timeout => ResolutionResult::TimedOut,
        _ => {
            debug!(error = %err, "dns query failed, treating as no answer");
            ResolutionResult::NoAnswer
        }
    }
}
