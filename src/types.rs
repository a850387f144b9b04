use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::error::FailureKind;

/// Status codes that count as "the server answered".
pub const ACCEPTED_STATUSES: [u16; 3] = [200, 301, 302];

pub fn is_accepted_status(status: u16) -> bool {
    ACCEPTED_STATUSES.contains(&status)
}

/// A fully-qualified domain name to poll.
///
/// Normalized on construction: trimmed, lowercased, trailing root dot removed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Target(String);

impl Target {
    /// Parse and validate a host name.
    ///
    /// Rejects anything that looks like a URL (scheme, path, port) rather than a bare name.
    pub fn parse(raw: &str) -> Result<Self> {
        let name = raw.trim().trim_end_matches('.').to_ascii_lowercase();
        if name.is_empty() {
            bail!("host name is empty");
        }
        if name.contains("://") {
            bail!("expected a bare host name, got a URL: {raw}");
        }
        if let Some(c) = name
            .chars()
            .find(|c| c.is_whitespace() || matches!(c, '/' | ':' | '?' | '#' | '@'))
        {
            bail!("invalid character {c:?} in host name: {raw}");
        }
        if name.len() > 253 {
            bail!("host name longer than 253 bytes: {raw}");
        }
        for label in name.split('.') {
            if label.is_empty() {
                bail!("empty label in host name: {raw}");
            }
            if label.len() > 63 {
                bail!("label longer than 63 bytes in host name: {label}");
            }
        }
        Ok(Self(name))
    }

    /// Join a sub-domain and a zone, e.g. `tetris` + `example.com`.
    pub fn from_parts(subdomain: &str, zone: &str) -> Result<Self> {
        let sub = subdomain.trim().trim_end_matches('.');
        let zone = zone.trim().trim_start_matches('.');
        if sub.is_empty() {
            return Self::parse(zone);
        }
        Self::parse(&format!("{sub}.{zone}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn url(&self, scheme: Scheme) -> String {
        format!("{}://{}", scheme, self.0)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Scheme {
    Http,
    Https,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Http => f.write_str("http"),
            Scheme::Https => f.write_str("https"),
        }
    }
}

/// Whether an HTTPS request enforces certificate verification.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Verification {
    Verified,
    Unverified,
}

/// Outcome of one resolution attempt, or of a whole resolution wait.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "kind", content = "address", rename_all = "snake_case")]
pub enum ResolutionResult {
    Resolved(Ipv4Addr),
    NotFound,
    NoAnswer,
    TimedOut,
}

impl ResolutionResult {
    pub fn address(&self) -> Option<Ipv4Addr> {
        match self {
            ResolutionResult::Resolved(addr) => Some(*addr),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.address().is_some()
    }

    /// Failure kind of a single unsuccessful attempt.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ResolutionResult::Resolved(_) => None,
            ResolutionResult::NotFound => Some(FailureKind::DomainNotFound),
            ResolutionResult::NoAnswer => Some(FailureKind::NoAnswerYet),
            ResolutionResult::TimedOut => Some(FailureKind::ResolutionTimeout),
        }
    }
}

/// Outcome of one HTTP-then-HTTPS attempt, or of a whole reachability wait.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "kind", content = "status", rename_all = "snake_case")]
pub enum ReachabilityResult {
    /// HTTP answered, HTTPS did not.
    HttpOk(u16),
    HttpsOk(u16),
    Unreachable,
    /// HTTPS answered only after disabling certificate verification.
    TlsUnverified(u16),
    TimedOut,
}

impl ReachabilityResult {
    /// True when HTTPS answered with an accepted status, verified or not.
    pub fn is_https_reachable(&self) -> bool {
        matches!(
            self,
            ReachabilityResult::HttpsOk(_) | ReachabilityResult::TlsUnverified(_)
        )
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ReachabilityResult::HttpOk(s)
            | ReachabilityResult::HttpsOk(s)
            | ReachabilityResult::TlsUnverified(s) => Some(*s),
            ReachabilityResult::Unreachable | ReachabilityResult::TimedOut => None,
        }
    }
}

/// Timing knobs for one poll cycle.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Budget for each wait stage.
    pub total_timeout: Duration,
    /// Sleep between attempts.
    pub interval: Duration,
    /// Bound on one DNS query or one HTTP(S) request.
    pub attempt_timeout: Duration,
    /// Countdown between resolution and the first HTTP probe.
    pub grace: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            total_timeout: Duration::from_secs(300),
            interval: Duration::from_secs(5),
            attempt_timeout: Duration::from_secs(5),
            grace: Duration::from_secs(30),
        }
    }
}

/// Where a poll cycle currently is.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    Idle,
    ResolvingDns,
    ResolvedWaitGrace,
    ProbingHttp,
    Reachable,
    TimedOut,
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PollState::Reachable | PollState::TimedOut)
    }
}

impl fmt::Display for PollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PollState::Idle => "idle",
            PollState::ResolvingDns => "resolving dns",
            PollState::ResolvedWaitGrace => "resolved, waiting grace period",
            PollState::ProbingHttp => "probing http/https",
            PollState::Reachable => "reachable",
            PollState::TimedOut => "timed out",
        };
        f.write_str(s)
    }
}

/// Final structured outcome of a full poll cycle.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PollOutcome {
    pub target: Target,
    pub resolution: ResolutionResult,
    /// Absent when resolution never succeeded.
    pub reachability: Option<ReachabilityResult>,
    pub certificate_verified: Option<bool>,
    pub failure: Option<FailureKind>,
    pub resolution_attempts: u32,
    pub reachability_attempts: u32,
    pub elapsed_secs: f64,
    pub finished_at: String,
}

impl PollOutcome {
    pub fn final_state(&self) -> PollState {
        match self.reachability {
            Some(r) if r.is_https_reachable() => PollState::Reachable,
            _ => PollState::TimedOut,
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.final_state() == PollState::Reachable
    }
}
