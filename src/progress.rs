use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Mutex;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{FailureKind, ProbeError};
use crate::types::{PollState, ReachabilityResult, ResolutionResult, Target};

/// Something observable happened during a poll cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    StateChanged {
        from: PollState,
        to: PollState,
    },
    ResolutionAttempt {
        attempt: u32,
        result: ResolutionResult,
    },
    /// A failed attempt will be followed by another after `retry_in`.
    ResolutionRetry {
        attempt: u32,
        retry_in: Duration,
    },
    Resolved {
        address: Ipv4Addr,
        attempts: u32,
    },
    ResolutionTimedOut {
        attempts: u32,
        budget: Duration,
    },
    GraceTick {
        remaining: Duration,
    },
    GraceDone,
    HttpUp {
        attempt: u32,
        status: u16,
    },
    HttpRedirectingToHttps {
        attempt: u32,
    },
    HttpNotUp {
        attempt: u32,
        status: Option<u16>,
        error: Option<ProbeError>,
    },
    /// Verified HTTPS failed on TLS; retrying the same attempt unverified.
    TlsVerificationFailed {
        attempt: u32,
        error: ProbeError,
    },
    HttpsUnexpectedStatus {
        attempt: u32,
        status: u16,
    },
    /// HTTP answers but HTTPS does not accept connections yet.
    HttpUpHttpsPending {
        attempt: u32,
    },
    HttpsUnreachable {
        attempt: u32,
        kind: FailureKind,
    },
    UnexpectedError {
        attempt: u32,
        error: ProbeError,
    },
    Reachable {
        attempt: u32,
        result: ReachabilityResult,
    },
    ReachabilityTimedOut {
        attempts: u32,
        budget: Duration,
    },
}

impl PollEvent {
    /// Events that describe a problem rather than progress.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            PollEvent::ResolutionTimedOut { .. }
                | PollEvent::ReachabilityTimedOut { .. }
                | PollEvent::TlsVerificationFailed { .. }
                | PollEvent::HttpsUnexpectedStatus { .. }
                | PollEvent::UnexpectedError { .. }
        )
    }

    /// Failure kind carried by the event, if it reports one.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            PollEvent::ResolutionAttempt { result, .. } => result.failure_kind(),
            PollEvent::ResolutionTimedOut { .. } => Some(FailureKind::ResolutionTimeout),
            PollEvent::HttpNotUp {
                status: Some(_), ..
            }
            | PollEvent::HttpsUnexpectedStatus { .. } => Some(FailureKind::UnexpectedHttpStatus),
            PollEvent::HttpNotUp {
                error: Some(error),
                ..
            }
            | PollEvent::TlsVerificationFailed { error, .. } => error.kind(),
            PollEvent::HttpsUnreachable { kind, .. } => Some(*kind),
            PollEvent::ReachabilityTimedOut { .. } => Some(FailureKind::ReachabilityTimeout),
            _ => None,
        }
    }
}

impl fmt::Display for PollEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollEvent::StateChanged { from, to } => write!(f, "state: {from} -> {to}"),
            PollEvent::ResolutionAttempt { attempt, result } => match result {
                ResolutionResult::Resolved(addr) => {
                    write!(f, "attempt {attempt}: dns resolved to {addr}")
                }
                ResolutionResult::NotFound => {
                    write!(f, "attempt {attempt}: dns name does not exist")
                }
                ResolutionResult::NoAnswer => {
                    write!(f, "attempt {attempt}: no dns answer received")
                }
                ResolutionResult::TimedOut => write!(f, "attempt {attempt}: dns query timed out"),
            },
            PollEvent::ResolutionRetry { attempt, retry_in } => write!(
                f,
                "attempt {attempt}: dns not resolved yet, retrying in {}s",
                retry_in.as_secs()
            ),
            PollEvent::Resolved { address, attempts } => {
                write!(f, "dns resolved to {address} after {attempts} attempt(s)")
            }
            PollEvent::ResolutionTimedOut { attempts, budget } => write!(
                f,
                "dns did not resolve within {}s ({attempts} attempts)",
                budget.as_secs()
            ),
            PollEvent::GraceTick { remaining } => {
                write!(f, "{}s remaining before probing", remaining.as_secs())
            }
            PollEvent::GraceDone => f.write_str("grace period over, probing"),
            PollEvent::HttpUp { attempt, status } => {
                write!(f, "attempt {attempt}: http available (status {status})")
            }
            PollEvent::HttpRedirectingToHttps { attempt } => {
                write!(f, "attempt {attempt}: http redirects to https")
            }
            PollEvent::HttpNotUp {
                attempt,
                status,
                error,
            } => match (status, error) {
                (Some(s), _) => write!(f, "attempt {attempt}: http answered {s}"),
                (None, Some(e)) => write!(f, "attempt {attempt}: http failed: {e}"),
                (None, None) => write!(f, "attempt {attempt}: http not available"),
            },
            PollEvent::TlsVerificationFailed { attempt, error } => write!(
                f,
                "attempt {attempt}: tls verification failed ({error}), retrying unverified"
            ),
            PollEvent::HttpsUnexpectedStatus { attempt, status } => {
                write!(f, "attempt {attempt}: unexpected https response {status}")
            }
            PollEvent::HttpUpHttpsPending { attempt } => write!(
                f,
                "attempt {attempt}: https is not available yet, but http is working"
            ),
            PollEvent::HttpsUnreachable { attempt, kind } => {
                write!(f, "attempt {attempt}: host not reachable yet ({kind})")
            }
            PollEvent::UnexpectedError { attempt, error } => {
                write!(f, "attempt {attempt}: unexpected error: {error}")
            }
            PollEvent::Reachable { attempt, result } => match result {
                ReachabilityResult::TlsUnverified(s) => write!(
                    f,
                    "attempt {attempt}: reachable over https with an unverified certificate (status {s})"
                ),
                other => write!(
                    f,
                    "attempt {attempt}: reachable over https (status {})",
                    other.status().unwrap_or_default()
                ),
            },
            PollEvent::ReachabilityTimedOut { attempts, budget } => write!(
                f,
                "host did not become reachable within {}s ({attempts} attempts)",
                budget.as_secs()
            ),
        }
    }
}

/// Receiver of poll events.
pub trait Progress: Send + Sync {
    fn emit(&self, target: &Target, event: PollEvent);
}

/// Renders events as `tracing` records.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl Progress for LogProgress {
    fn emit(&self, target: &Target, event: PollEvent) {
        let kind = event.failure_kind().map(|k| k.to_string());
        if event.is_warning() {
            warn!(host = %target, kind = kind.as_deref(), "{event}");
        } else {
            info!(host = %target, kind = kind.as_deref(), "{event}");
        }
    }
}

/// Keeps every event in memory, in order.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<PollEvent>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PollEvent> {
        self.events
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl Progress for RecordingProgress {
    fn emit(&self, _target: &Target, event: PollEvent) {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(event);
        }
    }
}

impl<P: Progress + ?Sized> Progress for &P {
    fn emit(&self, target: &Target, event: PollEvent) {
        (**self).emit(target, event)
    }
}
