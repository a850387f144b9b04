use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Every way a poll step can fail to produce the evidence it waits for.
///
/// Only the two timeout kinds end a poll; the rest are retried.
#[derive(Error, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    #[error("domain does not exist")]
    DomainNotFound,
    #[error("no answer received yet")]
    NoAnswerYet,
    #[error("dns did not resolve within the time budget")]
    ResolutionTimeout,
    #[error("connection refused or host unreachable")]
    ConnectionRefusedOrUnreachable,
    #[error("certificate not yet valid")]
    CertificateNotYetValid,
    #[error("unexpected http status")]
    UnexpectedHttpStatus,
    #[error("host did not become reachable within the time budget")]
    ReachabilityTimeout,
}

impl FailureKind {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FailureKind::ResolutionTimeout | FailureKind::ReachabilityTimeout
        )
    }
}

/// Failure of a single HTTP(S) request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("tls handshake failed: {0}")]
    Tls(String),
    #[error("request timed out")]
    Timeout,
    #[error("{0}")]
    Other(String),
}

impl ProbeError {
    /// Taxonomy kind, if this error maps onto one.
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            ProbeError::Connect(_) | ProbeError::Timeout => {
                Some(FailureKind::ConnectionRefusedOrUnreachable)
            }
            ProbeError::Tls(_) => Some(FailureKind::CertificateNotYetValid),
            ProbeError::Other(_) => None,
        }
    }

    /// Connection-level failure: nothing answered on the port.
    pub fn is_connection(&self) -> bool {
        matches!(self, ProbeError::Connect(_) | ProbeError::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_timeouts_are_terminal() {
        let all = [
            FailureKind::DomainNotFound,
            FailureKind::NoAnswerYet,
            FailureKind::ResolutionTimeout,
            FailureKind::ConnectionRefusedOrUnreachable,
            FailureKind::CertificateNotYetValid,
            FailureKind::UnexpectedHttpStatus,
            FailureKind::ReachabilityTimeout,
        ];
        let terminal: Vec<_> = all.iter().filter(|k| k.is_terminal()).collect();
        assert_eq!(
            terminal,
            vec![&FailureKind::ResolutionTimeout, &FailureKind::ReachabilityTimeout]
        );
    }

    #[test]
    fn probe_error_kinds() {
        assert_eq!(
            ProbeError::Tls("bad cert".into()).kind(),
            Some(FailureKind::CertificateNotYetValid)
        );
        assert!(ProbeError::Timeout.is_connection());
        assert!(!ProbeError::Tls("x".into()).is_connection());
        assert_eq!(ProbeError::Other("boom".into()).kind(), None);
    }
}
