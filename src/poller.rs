use std::time::Duration;

use ::time::{format_description::well_known, OffsetDateTime};
use tokio::time::{self, Instant};

use crate::error::{FailureKind, ProbeError};
use crate::probe::Probe;
use crate::progress::{PollEvent, Progress};
use crate::resolver::Resolve;
use crate::types::{
    is_accepted_status, PollConfig, PollOutcome, PollState, ReachabilityResult,
    ResolutionResult, Scheme, Target, Verification,
};

/// Waits for a freshly provisioned host to resolve and then to answer over HTTPS.
///
/// - Resolution goes through the injected [`Resolve`], one query per attempt.
/// - Each reachability attempt probes HTTP first, then HTTPS; an HTTPS TLS
///   failure is retried once, unverified, inside the same attempt.
/// - Every attempt is bounded by `attempt_timeout`, every stage by `total_timeout`;
///   an attempt never runs past the end of its stage.
/// - Narration goes to the injected [`Progress`]; results are returned as values.
pub struct ReachabilityPoller<R, P, S> {
    resolver: R,
    probe: P,
    progress: S,
}

/// Result of a resolution wait plus how many attempts it took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ResolutionRun {
    result: ResolutionResult,
    attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ReachabilityRun {
    result: ReachabilityResult,
    attempts: u32,
    certificate_verified: Option<bool>,
}

impl<R, P, S> ReachabilityPoller<R, P, S>
where
    R: Resolve,
    P: Probe,
    S: Progress,
{
    pub fn new(resolver: R, probe: P, progress: S) -> Self {
        Self {
            resolver,
            probe,
            progress,
        }
    }

    /// Query the upstream resolver until the name resolves or the budget runs out.
    pub async fn wait_for_resolution(
        &self,
        target: &Target,
        config: &PollConfig,
    ) -> ResolutionResult {
        self.resolve_until_deadline(target, config).await.result
    }

    /// Count down the post-resolution grace period, one event per second.
    pub async fn grace_period(&self, target: &Target, config: &PollConfig) {
        let mut remaining = config.grace;
        while !remaining.is_zero() {
            self.emit(target, PollEvent::GraceTick { remaining });
            let step = remaining.min(Duration::from_secs(1));
            time::sleep(step).await;
            remaining -= step;
        }
        self.emit(target, PollEvent::GraceDone);
    }

    /// Probe HTTP then HTTPS until HTTPS answers or the budget runs out.
    ///
    /// HTTP-only availability never counts as success. An HTTPS answer that
    /// needed the unverified downgrade is reported as `HttpsOk`.
    pub async fn wait_for_http_reachability(
        &self,
        target: &Target,
        config: &PollConfig,
    ) -> ReachabilityResult {
        self.probe_until_deadline(target, config).await.result
    }

    /// One HTTP-then-HTTPS attempt.
    ///
    /// Outside a stage each of its up to three requests gets a full `attempt_timeout`.
    pub async fn probe_attempt(&self, target: &Target, config: &PollConfig) -> ReachabilityResult {
        let deadline = Instant::now() + config.attempt_timeout * 3;
        self.attempt_reachability(target, config, deadline, 1).await
    }

    /// Full cycle: resolve, wait out the grace period, probe.
    ///
    /// Nothing is probed unless resolution succeeded.
    pub async fn run(&self, target: &Target, config: &PollConfig) -> PollOutcome {
        let started = Instant::now();
        let mut state = PollState::Idle;

        self.transition(target, &mut state, PollState::ResolvingDns);
        let resolution = self.resolve_until_deadline(target, config).await;
        if !resolution.result.is_resolved() {
            self.transition(target, &mut state, PollState::TimedOut);
            return PollOutcome {
                target: target.clone(),
                resolution: resolution.result,
                reachability: None,
                certificate_verified: None,
                failure: Some(FailureKind::ResolutionTimeout),
                resolution_attempts: resolution.attempts,
                reachability_attempts: 0,
                elapsed_secs: started.elapsed().as_secs_f64(),
                finished_at: now_rfc3339(),
            };
        }

        self.transition(target, &mut state, PollState::ResolvedWaitGrace);
        self.grace_period(target, config).await;

        self.transition(target, &mut state, PollState::ProbingHttp);
        let reach = self.probe_until_deadline(target, config).await;
        let failure = if reach.result.is_https_reachable() {
            self.transition(target, &mut state, PollState::Reachable);
            None
        } else {
            self.transition(target, &mut state, PollState::TimedOut);
            Some(FailureKind::ReachabilityTimeout)
        };

        PollOutcome {
            target: target.clone(),
            resolution: resolution.result,
            reachability: Some(reach.result),
            certificate_verified: reach.certificate_verified,
            failure,
            resolution_attempts: resolution.attempts,
            reachability_attempts: reach.attempts,
            elapsed_secs: started.elapsed().as_secs_f64(),
            finished_at: now_rfc3339(),
        }
    }

    async fn resolve_until_deadline(&self, target: &Target, config: &PollConfig) -> ResolutionRun {
        let started = Instant::now();
        let deadline = started + config.total_timeout;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let budget = attempt_budget(deadline, config);
            let result = time::timeout(budget, self.resolver.resolve_ipv4(target))
                .await
                .unwrap_or(ResolutionResult::TimedOut);
            self.emit(target, PollEvent::ResolutionAttempt { attempt, result });

            if let ResolutionResult::Resolved(address) = result {
                self.emit(
                    target,
                    PollEvent::Resolved {
                        address,
                        attempts: attempt,
                    },
                );
                return ResolutionRun {
                    result,
                    attempts: attempt,
                };
            }

            let Some(pause) = next_pause(started, config) else {
                break;
            };
            self.emit(
                target,
                PollEvent::ResolutionRetry {
                    attempt,
                    retry_in: pause,
                },
            );
            time::sleep(pause).await;
            if started.elapsed() >= config.total_timeout {
                break;
            }
        }

        self.emit(
            target,
            PollEvent::ResolutionTimedOut {
                attempts: attempt,
                budget: config.total_timeout,
            },
        );
        ResolutionRun {
            result: ResolutionResult::TimedOut,
            attempts: attempt,
        }
    }

    async fn probe_until_deadline(&self, target: &Target, config: &PollConfig) -> ReachabilityRun {
        let started = Instant::now();
        let deadline = started + config.total_timeout;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let result = self
                .attempt_reachability(target, config, deadline, attempt)
                .await;
            let reached = match result {
                ReachabilityResult::HttpsOk(status) => Some((status, true)),
                ReachabilityResult::TlsUnverified(status) => Some((status, false)),
                _ => None,
            };
            if let Some((status, verified)) = reached {
                self.emit(target, PollEvent::Reachable { attempt, result });
                return ReachabilityRun {
                    result: ReachabilityResult::HttpsOk(status),
                    attempts: attempt,
                    certificate_verified: Some(verified),
                };
            }

            let Some(pause) = next_pause(started, config) else {
                break;
            };
            time::sleep(pause).await;
            if started.elapsed() >= config.total_timeout {
                break;
            }
        }

        self.emit(
            target,
            PollEvent::ReachabilityTimedOut {
                attempts: attempt,
                budget: config.total_timeout,
            },
        );
        ReachabilityRun {
            result: ReachabilityResult::TimedOut,
            attempts: attempt,
            certificate_verified: None,
        }
    }

    /// HTTP, HTTPS and the unverified HTTPS retry all share `deadline`.
    async fn attempt_reachability(
        &self,
        target: &Target,
        config: &PollConfig,
        deadline: Instant,
        attempt: u32,
    ) -> ReachabilityResult {
        let http_status = match self
            .request(target, Scheme::Http, Verification::Verified, config, deadline)
            .await
        {
            Ok(status) if is_accepted_status(status) => {
                self.emit(target, PollEvent::HttpUp { attempt, status });
                if status == 301 {
                    self.emit(target, PollEvent::HttpRedirectingToHttps { attempt });
                }
                Some(status)
            }
            Ok(status) => {
                self.emit(
                    target,
                    PollEvent::HttpNotUp {
                        attempt,
                        status: Some(status),
                        error: None,
                    },
                );
                None
            }
            Err(error) => {
                self.emit(
                    target,
                    PollEvent::HttpNotUp {
                        attempt,
                        status: None,
                        error: Some(error),
                    },
                );
                None
            }
        };
        let fallback = http_status
            .map(ReachabilityResult::HttpOk)
            .unwrap_or(ReachabilityResult::Unreachable);

        let https = match self
            .request(target, Scheme::Https, Verification::Verified, config, deadline)
            .await
        {
            Err(error @ ProbeError::Tls(_)) => {
                self.emit(target, PollEvent::TlsVerificationFailed { attempt, error });
                self.request(
                    target,
                    Scheme::Https,
                    Verification::Unverified,
                    config,
                    deadline,
                )
                .await
                    .map(|status| (status, Verification::Unverified))
            }
            other => other.map(|status| (status, Verification::Verified)),
        };

        match https {
            Ok((status, Verification::Verified)) if is_accepted_status(status) => {
                ReachabilityResult::HttpsOk(status)
            }
            Ok((status, Verification::Unverified)) if is_accepted_status(status) => {
                ReachabilityResult::TlsUnverified(status)
            }
            Ok((status, _)) => {
                self.emit(target, PollEvent::HttpsUnexpectedStatus { attempt, status });
                fallback
            }
            Err(error) if error.is_connection() && http_status.is_some() => {
                self.emit(target, PollEvent::HttpUpHttpsPending { attempt });
                fallback
            }
            Err(error) => {
                match error.kind() {
                    Some(kind) => {
                        self.emit(target, PollEvent::HttpsUnreachable { attempt, kind });
                    }
                    None => {
                        self.emit(target, PollEvent::UnexpectedError { attempt, error });
                    }
                }
                fallback
            }
        }
    }

    async fn request(
        &self,
        target: &Target,
        scheme: Scheme,
        verification: Verification,
        config: &PollConfig,
        deadline: Instant,
    ) -> Result<u16, ProbeError> {
        time::timeout(
            attempt_budget(deadline, config),
            self.probe.get(target, scheme, verification),
        )
        .await
        .unwrap_or(Err(ProbeError::Timeout))
    }

    fn transition(&self, target: &Target, state: &mut PollState, to: PollState) {
        let from = *state;
        *state = to;
        self.emit(target, PollEvent::StateChanged { from, to });
    }

    fn emit(&self, target: &Target, event: PollEvent) {
        self.progress.emit(target, event);
    }
}

/// Sleep before the next attempt: `interval`, clamped to what is left of the budget.
fn next_pause(started: Instant, config: &PollConfig) -> Option<Duration> {
    let remaining = config.total_timeout.checked_sub(started.elapsed())?;
    if remaining.is_zero() {
        return None;
    }
    Some(config.interval.min(remaining))
}

/// `attempt_timeout`, cut short by the stage deadline.
///
/// Zero once the deadline has passed: the attempt is polled once and then times out.
fn attempt_budget(deadline: Instant, config: &PollConfig) -> Duration {
    config
        .attempt_timeout
        .min(deadline.saturating_duration_since(Instant::now()))
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
