mod common;

use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;
use common::{assert_elapsed, target, ScriptedProbe, ScriptedResolver};
use reach_poll::{
    PollConfig, PollEvent, ReachabilityPoller, RecordingProgress, Resolve, ResolutionResult,
    Target,
};
use tokio::time::Instant;

fn config(total_secs: u64, interval_secs: u64) -> PollConfig {
    PollConfig {
        total_timeout: Duration::from_secs(total_secs),
        interval: Duration::from_secs(interval_secs),
        attempt_timeout: Duration::from_secs(2),
        grace: Duration::ZERO,
    }
}

fn unused_probe() -> ScriptedProbe {
    ScriptedProbe::new(|_, _| panic!("resolution must not issue http requests"))
}

#[tokio::test(start_paused = true)]
async fn resolves_after_three_nxdomain_answers() {
    let resolver = ScriptedResolver::new(vec![
        ResolutionResult::NotFound,
        ResolutionResult::NotFound,
        ResolutionResult::NotFound,
        ResolutionResult::Resolved(Ipv4Addr::new(1, 2, 3, 4)),
    ]);
    let probe = unused_probe();
    let progress = RecordingProgress::new();
    let poller = ReachabilityPoller::new(&resolver, &probe, &progress);

    let started = Instant::now();
    let result = poller.wait_for_resolution(&target(), &config(300, 5)).await;

    assert_eq!(result, ResolutionResult::Resolved(Ipv4Addr::new(1, 2, 3, 4)));
    assert_eq!(resolver.calls(), 4);
    assert_elapsed(started, Duration::from_secs(15));
    assert!(progress.events().contains(&PollEvent::Resolved {
        address: Ipv4Addr::new(1, 2, 3, 4),
        attempts: 4,
    }));
}

#[tokio::test(start_paused = true)]
async fn stops_at_first_success() {
    let resolver = ScriptedResolver::new(vec![
        ResolutionResult::NoAnswer,
        ResolutionResult::Resolved(Ipv4Addr::new(10, 0, 0, 7)),
        ResolutionResult::NotFound,
    ]);
    let probe = unused_probe();
    let progress = RecordingProgress::new();
    let poller = ReachabilityPoller::new(&resolver, &probe, &progress);

    let result = poller.wait_for_resolution(&target(), &config(300, 5)).await;

    assert_eq!(result.address(), Some(Ipv4Addr::new(10, 0, 0, 7)));
    assert_eq!(resolver.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn nxdomain_forever_times_out_within_budget() {
    let resolver = ScriptedResolver::always(ResolutionResult::NotFound);
    let probe = unused_probe();
    let progress = RecordingProgress::new();
    let poller = ReachabilityPoller::new(&resolver, &probe, &progress);

    let started = Instant::now();
    let result = poller.wait_for_resolution(&target(), &config(20, 5)).await;

    assert_eq!(result, ResolutionResult::TimedOut);
    // ceil(20 / 5) attempts, well under the ceil(T/i) + 1 bound.
    assert_eq!(resolver.calls(), 4);
    assert_elapsed(started, Duration::from_secs(20));

    let events = progress.events();
    assert_eq!(
        events.last(),
        Some(&PollEvent::ResolutionTimedOut {
            attempts: 4,
            budget: Duration::from_secs(20),
        })
    );
    assert!(!events
        .iter()
        .any(|e| matches!(e, PollEvent::Resolved { .. })));
}

#[tokio::test(start_paused = true)]
async fn uneven_budget_clamps_the_last_pause() {
    let resolver = ScriptedResolver::always(ResolutionResult::NoAnswer);
    let probe = unused_probe();
    let progress = RecordingProgress::new();
    let poller = ReachabilityPoller::new(&resolver, &probe, &progress);

    let started = Instant::now();
    let result = poller.wait_for_resolution(&target(), &config(22, 5)).await;

    assert_eq!(result, ResolutionResult::TimedOut);
    assert_eq!(resolver.calls(), 5);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(22));
    assert!(elapsed <= Duration::from_secs(27));
    let last_pause = progress.events().into_iter().find_map(|e| match e {
        PollEvent::ResolutionRetry {
            attempt: 5,
            retry_in,
        } => Some(retry_in),
        _ => None,
    });
    assert!(last_pause.is_some_and(|p| p <= Duration::from_secs(2)));
}

#[tokio::test(start_paused = true)]
async fn every_negative_outcome_is_retried_the_same_way() {
    let resolver = ScriptedResolver::new(vec![
        ResolutionResult::NotFound,
        ResolutionResult::NoAnswer,
        ResolutionResult::TimedOut,
        ResolutionResult::Resolved(Ipv4Addr::new(192, 0, 2, 1)),
    ]);
    let probe = unused_probe();
    let progress = RecordingProgress::new();
    let poller = ReachabilityPoller::new(&resolver, &probe, &progress);

    let result = poller.wait_for_resolution(&target(), &config(300, 5)).await;

    assert!(result.is_resolved());
    let retries = progress
        .events()
        .into_iter()
        .filter(|e| matches!(e, PollEvent::ResolutionRetry { .. }))
        .count();
    assert_eq!(retries, 3);
}

struct HangingResolver;

#[async_trait]
impl Resolve for HangingResolver {
    async fn resolve_ipv4(&self, _target: &Target) -> ResolutionResult {
        std::future::pending::<ResolutionResult>().await
    }
}

#[tokio::test(start_paused = true)]
async fn hung_query_counts_as_attempt_timeout() {
    let probe = unused_probe();
    let progress = RecordingProgress::new();
    let poller = ReachabilityPoller::new(HangingResolver, &probe, &progress);

    let started = Instant::now();
    let result = poller.wait_for_resolution(&target(), &config(20, 5)).await;

    assert_eq!(result, ResolutionResult::TimedOut);
    assert_elapsed(started, Duration::from_secs(20));
    let attempts: Vec<_> = progress
        .events()
        .into_iter()
        .filter_map(|e| match e {
            PollEvent::ResolutionAttempt { result, .. } => Some(result),
            _ => None,
        })
        .collect();
    assert_eq!(attempts, vec![ResolutionResult::TimedOut; 3]);
}

#[tokio::test(start_paused = true)]
async fn slow_queries_never_outlive_the_budget() {
    let probe = unused_probe();
    let progress = RecordingProgress::new();
    let poller = ReachabilityPoller::new(HangingResolver, &probe, &progress);
    let cfg = PollConfig {
        total_timeout: Duration::from_secs(12),
        interval: Duration::from_secs(1),
        attempt_timeout: Duration::from_secs(4),
        grace: Duration::ZERO,
    };

    let started = Instant::now();
    let result = poller.wait_for_resolution(&target(), &cfg).await;

    assert_eq!(result, ResolutionResult::TimedOut);
    assert!(started.elapsed() <= cfg.total_timeout + cfg.interval);
    // 0-4s, 5-9s, then 10-12s cut short by the budget.
    assert_elapsed(started, Duration::from_secs(12));
    let attempts = progress
        .events()
        .into_iter()
        .filter(|e| matches!(e, PollEvent::ResolutionAttempt { .. }))
        .count();
    assert_eq!(attempts, 3);
}
