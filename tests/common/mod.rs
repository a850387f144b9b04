#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use reach_poll::{Probe, ProbeError, Resolve, ResolutionResult, Scheme, Target, Verification};

/// Replays scripted answers; the last one repeats forever.
pub struct ScriptedResolver {
    answers: Mutex<VecDeque<ResolutionResult>>,
    pub calls: AtomicU32,
}

impl ScriptedResolver {
    pub fn new(answers: Vec<ResolutionResult>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn always(answer: ResolutionResult) -> Self {
        Self::new(vec![answer])
    }

    pub fn resolving_to(ip: Ipv4Addr) -> Self {
        Self::always(ResolutionResult::Resolved(ip))
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Resolve for ScriptedResolver {
    async fn resolve_ipv4(&self, _target: &Target) -> ResolutionResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut answers = self.answers.lock().unwrap();
        if answers.len() > 1 {
            answers.pop_front().unwrap()
        } else {
            *answers.front().expect("script has at least one answer")
        }
    }
}

type Responder = dyn Fn(Scheme, Verification) -> Result<u16, ProbeError> + Send + Sync;

/// Answers each request from a closure and records what was asked.
pub struct ScriptedProbe {
    respond: Box<Responder>,
    pub requests: Mutex<Vec<(Scheme, Verification)>>,
}

impl ScriptedProbe {
    pub fn new(
        respond: impl Fn(Scheme, Verification) -> Result<u16, ProbeError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            respond: Box::new(respond),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<(Scheme, Verification)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, scheme: Scheme, verification: Verification) -> usize {
        self.requests()
            .into_iter()
            .filter(|r| *r == (scheme, verification))
            .count()
    }
}

#[async_trait]
impl Probe for ScriptedProbe {
    async fn get(
        &self,
        _target: &Target,
        scheme: Scheme,
        verification: Verification,
    ) -> Result<u16, ProbeError> {
        self.requests.lock().unwrap().push((scheme, verification));
        (self.respond)(scheme, verification)
    }
}

pub fn target() -> Target {
    Target::parse("demo.example.com").unwrap()
}

pub fn refused() -> ProbeError {
    ProbeError::Connect("tcp connect error: Connection refused (os error 111)".into())
}

pub fn bad_cert() -> ProbeError {
    ProbeError::Tls("certificate verify failed".into())
}

/// Paused-clock sleeps land on millisecond ticks; allow that much drift.
pub fn assert_elapsed(started: tokio::time::Instant, expected: std::time::Duration) {
    let elapsed = started.elapsed();
    let slack = std::time::Duration::from_millis(50);
    assert!(
        elapsed >= expected && elapsed <= expected + slack,
        "elapsed {elapsed:?}, expected {expected:?}"
    );
}
