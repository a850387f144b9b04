use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::redirect::Policy;
use reqwest::Client;

use crate::error::ProbeError;
use crate::types::{Scheme, Target, Verification};

/// Redirect hops followed before giving up on a probe.
pub const MAX_REDIRECTS: usize = 10;

/// One GET request against a target, returning the final status code.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn get(
        &self,
        target: &Target,
        scheme: Scheme,
        verification: Verification,
    ) -> Result<u16, ProbeError>;
}

#[async_trait]
impl<T: Probe + ?Sized> Probe for &T {
    async fn get(
        &self,
        target: &Target,
        scheme: Scheme,
        verification: Verification,
    ) -> Result<u16, ProbeError> {
        (**self).get(target, scheme, verification).await
    }
}

/// `reqwest`-backed probe holding one verifying and one non-verifying client.
pub struct HttpProbe {
    verified: Client,
    unverified: Client,
}

impl HttpProbe {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        Ok(Self {
            verified: build_client(request_timeout, Verification::Verified)?,
            unverified: build_client(request_timeout, Verification::Unverified)?,
        })
    }

    fn client(&self, verification: Verification) -> &Client {
        match verification {
            Verification::Verified => &self.verified,
            Verification::Unverified => &self.unverified,
        }
    }

    async fn fetch(&self, url: &str, verification: Verification) -> Result<u16, ProbeError> {
        let response = self
            .client(verification)
            .get(url)
            .send()
            .await
            .map_err(|e| classify_error(&e))?;
        Ok(response.status().as_u16())
    }
}

fn build_client(timeout: Duration, verification: Verification) -> Result<Client> {
    let insecure = verification == Verification::Unverified;
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .redirect(Policy::limited(MAX_REDIRECTS))
        .danger_accept_invalid_certs(insecure)
        .danger_accept_invalid_hostnames(insecure)
        .build()
        .with_context(|| format!("failed to build {verification:?} http client"))
}

#[async_trait]
impl Probe for HttpProbe {
    async fn get(
        &self,
        target: &Target,
        scheme: Scheme,
        verification: Verification,
    ) -> Result<u16, ProbeError> {
        self.fetch(&target.url(scheme), verification).await
    }
}

/// Sort a request error into timeout, TLS, connection or other.
///
/// TLS is checked before connection: reqwest reports handshake failures as
/// connect errors too.
pub fn classify_error(err: &reqwest::Error) -> ProbeError {
    let detail = error_chain(err);
    if err.is_timeout() {
        ProbeError::Timeout
    } else if is_tls_failure(err) {
        ProbeError::Tls(detail)
    } else if err.is_connect() {
        ProbeError::Connect(detail)
    } else {
        ProbeError::Other(detail)
    }
}

fn is_tls_failure(err: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = source {
        if e.downcast_ref::<native_tls::Error>().is_some() {
            return true;
        }
        // io::Error hides its payload from `source()`.
        if let Some(inner) = e.downcast_ref::<io::Error>().and_then(io::Error::get_ref) {
            if inner.is::<native_tls::Error>() {
                return true;
            }
        }
        source = e.source();
    }
    // The top-level message carries the URL, so only sources are inspected.
    err.source()
        .map(|s| looks_like_tls_message(&error_chain(s)))
        .unwrap_or(false)
}

fn looks_like_tls_message(msg: &str) -> bool {
    let msg = msg.to_ascii_lowercase();
    ["certificate", "handshake", "ssl routines"]
        .iter()
        .any(|needle| msg.contains(needle))
}

/// Render an error and all of its sources as one line.
fn error_chain(err: &dyn StdError) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(e) = source {
        out.push_str(": ");
        out.push_str(&e.to_string());
        source = e.source();
    }
    out
}
