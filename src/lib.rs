//! Library crate for reach-poll: wait until a freshly provisioned host resolves
//! through an upstream DNS resolver and answers over HTTPS.
pub mod error;
pub mod poller;
pub mod probe;
pub mod progress;
pub mod resolver;
pub mod types;

pub use error::{FailureKind, ProbeError};
pub use poller::ReachabilityPoller;
pub use probe::{HttpProbe, Probe};
pub use progress::{LogProgress, PollEvent, Progress, RecordingProgress};
pub use resolver::{Resolve, UpstreamResolver, DEFAULT_NAMESERVERS};
pub use types::{
    PollConfig, PollOutcome, PollState, ReachabilityResult, ResolutionResult, Scheme, Target,
    Verification,
};
