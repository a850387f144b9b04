use std::fs::File;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use reach_poll::{
    FailureKind, HttpProbe, LogProgress, PollConfig, PollOutcome, ReachabilityPoller,
    ReachabilityResult, ResolutionResult, Target, UpstreamResolver, DEFAULT_NAMESERVERS,
};

/// reach-poll — wait until a freshly provisioned host resolves in DNS and answers over HTTPS.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "reach-poll",
    version,
    about = "Wait until a freshly provisioned host resolves in DNS and answers over HTTPS.",
    long_about = None
)]
struct Cli {
    /// Fully-qualified host name to poll. Overrides --dns/--domain.
    #[arg(long)]
    host: Option<String>,

    /// Sub-domain of --domain to poll (e.g. `tetris` for tetris.<domain>).
    #[arg(long, default_value = "tetris")]
    dns: String,

    /// Zone the sub-domain lives in.
    #[arg(long, default_value = "yourdomain.com")]
    domain: String,

    /// Budget for each stage (DNS, then HTTP/HTTPS) in seconds.
    #[arg(long = "timeout-secs", default_value_t = 300)]
    timeout_secs: u64,

    /// Pause between attempts in seconds.
    #[arg(
        long = "interval-secs",
        default_value_t = 5,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    interval_secs: u64,

    /// Bound on a single DNS query or HTTP(S) request in seconds.
    #[arg(
        long = "attempt-timeout-secs",
        default_value_t = 5,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    attempt_timeout_secs: u64,

    /// Countdown between DNS resolution and the first HTTP probe in seconds.
    #[arg(long = "grace-secs", default_value_t = 30)]
    grace_secs: u64,

    /// Upstream nameserver to query directly (repeatable).
    #[arg(long = "nameserver", default_values_t = DEFAULT_NAMESERVERS.to_vec())]
    nameservers: Vec<IpAddr>,

    /// Write the outcome as pretty JSON to this path (optional).
    #[arg(long)]
    output: Option<PathBuf>,
}

impl Cli {
    fn target(&self) -> Result<Target> {
        match self.host.as_deref() {
            Some(host) => Target::parse(host),
            None => Target::from_parts(&self.dns, &self.domain),
        }
    }

    fn poll_config(&self) -> PollConfig {
        PollConfig {
            total_timeout: Duration::from_secs(self.timeout_secs),
            interval: Duration::from_secs(self.interval_secs),
            attempt_timeout: Duration::from_secs(self.attempt_timeout_secs),
            grace: Duration::from_secs(self.grace_secs),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reach_poll=info".into()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let target = cli.target()?;
    let config = cli.poll_config();
    let resolver = UpstreamResolver::new(&cli.nameservers, config.attempt_timeout)
        .context("failed to configure upstream resolver")?;
    let probe = HttpProbe::new(config.attempt_timeout).context("failed to build http probe")?;

    println!("reach-poll configuration:");
    println!("  host            : {target}");
    println!("  timeout_secs    : {}", config.total_timeout.as_secs());
    println!("  interval_secs   : {}", config.interval.as_secs());
    println!("  attempt_timeout : {}", config.attempt_timeout.as_secs());
    println!("  grace_secs      : {}", config.grace.as_secs());
    println!(
        "  nameservers     : {}",
        resolver
            .nameservers()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!(
        "  output          : {}",
        cli.output
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<none>".to_string())
    );

    let poller = ReachabilityPoller::new(resolver, probe, LogProgress);

    info!(host = %target, "waiting for {target} to be reachable");
    let outcome = poller.run(&target, &config).await;
    print_summary(&outcome);

    if let Some(path) = cli.output.as_deref() {
        if let Err(e) = write_outcome_json(path, &outcome) {
            eprintln!("Failed to write JSON to {}: {}", path.display(), e);
        } else {
            println!("Wrote JSON outcome to {}", path.display());
        }
    }

    Ok(exit_code(&outcome))
}

fn print_summary(outcome: &PollOutcome) {
    println!("\nhost            : {}", outcome.target);
    let address = match outcome.resolution {
        ResolutionResult::Resolved(addr) => addr.to_string(),
        _ => "<unresolved>".to_string(),
    };
    println!("address         : {address}");
    let reach = match outcome.reachability {
        Some(ReachabilityResult::HttpsOk(status)) => format!("https (status {status})"),
        Some(ReachabilityResult::TimedOut) => "timed out".to_string(),
        Some(other) => format!("{other:?}"),
        None => "<not probed>".to_string(),
    };
    println!("reachability    : {reach}");
    if let Some(verified) = outcome.certificate_verified {
        println!(
            "certificate     : {}",
            if verified { "verified" } else { "NOT verified" }
        );
    }
    if let Some(failure) = outcome.failure {
        println!("failure         : {failure}");
    }
    println!(
        "attempts        : {} dns, {} http/https",
        outcome.resolution_attempts, outcome.reachability_attempts
    );
    println!("total elapsed   : {:.2} seconds", outcome.elapsed_secs);
}

fn exit_code(outcome: &PollOutcome) -> ExitCode {
    match outcome.failure {
        None => ExitCode::SUCCESS,
        Some(FailureKind::ResolutionTimeout) => ExitCode::from(2),
        Some(_) => ExitCode::from(3),
    }
}

fn write_outcome_json(path: &Path, outcome: &PollOutcome) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, outcome)?;
    Ok(())
}
