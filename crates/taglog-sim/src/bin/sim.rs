#![forbid(unsafe_code)]

use std::env;
use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;
use taglog_sim::campaign::{CampaignConfig, load_campaign_config, replay_seed, run_campaign};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "taglog-sim: deterministic conditional-append simulation",
    long_about = None
)]
struct Cli {
    /// Campaign config file (TOML). Flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of seeds to run, starting at --first-seed.
    #[arg(long)]
    seeds: Option<u64>,

    /// First seed of the campaign.
    #[arg(long)]
    first_seed: Option<u64>,

    /// Agents per simulation.
    #[arg(long)]
    agents: Option<usize>,

    /// Rounds per simulation.
    #[arg(long)]
    rounds: Option<u64>,

    /// Distinct resources agents contend on.
    #[arg(long)]
    resources: Option<usize>,

    /// Replay one seed and print its full trace instead of running a campaign.
    #[arg(long)]
    replay: Option<u64>,

    /// Emit JSON output instead of human-readable text.
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn campaign_config(&self) -> Result<CampaignConfig> {
        let mut config = match &self.config {
            Some(path) => load_campaign_config(path)?,
            None => CampaignConfig::default(),
        };

        let start = self.first_seed.unwrap_or(config.seed_range.start);
        let len = self
            .seeds
            .unwrap_or_else(|| config.seed_range.end.saturating_sub(config.seed_range.start));
        config.seed_range = start..start.saturating_add(len);
        if let Some(agents) = self.agents {
            config.agent_count = agents;
        }
        if let Some(rounds) = self.rounds {
            config.rounds = rounds;
        }
        if let Some(resources) = self.resources {
            config.resource_count = resources;
        }
        Ok(config)
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("TAGLOG_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "taglog=debug,info"
        } else {
            "taglog=info,warn"
        })
    });

    let format = env::var("TAGLOG_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry.with(fmt::layer().json().with_ansi(false)).init();
        }
        _ => {
            registry.with(fmt::layer().compact()).init();
        }
    }
}

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = cli.campaign_config()?;

    if let Some(seed) = cli.replay {
        let trace = replay_seed(seed, &config)?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&trace.result.trace)?);
        } else {
            for event in &trace.result.trace {
                println!("round {:>3}  {:?}", event.round, event.kind);
            }
            for entry in &trace.result.log {
                println!("{entry}");
            }
        }
        println!(
            "replay seed={seed} events={} commits={} rejections={} passed={}",
            trace.result.log.len(),
            trace.result.commits(),
            trace.result.rejections(),
            trace.oracle.passed
        );
        if !trace.oracle.passed {
            bail!("seed {seed} violated {} invariant(s): {:?}", trace.oracle.violations.len(), trace.oracle.violations);
        }
        return Ok(());
    }

    let report = run_campaign(&config)?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "campaign complete: seeds={} passed={} interesting={} commits={} rejections={}",
            report.seeds_run,
            report.seeds_passed,
            report.interesting_states_reached,
            report.commits,
            report.rejections
        );
        for failure in &report.failures {
            println!("seed {}:", failure.seed);
            for violation in &failure.violations {
                println!("  {violation}");
            }
        }
    }

    if let Some(seed) = report.first_failure {
        bail!("{} seed(s) failed; replay with --replay {seed}", report.failures.len());
    }
    Ok(())
}
