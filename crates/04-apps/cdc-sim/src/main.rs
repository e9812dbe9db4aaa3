//! Command-line driver for the clock-domain crossing scenarios.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use cdc_scenarios::{
    run_scenario, run_threaded, verify_report, ArcStatsSink, ScenarioConfig, ScenarioKind,
    ScenarioReport,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Text rendering helpers used by the CLI commands.
mod render {
    use cdc_scenarios::{CheckResult, ScenarioReport, ScenarioStats};
    use std::fmt::Write;

    /// Format the counters of a finished run.
    pub fn stats(stats: &ScenarioStats) -> String {
        let mut out = String::new();
        writeln!(out, "ticks: a={} b={}", stats.a_ticks, stats.b_ticks).expect("write ticks");
        writeln!(
            out,
            "responses: issued={} ok={} error={} retry={}",
            stats.issued, stats.acks, stats.errors, stats.retries
        )
        .expect("write responses");
        writeln!(
            out,
            "stalls: upstream={} downstream={}",
            stats.upstream_stalls, stats.downstream_stalls
        )
        .expect("write stalls");
        writeln!(
            out,
            "peak: occupancy={} outstanding={}",
            stats.max_occupancy, stats.max_outstanding
        )
        .expect("write peaks");
        writeln!(
            out,
            "cancel tokens={} violations={}",
            stats.tokens, stats.violations
        )
        .expect("write tokens");
        out
    }

    /// One line per check, failures carrying their reason.
    pub fn checks(results: &[(&'static str, CheckResult)]) -> String {
        let mut out = String::new();
        for (name, result) in results {
            let line = match result {
                Ok(()) => writeln!(out, "{name:<16} ok"),
                Err(why) => writeln!(out, "{name:<16} FAIL {why}"),
            };
            line.expect("write check");
        }
        out
    }

    /// Compact single-line result used by `sweep`.
    pub fn sweep_line(report: &ScenarioReport, failed: usize) -> String {
        let verdict = if failed == 0 {
            "ok".to_string()
        } else {
            format!("{failed} failed")
        };
        format!(
            "seed {:>4}: responses={} a_ticks={} b_ticks={} peak={} {verdict}\n",
            report.config.seed,
            report.responses.len(),
            report.stats.a_ticks,
            report.stats.b_ticks,
            report.stats.max_occupancy
        )
    }
}

/// Drive scripted traffic across the skid-buffer crossing and check it.
#[derive(Parser, Debug)]
#[command(author, version, about = "Simulate the clock-domain crossing", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one scenario and print its stats and check results.
    Run {
        #[command(flatten)]
        scenario: ScenarioArgs,
        /// Run each domain on its own thread instead of the seeded scheduler.
        #[arg(long)]
        threaded: bool,
    },
    /// Run the same scenario over a range of seeds.
    Sweep {
        #[command(flatten)]
        scenario: ScenarioArgs,
        /// Number of seeds, starting from the scenario's own seed.
        #[arg(long, default_value_t = 16)]
        seeds: u64,
    },
}

#[derive(Args, Debug)]
struct ScenarioArgs {
    /// TOML scenario file; flags given alongside it override its values.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Traffic shape.
    #[arg(long, value_enum)]
    scenario: Option<KindArg>,
    /// Requests issued by flood and backpressure runs.
    #[arg(long, default_value_t = 64)]
    requests: u32,
    /// Groups issued by burst and cancel runs.
    #[arg(long, default_value_t = 8)]
    groups: u32,
    /// Requests per group for burst and cancel runs.
    #[arg(long, default_value_t = 4)]
    group_size: u32,
    /// Chance the responder stalls on a given tick in backpressure and cancel runs.
    #[arg(long, default_value_t = 0.3)]
    stall_probability: f64,
    /// Slot ring depth.
    #[arg(long)]
    depth: Option<u32>,
    /// Synchronizer stages per crossing signal.
    #[arg(long)]
    sync_stages: Option<u32>,
    /// Domain-B ticks per domain-A tick.
    #[arg(long)]
    ratio: Option<f64>,
    /// Relative jitter on every clock period.
    #[arg(long)]
    jitter: Option<f64>,
    /// Responder latency in domain-B ticks.
    #[arg(long)]
    latency: Option<u32>,
    #[arg(long)]
    seed: Option<u64>,
    /// Zero idle data registers.
    #[arg(long)]
    low_power: bool,
    /// Latch the first protocol violation instead of recovering.
    #[arg(long)]
    strict: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KindArg {
    /// Back-to-back requests in one group.
    Flood,
    /// Separate groups closed normally.
    Burst,
    /// Back-to-back requests against a stalling responder.
    Backpressure,
    /// Groups abandoned with requests still in flight.
    Cancel,
}

impl ScenarioArgs {
    fn kind(&self, arg: KindArg) -> ScenarioKind {
        match arg {
            KindArg::Flood => ScenarioKind::Flood {
                requests: self.requests,
            },
            KindArg::Burst => ScenarioKind::Burst {
                bursts: self.groups,
                burst_size: self.group_size,
            },
            KindArg::Backpressure => ScenarioKind::Backpressure {
                requests: self.requests,
                stall_probability: self.stall_probability,
            },
            KindArg::Cancel => ScenarioKind::Cancel {
                groups: self.groups,
                group_size: self.group_size,
                stall_probability: self.stall_probability,
            },
        }
    }

    fn build(&self) -> Result<ScenarioConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ScenarioConfig::default(),
        };
        if let Some(arg) = self.scenario {
            config.kind = self.kind(arg);
        }
        if let Some(depth) = self.depth {
            config.crossing = config.crossing.with_depth(depth);
        }
        if let Some(stages) = self.sync_stages {
            config.crossing = config.crossing.with_sync_stages(stages);
        }
        if self.low_power {
            config.crossing = config.crossing.with_low_power(true);
        }
        if self.strict {
            config.crossing = config.crossing.with_strict(true);
        }
        if let Some(ratio) = self.ratio {
            config.ratio = ratio;
        }
        if let Some(jitter) = self.jitter {
            config.jitter = jitter;
        }
        if let Some(latency) = self.latency {
            config.latency = latency;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        config.validate().context("invalid scenario")?;
        Ok(config)
    }
}

fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    let failed = match cli.command {
        Command::Run { scenario, threaded } => handle_run(scenario.build()?, threaded)?,
        Command::Sweep { scenario, seeds } => handle_sweep(scenario.build()?, seeds)?,
    };

    if failed > 0 {
        warn!(failed, "checks failed");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(path: &Path) -> Result<ScenarioConfig> {
    let source =
        fs::read_to_string(path).with_context(|| format!("failed to read scenario {path:?}"))?;
    ScenarioConfig::from_toml_str(&source)
        .with_context(|| format!("failed to parse scenario {path:?}"))
}

fn execute(config: ScenarioConfig, threaded: bool) -> Result<ScenarioReport> {
    let name = config.kind.name();
    let report = if threaded {
        run_threaded(config, ArcStatsSink::new())
    } else {
        run_scenario(config)
    };
    report.with_context(|| format!("{name} scenario did not complete"))
}

/// Returns the number of failed checks.
fn handle_run(config: ScenarioConfig, threaded: bool) -> Result<usize> {
    info!(scenario = config.kind.name(), threaded, "running scenario");
    let report = execute(config, threaded)?;
    let results = verify_report(&report);
    print!("{}", render::stats(&report.stats));
    print!("{}", render::checks(&results));
    Ok(results.iter().filter(|(_, result)| result.is_err()).count())
}

/// Returns the number of seeds on which any check failed.
fn handle_sweep(config: ScenarioConfig, seeds: u64) -> Result<usize> {
    if seeds == 0 {
        bail!("--seeds must be at least 1");
    }
    let mut failed_seeds = 0;
    for offset in 0..seeds {
        let seeded = config.clone().with_seed(config.seed.wrapping_add(offset));
        let report = execute(seeded, false)?;
        let results = verify_report(&report);
        let failed = results.iter().filter(|(_, result)| result.is_err()).count();
        print!("{}", render::sweep_line(&report, failed));
        if failed > 0 {
            print!("{}", render::checks(&results));
            failed_seeds += 1;
        }
    }
    Ok(failed_seeds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdc_scenarios::ScenarioStats;
    use insta::assert_snapshot;

    fn sample_stats() -> ScenarioStats {
        ScenarioStats {
            a_ticks: 40,
            b_ticks: 121,
            issued: 10,
            acks: 9,
            errors: 1,
            upstream_stalls: 3,
            max_occupancy: 4,
            max_outstanding: 2,
            ..ScenarioStats::default()
        }
    }

    #[test]
    fn stats_render_matches_expectation() {
        assert_snapshot!(render::stats(&sample_stats()), @r###"
        ticks: a=40 b=121
        responses: issued=10 ok=9 error=1 retry=0
        stalls: upstream=3 downstream=0
        peak: occupancy=4 outstanding=2
        cancel tokens=0 violations=0
        "###);
    }

    #[test]
    fn checks_render_marks_failures() {
        let results = [
            ("order", Ok(())),
            ("no-loss", Err("3 issued but 2 forwarded".to_string())),
        ];
        assert_snapshot!(render::checks(&results), @r###"
        order            ok
        no-loss          FAIL 3 issued but 2 forwarded
        "###);
    }

    fn args(extra: &[&str]) -> ScenarioArgs {
        let mut argv = vec!["cdc-sim", "run"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Command::Run { scenario, .. } => scenario,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn flags_build_the_worked_example() {
        let config = args(&[
            "--scenario",
            "flood",
            "--requests",
            "10",
            "--depth",
            "4",
            "--ratio",
            "3",
        ])
        .build()
        .expect("valid flags");
        assert_eq!(config.kind, ScenarioKind::Flood { requests: 10 });
        assert_eq!(config.crossing.depth, 4);
        assert_eq!(config.ratio, 3.0);

        let report = execute(config, false).expect("run");
        assert!(verify_report(&report).iter().all(|(_, r)| r.is_ok()));
        assert_eq!(report.responses.len(), 10);
    }

    #[test]
    fn invalid_depth_is_rejected() {
        let err = args(&["--depth", "1"]).build().expect_err("depth 1");
        assert!(format!("{err:#}").contains("invalid scenario"), "{err:#}");
    }

    #[test]
    fn missing_config_file_names_the_path() {
        let err = args(&["--config", "/nonexistent/scenario.toml"])
            .build()
            .expect_err("no such file");
        assert!(format!("{err:#}").contains("scenario.toml"), "{err:#}");
    }
}
