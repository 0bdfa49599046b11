#![deny(warnings)]

//! Headless CLI: optimize a payroll plan and rank it against the baseline scenarios.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use payroll_core::{LeagueLines, ModelConfig, PayrollBounds, SimGrid, BILLION, MILLION};
use payroll_opt::{baseline_scenarios, compare, optimize, OptimizerSettings, Scenario};
use payroll_sim::Model;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default, PartialEq)]
struct Args {
    config: Option<PathBuf>,
    history: Option<PathBuf>,
    seed: Option<u64>,
    max_iter: Option<usize>,
    /// `Some(None)` disables the early stop.
    tol: Option<Option<f64>>,
    periods: Option<usize>,
    horizon: Option<f64>,
    resolution: Option<usize>,
    min_payroll: Option<f64>,
    max_payroll: Option<f64>,
    series_out: Option<PathBuf>,
}

fn value<T: std::str::FromStr>(flag: &str, raw: Option<String>) -> Result<T> {
    let Some(raw) = raw else {
        bail!("{flag} expects a value");
    };
    raw.parse()
        .map_err(|_| anyhow::anyhow!("{flag}: cannot parse {raw:?}"))
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Args> {
    let mut out = Args::default();
    let mut it = args.into_iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => out.config = Some(value("--config", it.next())?),
            "--history" => out.history = Some(value("--history", it.next())?),
            "--seed" => out.seed = Some(value("--seed", it.next())?),
            "--max-iter" => out.max_iter = Some(value("--max-iter", it.next())?),
            "--tol" => {
                let raw: String = value("--tol", it.next())?;
                out.tol = Some(if raw == "none" {
                    None
                } else {
                    Some(value("--tol", Some(raw))?)
                });
            }
            "--periods" => out.periods = Some(value("--periods", it.next())?),
            "--horizon" => out.horizon = Some(value("--horizon", it.next())?),
            "--resolution" => out.resolution = Some(value("--resolution", it.next())?),
            "--min-payroll" => out.min_payroll = Some(value("--min-payroll", it.next())?),
            "--max-payroll" => out.max_payroll = Some(value("--max-payroll", it.next())?),
            "--series-out" => out.series_out = Some(value("--series-out", it.next())?),
            other => warn!(arg = other, "ignoring unknown argument"),
        }
    }
    Ok(out)
}

fn load_config(path: &Path) -> Result<ModelConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    let cfg = if is_json {
        ModelConfig::from_json_str(&text)?
    } else {
        ModelConfig::from_yaml_str(&text)?
    };
    Ok(cfg)
}

/// Dollar amount in millions, rounded for display.
fn musd(usd: f64) -> Decimal {
    Decimal::from_f64(usd / MILLION)
        .unwrap_or_default()
        .round_dp(1)
}

/// Dollar amount in billions, rounded for display.
fn busd(usd: f64) -> Decimal {
    Decimal::from_f64(usd / BILLION)
        .unwrap_or_default()
        .round_dp(3)
}

/// Highest league line the payroll sits above.
fn league_position(league: &LeagueLines, tax_line_usd: f64, payroll_usd: f64) -> &'static str {
    if payroll_usd > league.second_apron_usd {
        "above second apron"
    } else if payroll_usd > league.first_apron_usd {
        "above first apron"
    } else if payroll_usd > tax_line_usd {
        "above tax line"
    } else if payroll_usd > league.salary_cap_usd {
        "above cap"
    } else {
        "under cap"
    }
}

/// Log subscriber whose verbosity is decided by the filter alone.
fn subscriber(filter: EnvFilter) -> impl tracing::Subscriber + Send + Sync {
    tracing_subscriber::fmt().with_env_filter(filter).finish()
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing::subscriber::set_global_default(subscriber(filter))?;

    let args = parse_args(std::env::args().skip(1))?;
    info!(git_sha = env!("GIT_SHA"), ?args, "starting payroll CLI");

    let mut cfg = match &args.config {
        Some(path) => load_config(path)?,
        None => ModelConfig::reference(),
    };
    if let Some(path) = &args.history {
        let inputs = calibration::load_history(path)?;
        cfg.params = calibration::fit(&inputs, &cfg.conversion)?;
    }
    let model = Model::new(cfg)?;

    let reference_grid = SimGrid::reference();
    let grid = SimGrid::new(
        args.horizon.unwrap_or(reference_grid.horizon_years),
        args.resolution.unwrap_or(reference_grid.resolution),
    )?;
    let reference_bounds = PayrollBounds::reference();
    let bounds = PayrollBounds::new(
        args.min_payroll.map_or(reference_bounds.min_usd, |m| m * MILLION),
        args.max_payroll.map_or(reference_bounds.max_usd, |m| m * MILLION),
    )?;

    let mut settings = OptimizerSettings::default();
    if let Some(periods) = args.periods {
        settings.periods = periods;
    }
    if let Some(seed) = args.seed {
        settings.search.seed = seed;
    }
    if let Some(max_iter) = args.max_iter {
        settings.search.max_iterations = max_iter;
    }
    if let Some(tol) = args.tol {
        settings.search.tolerance = tol;
    }

    let outcome = optimize(&model, &bounds, &grid, &settings)?;
    let cfg = model.config();

    println!(
        "Optimal payroll | iterations: {} | evaluations: {} | converged: {}",
        outcome.iterations, outcome.evaluations, outcome.reached_tolerance
    );
    for row in model.decision_summary(&outcome.best)? {
        println!(
            "  {} | payroll: ${}M | tax: ${}M | win rate: {:.3} | {}",
            row.season,
            musd(row.payroll_usd),
            musd(row.tax_usd),
            row.win_rate,
            league_position(&cfg.league, cfg.tax.threshold_usd, row.payroll_usd)
        );
    }

    let eval = model.evaluate_trajectory(&outcome.best, &grid)?;
    let end = eval.trajectory.terminal();
    println!(
        "Terminal | profit: ${}B | brand: ${}B | valuation: ${}B | objective: ${}B",
        busd(end.profit_usd),
        busd(end.brand_value_usd),
        busd(end.brand_value_usd * cfg.objective.valuation_multiplier),
        busd(eval.value)
    );
    println!(
        "Feasibility | min profit rate: ${}M/yr | loss limit: ${}M/yr | feasible: {}",
        musd(eval.feasibility.min_profit_rate),
        musd(eval.feasibility.max_tolerable_loss_usd),
        eval.feasibility.is_feasible()
    );

    let mut scenarios = baseline_scenarios(cfg, settings.periods)?;
    scenarios.push(Scenario::new("optimized", outcome.best.clone()));
    println!("Scenarios (best first)");
    for (rank, r) in compare(&model, &grid, &scenarios)?.iter().enumerate() {
        println!(
            "  {}. {} | objective: ${}B | profit: ${}B | valuation: ${}B | feasible: {}",
            rank + 1,
            r.name,
            busd(r.value),
            busd(r.terminal_profit_usd),
            busd(r.terminal_valuation_usd),
            r.feasible
        );
    }

    if let Some(path) = &args.series_out {
        let series = eval.trajectory.series(&cfg.objective);
        let json = serde_json::to_string_pretty(&series)?;
        std::fs::write(path, json)
            .with_context(|| format!("writing series to {}", path.display()))?;
        info!(path = %path.display(), "wrote trajectory series");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn parses_all_flags() {
        let args = parse_args(argv(
            "--config c.yaml --history h.json --seed 7 --max-iter 50 --tol 1e-4 \
             --periods 3 --horizon 4.5 --resolution 60 --min-payroll 140 \
             --max-payroll 260 --series-out s.json",
        ))
        .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("c.yaml")));
        assert_eq!(args.history, Some(PathBuf::from("h.json")));
        assert_eq!(args.seed, Some(7));
        assert_eq!(args.max_iter, Some(50));
        assert_eq!(args.tol, Some(Some(1e-4)));
        assert_eq!(args.periods, Some(3));
        assert_eq!(args.horizon, Some(4.5));
        assert_eq!(args.resolution, Some(60));
        assert_eq!(args.min_payroll, Some(140.0));
        assert_eq!(args.max_payroll, Some(260.0));
        assert_eq!(args.series_out, Some(PathBuf::from("s.json")));
    }

    #[test]
    fn tol_none_disables_early_stop() {
        let args = parse_args(argv("--tol none")).unwrap();
        assert_eq!(args.tol, Some(None));
        assert_eq!(parse_args(argv("")).unwrap(), Args::default());
    }

    #[test]
    fn bad_values_are_errors() {
        assert!(parse_args(argv("--seed abc")).is_err());
        assert!(parse_args(argv("--periods")).is_err());
        assert!(parse_args(argv("--tol fast")).is_err());
    }

    #[test]
    fn money_is_rounded_for_display() {
        assert_eq!(musd(187_895_000.0).to_string(), "187.9");
        assert_eq!(busd(1_246_000_000.0).to_string(), "1.246");
        assert_eq!(musd(f64::NAN), Decimal::ZERO);
    }

    #[test]
    fn league_positions() {
        let cfg = ModelConfig::reference();
        let at = |m: f64| league_position(&cfg.league, cfg.tax.threshold_usd, m * MILLION);
        assert_eq!(at(100.0), "under cap");
        assert_eq!(at(cfg.tax.threshold_usd / MILLION + 1.0), "above tax line");
        assert_eq!(at(cfg.league.second_apron_usd / MILLION + 1.0), "above second apron");
    }

    #[test]
    fn env_filter_controls_verbosity() {
        tracing::subscriber::with_default(subscriber(EnvFilter::new("debug")), || {
            assert!(tracing::enabled!(tracing::Level::DEBUG));
        });
        tracing::subscriber::with_default(subscriber(EnvFilter::new("info")), || {
            assert!(tracing::enabled!(tracing::Level::INFO));
            assert!(!tracing::enabled!(tracing::Level::DEBUG));
        });
    }

    #[test]
    fn bundled_reference_config_matches_builtin() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../assets/config/reference.yaml");
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg, ModelConfig::reference());
    }
}
