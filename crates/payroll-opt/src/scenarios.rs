//! Named payroll strategies ranked on the shared objective.

use payroll_core::{ModelConfig, ModelError, PayrollTrajectory, SimGrid};
use payroll_sim::Model;
use serde::Serialize;

/// A named payroll plan.
#[derive(Clone, Debug, PartialEq)]
pub struct Scenario {
    pub name: String,
    pub payroll: PayrollTrajectory,
}

impl Scenario {
    pub fn new(name: impl Into<String>, payroll: PayrollTrajectory) -> Self {
        Self {
            name: name.into(),
            payroll,
        }
    }
}

/// One row of the ranking.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub value: f64,
    pub terminal_profit_usd: f64,
    pub terminal_brand_value_usd: f64,
    pub terminal_valuation_usd: f64,
    pub feasible: bool,
}

/// Flat conservative (just under the tax line) and flat aggressive plans.
pub fn baseline_scenarios(cfg: &ModelConfig, periods: usize) -> Result<Vec<Scenario>, ModelError> {
    let s = &cfg.scenarios;
    Ok(vec![
        Scenario::new(
            "conservative",
            PayrollTrajectory::flat(
                cfg.tax.threshold_usd * s.conservative_fraction_of_tax_line,
                periods,
            )?,
        ),
        Scenario::new(
            "aggressive",
            PayrollTrajectory::flat(s.aggressive_payroll_usd, periods)?,
        ),
    ])
}

/// Evaluate every scenario and sort by discounted value, best first.
pub fn compare(
    model: &Model,
    grid: &SimGrid,
    scenarios: &[Scenario],
) -> Result<Vec<ScenarioReport>, ModelError> {
    let multiplier = model.config().objective.valuation_multiplier;
    let mut rows = scenarios
        .iter()
        .map(|s| {
            let res = model.evaluate_trajectory(&s.payroll, grid)?;
            let end = res.trajectory.terminal();
            Ok(ScenarioReport {
                name: s.name.clone(),
                value: res.value,
                terminal_profit_usd: end.profit_usd,
                terminal_brand_value_usd: end.brand_value_usd,
                terminal_valuation_usd: end.brand_value_usd * multiplier,
                feasible: res.feasibility.is_feasible(),
            })
        })
        .collect::<Result<Vec<_>, ModelError>>()?;
    rows.sort_by(|a, b| b.value.total_cmp(&a.value));
    Ok(rows)
}
