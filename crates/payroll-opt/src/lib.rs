#![deny(warnings)]

//! Payroll strategy search and scenario comparison.
//!
//! [`optimize`] runs a seeded particle swarm over one payroll level per
//! decision point, maximizing the discounted objective. Trajectories that
//! breach the minimum-profitability constraint are kept in the population but
//! their cost is inflated in proportion to the violation. The reported plan is
//! the cheapest feasible member of the final population.

pub mod scenarios;
pub mod swarm;

use argmin::core::CostFunction;
use payroll_core::{validate_bounds, ModelError, PayrollBounds, PayrollTrajectory, SimGrid};
use payroll_sim::{EvaluationResult, Feasibility, Model};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub use scenarios::{baseline_scenarios, compare, Scenario, ScenarioReport};
pub use swarm::{SwarmOutcome, SwarmSettings};

/// Search configuration for [`optimize`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptimizerSettings {
    /// Number of yearly decision points.
    pub periods: usize,
    /// Objective units charged per USD/year of constraint violation.
    pub penalty_weight: f64,
    pub search: SwarmSettings,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            periods: 5,
            penalty_weight: 1e4,
            search: SwarmSettings::default(),
        }
    }
}

/// Best payroll plan found by [`optimize`].
#[derive(Clone, Debug, PartialEq)]
pub struct OptimizationOutcome {
    pub best: PayrollTrajectory,
    /// Unpenalized discounted value of `best`.
    pub best_value: f64,
    pub feasibility: Feasibility,
    pub iterations: usize,
    pub evaluations: usize,
    /// False when the iteration cap ended the search first.
    pub reached_tolerance: bool,
}

/// Negated objective plus the constraint penalty; the quantity being minimized.
pub fn penalized_cost(
    model: &Model,
    payroll: &PayrollTrajectory,
    grid: &SimGrid,
    penalty_weight: f64,
) -> Result<f64, ModelError> {
    let res = model.evaluate_trajectory(payroll, grid)?;
    Ok(-res.value + penalty_weight * res.feasibility.violation())
}

/// [`penalized_cost`] as an argmin problem over raw payroll vectors.
struct PenalizedObjective<'a> {
    model: &'a Model,
    grid: &'a SimGrid,
    penalty_weight: f64,
}

impl CostFunction for PenalizedObjective<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, payroll: &Vec<f64>) -> Result<f64, argmin::core::Error> {
        let payroll = PayrollTrajectory::new(payroll.clone())?;
        let c = penalized_cost(self.model, &payroll, self.grid, self.penalty_weight)?;
        Ok(if c.is_nan() { f64::INFINITY } else { c })
    }
}

/// Lowest-cost feasible member of the final population, falling back to the
/// overall best when every member breaches the loss limit.
fn pick_feasible(
    model: &Model,
    grid: &SimGrid,
    out: &SwarmOutcome,
) -> Result<(PayrollTrajectory, EvaluationResult), ModelError> {
    let mut fallback = None;
    for i in out.ranked() {
        let plan = PayrollTrajectory::new(out.population[i].clone())?;
        let eval = model.evaluate_trajectory(&plan, grid)?;
        if eval.feasibility.is_feasible() {
            return Ok((plan, eval));
        }
        if fallback.is_none() {
            fallback = Some((plan, eval));
        }
    }
    match fallback {
        Some(pair) => Ok(pair),
        None => Err(ModelError::InvalidParameter("empty population".into())),
    }
}

/// Search `[min, max]^periods` for the payroll plan with the highest discounted value.
pub fn optimize(
    model: &Model,
    bounds: &PayrollBounds,
    grid: &SimGrid,
    settings: &OptimizerSettings,
) -> Result<OptimizationOutcome, ModelError> {
    validate_bounds(bounds)?;
    if settings.periods == 0 {
        return Err(ModelError::InvalidParameter(
            "at least one decision point is required".into(),
        ));
    }
    if !(settings.penalty_weight.is_finite() && settings.penalty_weight >= 0.0) {
        return Err(ModelError::InvalidParameter(
            "penalty weight must be finite and >= 0".into(),
        ));
    }
    info!(
        periods = settings.periods,
        min = bounds.min_usd,
        max = bounds.max_usd,
        horizon = grid.horizon_years,
        resolution = grid.resolution,
        seed = settings.search.seed,
        "optimizing payroll"
    );

    let box_bounds = vec![(bounds.min_usd, bounds.max_usd); settings.periods];
    let objective = PenalizedObjective {
        model,
        grid,
        penalty_weight: settings.penalty_weight,
    };
    let out = swarm::minimize(objective, &box_bounds, &settings.search)?;

    let (best, eval) = pick_feasible(model, grid, &out)?;
    if !eval.feasibility.is_feasible() {
        warn!(
            violation = eval.feasibility.violation(),
            "no payroll plan in the final population respects the loss limit"
        );
    }
    if !out.converged {
        warn!(
            iterations = out.iterations,
            "optimizer stopped at the iteration cap"
        );
    }
    info!(
        value = eval.value,
        iterations = out.iterations,
        evaluations = out.evaluations,
        "optimization finished"
    );
    Ok(OptimizationOutcome {
        best,
        best_value: eval.value,
        feasibility: eval.feasibility,
        iterations: out.iterations,
        evaluations: out.evaluations,
        reached_tolerance: out.converged,
    })
}
