#![deny(warnings)]

//! Trajectory integration and evaluation for the payroll model.
//!
//! A sparse [`PayrollTrajectory`] (one value per decision point) is linearly
//! interpolated onto a uniform [`SimGrid`] and the (profit, brand value)
//! system is advanced with fixed-step forward Euler. The resulting
//! [`Trajectory`] is the single source for both the discounted objective and
//! the feasibility check, and can be exported as a plottable [`Series`].

use payroll_core::{
    validate_config, validate_grid, ModelConfig, ModelError, ObjectiveSettings,
    PayrollTrajectory, SimGrid, State,
};
use payroll_econ::{dynamics, luxury_tax, win_rate};
use serde::Serialize;
use tracing::trace;

/// Value of a piecewise-linear control at time `t`.
///
/// Knots sit at evenly spaced decision points spanning `[0, horizon]`; a
/// single knot is a constant control. Times outside the span are clamped.
pub fn interpolate(knots: &[f64], horizon: f64, t: f64) -> f64 {
    match knots {
        [] => f64::NAN,
        [only] => *only,
        _ => {
            let segments = knots.len() - 1;
            let u = (t / horizon * segments as f64).clamp(0.0, segments as f64);
            let k = (u.floor() as usize).min(segments - 1);
            let frac = u - k as f64;
            knots[k] + frac * (knots[k + 1] - knots[k])
        }
    }
}

/// Realized quantities for one integration step, evaluated at its start.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct StepRecord {
    pub t_years: f64,
    pub payroll_usd: f64,
    pub win_rate: f64,
    pub revenue_usd: f64,
    pub tax_usd: f64,
    pub expense_usd: f64,
    /// dProfit/dt, USD per year.
    pub profit_rate: f64,
    /// dBrandValue/dt, USD per year.
    pub brand_rate: f64,
}

/// Full state sequence produced by the integrator.
#[derive(Clone, Debug, PartialEq)]
pub struct Trajectory {
    grid: SimGrid,
    /// One state per grid point; `states[0]` is the initial state.
    states: Vec<State>,
    /// One record per step; `steps.len() == states.len() - 1`.
    steps: Vec<StepRecord>,
}

impl Trajectory {
    pub fn grid(&self) -> SimGrid {
        self.grid
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    /// State at the end of the horizon.
    pub fn terminal(&self) -> State {
        // Non-empty: the integrator always pushes the initial state.
        self.states[self.states.len() - 1]
    }

    /// Worst single-step profit rate along the trajectory.
    pub fn min_profit_rate(&self) -> f64 {
        self.steps
            .iter()
            .map(|s| s.profit_rate)
            .fold(f64::INFINITY, f64::min)
    }

    /// Column-oriented copy of the trajectory for plotting.
    pub fn series(&self, objective: &ObjectiveSettings) -> Series {
        let dt = self.grid.dt();
        Series {
            time_years: (0..self.states.len()).map(|i| i as f64 * dt).collect(),
            profit_usd: self.states.iter().map(|s| s.profit_usd).collect(),
            brand_value_usd: self.states.iter().map(|s| s.brand_value_usd).collect(),
            valuation_usd: self
                .states
                .iter()
                .map(|s| s.brand_value_usd * objective.valuation_multiplier)
                .collect(),
            step_time_years: self.steps.iter().map(|s| s.t_years).collect(),
            payroll_usd: self.steps.iter().map(|s| s.payroll_usd).collect(),
            win_rate: self.steps.iter().map(|s| s.win_rate).collect(),
            revenue_usd: self.steps.iter().map(|s| s.revenue_usd).collect(),
            expense_usd: self.steps.iter().map(|s| s.expense_usd).collect(),
            tax_usd: self.steps.iter().map(|s| s.tax_usd).collect(),
            profit_rate_usd: self.steps.iter().map(|s| s.profit_rate).collect(),
        }
    }
}

/// Per-grid-point and per-step series for the reporting side.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Series {
    pub time_years: Vec<f64>,
    pub profit_usd: Vec<f64>,
    pub brand_value_usd: Vec<f64>,
    pub valuation_usd: Vec<f64>,
    pub step_time_years: Vec<f64>,
    pub payroll_usd: Vec<f64>,
    pub win_rate: Vec<f64>,
    pub revenue_usd: Vec<f64>,
    pub expense_usd: Vec<f64>,
    pub tax_usd: Vec<f64>,
    pub profit_rate_usd: Vec<f64>,
}

/// Discounted weighted sum of profit and valuation proxy over the horizon.
///
/// J = sum_i exp(-rho t_{i+1}) (w1 P_{i+1} + w2 m B_{i+1}) dt
pub fn discounted_value(objective: &ObjectiveSettings, trajectory: &Trajectory) -> f64 {
    let dt = trajectory.grid.dt();
    trajectory
        .states
        .iter()
        .enumerate()
        .skip(1)
        .map(|(i, s)| {
            let t = i as f64 * dt;
            let valuation = s.brand_value_usd * objective.valuation_multiplier;
            let utility =
                objective.profit_weight * s.profit_usd + objective.valuation_weight * valuation;
            (-objective.discount_rate * t).exp() * utility * dt
        })
        .sum()
}

/// Minimum-profitability check for one trajectory.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Feasibility {
    /// Worst observed dProfit/dt.
    pub min_profit_rate: f64,
    pub max_tolerable_loss_usd: f64,
}

impl Feasibility {
    /// `min_profit_rate + max_tolerable_loss`; non-negative when feasible.
    pub fn slack(&self) -> f64 {
        self.min_profit_rate + self.max_tolerable_loss_usd
    }

    pub fn is_feasible(&self) -> bool {
        self.slack() >= 0.0
    }

    /// How far the worst period overshoots the tolerated loss; zero when feasible.
    pub fn violation(&self) -> f64 {
        (-self.slack()).max(0.0)
    }
}

pub fn feasibility(objective: &ObjectiveSettings, trajectory: &Trajectory) -> Feasibility {
    Feasibility {
        min_profit_rate: trajectory.min_profit_rate(),
        max_tolerable_loss_usd: objective.max_tolerable_loss_usd,
    }
}

/// Outcome of evaluating one payroll trajectory.
#[derive(Clone, Debug, PartialEq)]
pub struct EvaluationResult {
    /// Discounted objective value; larger is better.
    pub value: f64,
    pub feasibility: Feasibility,
    pub trajectory: Trajectory,
}

/// Payroll, tax and win rate at one decision point.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DecisionSummary {
    pub season: String,
    pub payroll_usd: f64,
    pub tax_usd: f64,
    pub win_rate: f64,
}

/// Validated model handle.
#[derive(Clone, Debug)]
pub struct Model {
    cfg: ModelConfig,
}

impl Model {
    pub fn new(cfg: ModelConfig) -> Result<Self, ModelError> {
        validate_config(&cfg)?;
        Ok(Self { cfg })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.cfg
    }

    /// Advance the initial state across the grid with forward Euler.
    pub fn integrate(
        &self,
        payroll: &PayrollTrajectory,
        grid: &SimGrid,
    ) -> Result<Trajectory, ModelError> {
        validate_grid(grid)?;
        let knots = payroll.values();
        // The last knot is never sampled by a step; check all of them up front.
        if let Some(&payroll_usd) = knots.iter().find(|&&p| p <= 0.0) {
            return Err(ModelError::NumericDomain { payroll_usd });
        }
        let n = grid.resolution;
        let dt = grid.dt();
        let mut state = self.cfg.initial_state;
        let mut states = Vec::with_capacity(n);
        let mut steps = Vec::with_capacity(n - 1);
        states.push(state);
        for i in 0..n - 1 {
            let t = i as f64 * dt;
            let p = interpolate(knots, grid.horizon_years, t);
            let r = dynamics(&self.cfg, &state, p)?;
            steps.push(StepRecord {
                t_years: t,
                payroll_usd: p,
                win_rate: r.win_rate,
                revenue_usd: r.revenue_usd,
                tax_usd: r.tax_usd,
                expense_usd: r.expense_usd,
                profit_rate: r.profit_rate,
                brand_rate: r.brand_rate,
            });
            state = State {
                profit_usd: state.profit_usd + dt * r.profit_rate,
                brand_value_usd: state.brand_value_usd + dt * r.brand_rate,
            };
            states.push(state);
        }
        Ok(Trajectory {
            grid: *grid,
            states,
            steps,
        })
    }

    /// Integrate once and derive both the objective and the feasibility check.
    pub fn evaluate_trajectory(
        &self,
        payroll: &PayrollTrajectory,
        grid: &SimGrid,
    ) -> Result<EvaluationResult, ModelError> {
        let trajectory = self.integrate(payroll, grid)?;
        let value = discounted_value(&self.cfg.objective, &trajectory);
        let feasibility = feasibility(&self.cfg.objective, &trajectory);
        trace!(value, min_rate = feasibility.min_profit_rate, "evaluated trajectory");
        Ok(EvaluationResult {
            value,
            feasibility,
            trajectory,
        })
    }

    /// Tax and win rate at each decision point, labelled by season.
    pub fn decision_summary(
        &self,
        payroll: &PayrollTrajectory,
    ) -> Result<Vec<DecisionSummary>, ModelError> {
        payroll
            .values()
            .iter()
            .enumerate()
            .map(|(i, &p)| {
                Ok(DecisionSummary {
                    season: self.cfg.season_label(i),
                    payroll_usd: p,
                    tax_usd: luxury_tax(&self.cfg.tax, p),
                    win_rate: win_rate(&self.cfg, p)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use payroll_core::MILLION;
    use proptest::prelude::*;

    fn model() -> Model {
        Model::new(ModelConfig::reference()).unwrap()
    }

    fn flat(p: f64) -> PayrollTrajectory {
        PayrollTrajectory::flat(p, 5).unwrap()
    }

    #[test]
    fn interpolation_hits_knots() {
        let knots = [1.0, 3.0, 2.0];
        assert_eq!(interpolate(&knots, 4.0, 0.0), 1.0);
        assert_eq!(interpolate(&knots, 4.0, 1.0), 2.0);
        assert_eq!(interpolate(&knots, 4.0, 2.0), 3.0);
        assert_eq!(interpolate(&knots, 4.0, 4.0), 2.0);
        assert_eq!(interpolate(&knots, 4.0, 9.0), 2.0);
        assert_eq!(interpolate(&[7.0], 4.0, 3.0), 7.0);
    }

    #[test]
    fn integrator_shapes_and_initial_state() {
        let m = model();
        let grid = SimGrid::reference();
        let tr = m.integrate(&flat(180.0 * MILLION), &grid).unwrap();
        assert_eq!(tr.states().len(), 100);
        assert_eq!(tr.steps().len(), 99);
        assert_eq!(tr.states()[0], m.config().initial_state);
        assert_eq!(tr.steps()[0].t_years, 0.0);
    }

    #[test]
    fn integrator_is_deterministic_and_stateless() {
        let m = model();
        let grid = SimGrid::reference();
        let p = PayrollTrajectory::new(vec![150e6, 230e6, 170e6, 250e6, 190e6]).unwrap();
        let a = m.evaluate_trajectory(&p, &grid).unwrap();
        let _ = m.evaluate_trajectory(&flat(240.0 * MILLION), &grid).unwrap();
        let b = m.evaluate_trajectory(&p, &grid).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.value.to_bits(), b.value.to_bits());
    }

    #[test]
    fn single_step_objective_by_hand() {
        let m = model();
        let cfg = m.config();
        let grid = SimGrid::new(1.0, 2).unwrap();
        let payroll = 180.0 * MILLION;
        let res = m.evaluate_trajectory(&flat(payroll), &grid).unwrap();
        let r = dynamics(cfg, &cfg.initial_state, payroll).unwrap();
        let p1 = cfg.initial_state.profit_usd + r.profit_rate;
        let b1 = cfg.initial_state.brand_value_usd + r.brand_rate;
        let o = &cfg.objective;
        let expected = (-o.discount_rate).exp()
            * (o.profit_weight * p1 + o.valuation_weight * o.valuation_multiplier * b1);
        assert!((res.value - expected).abs() <= 1e-9 * expected.abs());
        assert_eq!(res.feasibility.min_profit_rate, r.profit_rate);
    }

    #[test]
    fn euler_error_shrinks_with_resolution() {
        let m = model();
        let p = flat(180.0 * MILLION);
        let finals: Vec<f64> = [26, 51, 101, 201]
            .iter()
            .map(|&n| {
                let grid = SimGrid::new(5.0, n).unwrap();
                m.integrate(&p, &grid).unwrap().terminal().profit_usd
            })
            .collect();
        let d1 = (finals[1] - finals[0]).abs();
        let d2 = (finals[2] - finals[1]).abs();
        let d3 = (finals[3] - finals[2]).abs();
        assert!(d1 > d2 && d2 > d3, "diffs {d1} {d2} {d3}");
    }

    #[test]
    fn objective_grows_with_profit_weight() {
        let grid = SimGrid::reference();
        let p = flat(180.0 * MILLION);
        let base = model().evaluate_trajectory(&p, &grid).unwrap();
        assert!(base.trajectory.states()[1..]
            .iter()
            .all(|s| s.profit_usd > 0.0 && s.brand_value_usd >= 0.0));
        let mut cfg = ModelConfig::reference();
        cfg.objective.profit_weight = 0.9;
        let heavier = Model::new(cfg).unwrap().evaluate_trajectory(&p, &grid).unwrap();
        assert!(heavier.value >= base.value);
    }

    #[test]
    fn deep_tax_payroll_is_infeasible() {
        let m = model();
        let res = m
            .evaluate_trajectory(&flat(300.0 * MILLION), &SimGrid::reference())
            .unwrap();
        assert!(res.feasibility.min_profit_rate < -50.0 * MILLION);
        assert!(!res.feasibility.is_feasible());
        assert!(res.feasibility.violation() > 0.0);
    }

    #[test]
    fn policy_range_is_feasible() {
        let m = model();
        for p in [150.0, 200.0, 250.0] {
            let res = m
                .evaluate_trajectory(&flat(p * MILLION), &SimGrid::reference())
                .unwrap();
            assert!(res.feasibility.is_feasible(), "payroll {p}M");
            assert_eq!(res.feasibility.violation(), 0.0);
        }
    }

    #[test]
    fn invalid_inputs_surface_errors() {
        let m = model();
        let bad_grid = SimGrid {
            horizon_years: 5.0,
            resolution: 1,
        };
        assert!(matches!(
            m.integrate(&flat(180.0 * MILLION), &bad_grid),
            Err(ModelError::InvalidParameter(_))
        ));
        let neg = PayrollTrajectory::new(vec![180e6, -1.0]).unwrap();
        assert!(matches!(
            m.integrate(&neg, &SimGrid::reference()),
            Err(ModelError::NumericDomain { .. })
        ));
        let mut cfg = ModelConfig::reference();
        cfg.params.brand_decay_rate = 0.0;
        assert!(Model::new(cfg).is_err());
    }

    #[test]
    fn non_positive_final_decision_point_is_a_domain_error() {
        let m = model();
        let grid = SimGrid::reference();
        for last in [0.0, -1.0] {
            let p = PayrollTrajectory::new(vec![180e6, 180e6, 180e6, 180e6, last]).unwrap();
            assert_eq!(
                m.evaluate_trajectory(&p, &grid).unwrap_err(),
                ModelError::NumericDomain { payroll_usd: last }
            );
            assert_eq!(
                m.decision_summary(&p).unwrap_err(),
                ModelError::NumericDomain { payroll_usd: last }
            );
        }
    }

    #[test]
    fn series_lengths_and_json() {
        let m = model();
        let tr = m
            .integrate(&flat(200.0 * MILLION), &SimGrid::new(5.0, 11).unwrap())
            .unwrap();
        let s = tr.series(&m.config().objective);
        assert_eq!(s.time_years.len(), 11);
        assert_eq!(s.revenue_usd.len(), 10);
        assert_eq!(s.valuation_usd[0], m.config().initial_state.brand_value_usd * 7.0);
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"profit_rate_usd\""));
    }

    #[test]
    fn decision_summary_labels_seasons() {
        let m = model();
        let tax_line = m.config().tax.threshold_usd;
        let p = PayrollTrajectory::new(vec![150e6, tax_line + 12.0 * MILLION]).unwrap();
        let rows = m.decision_summary(&p).unwrap();
        assert_eq!(rows[0].season, "2025-26");
        assert_eq!(rows[0].tax_usd, 0.0);
        assert!((rows[1].tax_usd - 33.25 * MILLION).abs() < 1.0);
    }

    proptest! {
        #[test]
        fn interpolation_stays_between_knots(
            knots in proptest::collection::vec(100e6f64..300e6, 1..8),
            t in 0.0f64..5.0,
        ) {
            let v = interpolate(&knots, 5.0, t);
            let lo = knots.iter().cloned().fold(f64::INFINITY, f64::min);
            let hi = knots.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            prop_assert!(v >= lo - 1e-6 && v <= hi + 1e-6);
        }
    }
}
