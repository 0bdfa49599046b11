//! Seeded particle-swarm search over a box-constrained domain.
//!
//! The swarm itself is argmin's `ParticleSwarm` driven by a `ChaCha8Rng`, so a
//! seed fully determines the run. [`SpreadStop`] wraps it to end the search
//! once the population costs have collapsed, and [`minimize`] flattens the
//! final argmin state into a [`SwarmOutcome`].

use argmin::core::{
    CostFunction, Executor, PopulationState, Problem, Solver, State, SyncAlias,
    TerminationReason, TerminationStatus, KV,
};
use argmin::solver::particleswarm::{Particle, ParticleSwarm};
use payroll_core::ModelError;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Argmin state of a swarm over `Vec<f64>` positions.
pub type SwarmState = PopulationState<Particle<Vec<f64>, f64>, f64>;

/// Knobs of the search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SwarmSettings {
    pub seed: u64,
    /// Hard cap on swarm iterations.
    pub max_iterations: usize,
    /// Relative tolerance on the population cost spread; `None` disables early stop.
    pub tolerance: Option<f64>,
    /// Absolute tolerance added to the relative one.
    pub abs_tolerance: f64,
    /// Particles per dimension; the swarm never has fewer than five.
    pub particles_per_dimension: usize,
    pub inertia: f64,
    /// Pull toward each particle's own best position.
    pub cognitive: f64,
    /// Pull toward the swarm's best position.
    pub social: f64,
}

impl Default for SwarmSettings {
    fn default() -> Self {
        let ln2 = std::f64::consts::LN_2;
        Self {
            seed: 42,
            max_iterations: 200,
            tolerance: Some(1e-6),
            abs_tolerance: 0.0,
            particles_per_dimension: 15,
            inertia: 1.0 / (2.0 * ln2),
            cognitive: 0.5 + ln2,
            social: 0.5 + ln2,
        }
    }
}

/// Result of one search.
#[derive(Clone, Debug, PartialEq)]
pub struct SwarmOutcome {
    pub best: Vec<f64>,
    pub best_cost: f64,
    pub iterations: usize,
    pub evaluations: usize,
    /// Whether the spread test stopped the search before the cap.
    pub converged: bool,
    /// Final particle positions and their costs, same order. The swarm's best
    /// position is appended last.
    pub population: Vec<Vec<f64>>,
    pub costs: Vec<f64>,
}

impl SwarmOutcome {
    /// Population indices sorted by ascending cost.
    pub fn ranked(&self) -> Vec<usize> {
        let mut idx: Vec<usize> = (0..self.costs.len()).collect();
        idx.sort_by(|&a, &b| self.costs[a].total_cmp(&self.costs[b]));
        idx
    }
}

fn invalid(msg: impl Into<String>) -> ModelError {
    ModelError::InvalidParameter(msg.into())
}

/// Recover a model error raised inside a cost function; anything else is argmin's own complaint.
fn from_argmin(err: argmin::core::Error) -> ModelError {
    match err.downcast::<ModelError>() {
        Ok(e) => e,
        Err(other) => invalid(format!("swarm search failed: {other}")),
    }
}

pub fn validate_settings(s: &SwarmSettings) -> Result<(), ModelError> {
    if s.max_iterations == 0 {
        return Err(invalid("max iterations must be >= 1"));
    }
    if let Some(tol) = s.tolerance {
        if !(tol.is_finite() && tol >= 0.0) {
            return Err(invalid(format!("tolerance must be finite and >= 0, got {tol}")));
        }
    }
    if !(s.abs_tolerance.is_finite() && s.abs_tolerance >= 0.0) {
        return Err(invalid("absolute tolerance must be finite and >= 0"));
    }
    if s.particles_per_dimension == 0 {
        return Err(invalid("particles per dimension must be >= 1"));
    }
    for (name, v) in [
        ("inertia", s.inertia),
        ("cognitive", s.cognitive),
        ("social", s.social),
    ] {
        if !(v.is_finite() && v >= 0.0) {
            return Err(invalid(format!("{name} factor must be finite and >= 0, got {v}")));
        }
    }
    Ok(())
}

/// Spread test on the population costs; any non-finite cost keeps the search going.
fn spread_converged(costs: &[f64], rel: f64, abs: f64) -> bool {
    if costs.is_empty() || costs.iter().any(|c| !c.is_finite()) {
        return false;
    }
    let n = costs.len() as f64;
    let mean = costs.iter().sum::<f64>() / n;
    let var = costs.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n;
    var.sqrt() <= abs + rel * mean.abs()
}

/// Particle swarm that also stops once the population cost spread is within tolerance.
pub struct SpreadStop {
    swarm: ParticleSwarm<Vec<f64>, f64, ChaCha8Rng>,
    tolerance: Option<f64>,
    abs_tolerance: f64,
}

impl<O> Solver<O, SwarmState> for SpreadStop
where
    O: CostFunction<Param = Vec<f64>, Output = f64> + SyncAlias,
{
    const NAME: &'static str = "Particle swarm with spread stop";

    fn init(
        &mut self,
        problem: &mut Problem<O>,
        state: SwarmState,
    ) -> Result<(SwarmState, Option<KV>), argmin::core::Error> {
        self.swarm.init(problem, state)
    }

    fn next_iter(
        &mut self,
        problem: &mut Problem<O>,
        state: SwarmState,
    ) -> Result<(SwarmState, Option<KV>), argmin::core::Error> {
        let iteration = state.get_iter() + 1;
        let (state, kv) = self.swarm.next_iter(problem, state)?;
        debug!(iteration, best_cost = state.get_cost(), "swarm iteration");
        Ok((state, kv))
    }

    fn terminate(&mut self, state: &SwarmState) -> TerminationStatus {
        let Some(tol) = self.tolerance else {
            return TerminationStatus::NotTerminated;
        };
        let costs: Vec<f64> = state
            .get_population()
            .map(|p| p.iter().map(|particle| particle.cost).collect())
            .unwrap_or_default();
        if spread_converged(&costs, tol, self.abs_tolerance) {
            TerminationStatus::Terminated(TerminationReason::SolverConverged)
        } else {
            TerminationStatus::NotTerminated
        }
    }
}

/// Minimize `problem` over the box `bounds`.
///
/// Errors raised by `problem` abort the search and come back unchanged.
pub fn minimize<O>(
    problem: O,
    bounds: &[(f64, f64)],
    settings: &SwarmSettings,
) -> Result<SwarmOutcome, ModelError>
where
    O: CostFunction<Param = Vec<f64>, Output = f64> + SyncAlias,
{
    validate_settings(settings)?;
    if bounds.is_empty() {
        return Err(invalid("search space has no dimensions"));
    }
    for (d, &(lo, hi)) in bounds.iter().enumerate() {
        if !(lo.is_finite() && hi.is_finite() && lo <= hi) {
            return Err(invalid(format!("bounds for dimension {d} are invalid")));
        }
    }

    let particles = (settings.particles_per_dimension * bounds.len()).max(5);
    let lower: Vec<f64> = bounds.iter().map(|b| b.0).collect();
    let upper: Vec<f64> = bounds.iter().map(|b| b.1).collect();
    let swarm: ParticleSwarm<Vec<f64>, f64, ChaCha8Rng> =
        ParticleSwarm::new((lower, upper), particles)
            .with_rng_generator(ChaCha8Rng::seed_from_u64(settings.seed))
            .with_inertia_factor(settings.inertia)
            .and_then(|s| s.with_cognitive_factor(settings.cognitive))
            .and_then(|s| s.with_social_factor(settings.social))
            .map_err(from_argmin)?;
    let solver = SpreadStop {
        swarm,
        tolerance: settings.tolerance,
        abs_tolerance: settings.abs_tolerance,
    };

    let max_iters = settings.max_iterations as u64;
    let res = Executor::new(problem, solver)
        .configure(|state| state.max_iters(max_iters))
        .timer(false)
        .run()
        .map_err(from_argmin)?;
    let state = res.state();

    let best = state
        .get_best_param()
        .ok_or_else(|| invalid("swarm finished without a best particle"))?;
    let (mut population, mut costs): (Vec<Vec<f64>>, Vec<f64>) = state
        .get_population()
        .map(|p| p.iter().map(|q| (q.position.clone(), q.cost)).unzip())
        .unwrap_or_default();
    population.push(best.position.clone());
    costs.push(state.get_best_cost());

    Ok(SwarmOutcome {
        best: best.position.clone(),
        best_cost: state.get_best_cost(),
        iterations: state.get_iter() as usize,
        evaluations: state
            .get_func_counts()
            .get("cost_count")
            .copied()
            .unwrap_or(0) as usize,
        converged: matches!(
            state.get_termination_reason(),
            Some(TerminationReason::SolverConverged)
        ),
        population,
        costs,
    })
}
