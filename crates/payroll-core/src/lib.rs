#![deny(warnings)]

//! Core domain models and invariants for the franchise payroll model.
//!
//! This crate defines the immutable configuration consumed by every other
//! crate in the workspace, plus validation helpers that guard the invariants
//! the integrator and optimizer rely on.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One million currency units.
pub const MILLION: f64 = 1_000_000.0;
/// One billion currency units.
pub const BILLION: f64 = 1_000_000_000.0;

/// Coefficients produced by the one-time calibration step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibratedParameters {
    /// Fixed revenue intercept in USD per year.
    pub revenue_intercept_usd: f64,
    /// Revenue per unit of win rate, USD per year.
    pub win_revenue_coeff_usd: f64,
    /// Revenue per brand scale unit (see [`ConversionSettings::brand_scale_usd`]).
    pub brand_revenue_coeff_usd: f64,
    /// Brand growth per unit of win rate, USD per year.
    pub brand_perf_coeff_usd: f64,
    /// Brand growth per unit of star effect, USD per year.
    pub brand_star_coeff_usd: f64,
    /// Fractional brand decay per year, in (0, 1).
    pub brand_decay_rate: f64,
    /// Slope of win rate against ln(payroll / payroll scale).
    pub win_slope: f64,
    /// Intercept of the log-linear win-rate fit.
    pub win_intercept: f64,
    /// Average fixed operating cost in USD per year.
    pub operating_cost_usd: f64,
    /// Playoff revenue bonus in USD per year.
    pub playoff_bonus_usd: f64,
    /// Win rate at or above which the playoff bonus is earned.
    pub playoff_threshold: f64,
}

impl CalibratedParameters {
    /// Coefficients fitted against the 2020-21..2024-25 seasons.
    pub fn reference() -> Self {
        Self {
            revenue_intercept_usd: -1_720_781_819.444,
            win_revenue_coeff_usd: 2_558_980_532.419,
            brand_revenue_coeff_usd: 785_418_216.198,
            brand_perf_coeff_usd: 0.5 * BILLION,
            brand_star_coeff_usd: 0.1 * BILLION,
            brand_decay_rate: 0.15,
            win_slope: 0.002_583_517_9,
            win_intercept: 0.560_796_686_9,
            operating_cost_usd: 235_870_000.0,
            playoff_bonus_usd: 34.7 * MILLION,
            playoff_threshold: 0.5,
        }
    }
}

/// A single luxury-tax bracket over the excess above the tax line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaxBracket {
    /// Lower edge of the bracket (inclusive), USD over the tax line.
    pub lower_usd: f64,
    /// Upper edge (exclusive). `None` marks the unbounded final bracket.
    pub upper_usd: Option<f64>,
    /// Tax owed per dollar of excess inside this bracket.
    pub multiplier: f64,
}

impl TaxBracket {
    pub fn bounded(lower_usd: f64, upper_usd: f64, multiplier: f64) -> Self {
        Self {
            lower_usd,
            upper_usd: Some(upper_usd),
            multiplier,
        }
    }

    pub fn unbounded(lower_usd: f64, multiplier: f64) -> Self {
        Self {
            lower_usd,
            upper_usd: None,
            multiplier,
        }
    }

    /// Width of the bracket; infinite for the final bracket.
    pub fn width(&self) -> f64 {
        match self.upper_usd {
            Some(upper) => upper - self.lower_usd,
            None => f64::INFINITY,
        }
    }
}

/// Whether the franchise pays the repeat-offender rates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaxpayerStatus {
    /// Taxed in multiple recent seasons; brackets apply as written.
    #[default]
    Repeater,
    /// Every bracket multiplier is reduced by one.
    FirstTime,
}

/// Progressive luxury-tax schedule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaxSchedule {
    /// Payroll above which tax is owed.
    pub threshold_usd: f64,
    /// Brackets in ascending order, partitioning `[0, inf)` of excess.
    pub brackets: Vec<TaxBracket>,
    #[serde(default)]
    pub status: TaxpayerStatus,
}

impl TaxSchedule {
    /// 2025-26 repeater schedule in $5M steps.
    pub fn reference() -> Self {
        let step = 5.0 * MILLION;
        Self {
            threshold_usd: 187_895_000.0,
            brackets: vec![
                TaxBracket::bounded(0.0, step, 2.5),
                TaxBracket::bounded(step, 2.0 * step, 2.75),
                TaxBracket::bounded(2.0 * step, 3.0 * step, 3.5),
                TaxBracket::bounded(3.0 * step, 4.0 * step, 4.25),
                TaxBracket::unbounded(4.0 * step, 4.75),
            ],
            status: TaxpayerStatus::Repeater,
        }
    }
}

/// Reference payroll lines published by the league for a season.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeagueLines {
    pub salary_cap_usd: f64,
    pub first_apron_usd: f64,
    pub second_apron_usd: f64,
}

impl LeagueLines {
    pub fn reference() -> Self {
        Self {
            salary_cap_usd: 154_647_000.0,
            first_apron_usd: 195_945_000.0,
            second_apron_usd: 207_824_000.0,
        }
    }
}

/// Fixed units and bounds used by the conversion functions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversionSettings {
    /// Payroll unit inside the logarithm of the win-rate fit.
    pub payroll_scale_usd: f64,
    /// Brand unit used by the revenue coefficient.
    pub brand_scale_usd: f64,
    pub min_win_rate: f64,
    pub max_win_rate: f64,
    /// Normalized marquee-player contribution to brand growth.
    pub star_effect: f64,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            payroll_scale_usd: MILLION,
            brand_scale_usd: BILLION,
            min_win_rate: 0.3,
            max_win_rate: 0.8,
            star_effect: 1.0,
        }
    }
}

/// Weights and discounting of the long-run value objective.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveSettings {
    /// Continuous annual discount rate.
    pub discount_rate: f64,
    /// Utility weight on cumulative profit.
    pub profit_weight: f64,
    /// Utility weight on the valuation proxy.
    pub valuation_weight: f64,
    /// Valuation-to-brand ratio.
    pub valuation_multiplier: f64,
    /// Largest annualized single-period loss tolerated, USD per year.
    pub max_tolerable_loss_usd: f64,
}

impl Default for ObjectiveSettings {
    fn default() -> Self {
        Self {
            discount_rate: 0.05,
            profit_weight: 0.6,
            valuation_weight: 0.4,
            valuation_multiplier: 7.0,
            max_tolerable_loss_usd: 50.0 * MILLION,
        }
    }
}

/// Flat baseline strategies used for scenario comparison.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSettings {
    /// Conservative payroll as a fraction of the tax line.
    pub conservative_fraction_of_tax_line: f64,
    /// Aggressive flat payroll level.
    pub aggressive_payroll_usd: f64,
}

impl Default for ScenarioSettings {
    fn default() -> Self {
        Self {
            conservative_fraction_of_tax_line: 0.95,
            aggressive_payroll_usd: 220.0 * MILLION,
        }
    }
}

/// Instantaneous model state.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// Cumulative profit in USD; any sign.
    pub profit_usd: f64,
    /// Brand value in USD. Not clamped.
    pub brand_value_usd: f64,
}

/// Complete immutable model configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub params: CalibratedParameters,
    pub tax: TaxSchedule,
    pub league: LeagueLines,
    #[serde(default)]
    pub conversion: ConversionSettings,
    #[serde(default)]
    pub objective: ObjectiveSettings,
    #[serde(default)]
    pub scenarios: ScenarioSettings,
    pub initial_state: State,
    /// Season year of the first decision point, e.g. 2025 for 2025-26.
    pub first_season: i32,
}

impl ModelConfig {
    /// Reference configuration for the 2025-26 starting season.
    pub fn reference() -> Self {
        Self {
            params: CalibratedParameters::reference(),
            tax: TaxSchedule::reference(),
            league: LeagueLines::reference(),
            conversion: ConversionSettings::default(),
            objective: ObjectiveSettings::default(),
            scenarios: ScenarioSettings::default(),
            initial_state: State {
                profit_usd: 0.0,
                brand_value_usd: 1.246 * BILLION,
            },
            first_season: 2025,
        }
    }

    /// Parse and validate a YAML config document.
    pub fn from_yaml_str(text: &str) -> Result<Self, ModelError> {
        let cfg: Self =
            serde_yaml::from_str(text).map_err(|e| ModelError::Config(e.to_string()))?;
        validate_config(&cfg)?;
        Ok(cfg)
    }

    /// Parse and validate a JSON config document.
    pub fn from_json_str(text: &str) -> Result<Self, ModelError> {
        let cfg: Self =
            serde_json::from_str(text).map_err(|e| ModelError::Config(e.to_string()))?;
        validate_config(&cfg)?;
        Ok(cfg)
    }

    /// Label of the season starting `offset` years after the first one, e.g. "2026-27".
    pub fn season_label(&self, offset: usize) -> String {
        let start = self.first_season + offset as i32;
        format!("{}-{:02}", start, (start + 1).rem_euclid(100))
    }
}

/// Admissible payroll range for every decision point.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PayrollBounds {
    pub min_usd: f64,
    pub max_usd: f64,
}

impl PayrollBounds {
    pub fn new(min_usd: f64, max_usd: f64) -> Result<Self, ModelError> {
        let b = Self { min_usd, max_usd };
        validate_bounds(&b)?;
        Ok(b)
    }

    /// The 150M..250M policy range.
    pub fn reference() -> Self {
        Self {
            min_usd: 150.0 * MILLION,
            max_usd: 250.0 * MILLION,
        }
    }

    pub fn contains(&self, payroll_usd: f64) -> bool {
        (self.min_usd..=self.max_usd).contains(&payroll_usd)
    }
}

/// Payroll chosen at each yearly decision point.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PayrollTrajectory(Vec<f64>);

impl PayrollTrajectory {
    pub fn new(values: Vec<f64>) -> Result<Self, ModelError> {
        if values.is_empty() {
            return Err(ModelError::InvalidParameter(
                "payroll trajectory must have at least one decision point".into(),
            ));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::InvalidParameter(
                "payroll trajectory contains a non-finite value".into(),
            ));
        }
        Ok(Self(values))
    }

    /// Same payroll at every decision point.
    pub fn flat(payroll_usd: f64, periods: usize) -> Result<Self, ModelError> {
        Self::new(vec![payroll_usd; periods])
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn within(&self, bounds: &PayrollBounds) -> bool {
        self.0.iter().all(|&p| bounds.contains(p))
    }
}

/// Uniform integration grid over `[0, horizon_years]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimGrid {
    pub horizon_years: f64,
    /// Number of grid points, including both endpoints.
    pub resolution: usize,
}

impl SimGrid {
    pub fn new(horizon_years: f64, resolution: usize) -> Result<Self, ModelError> {
        let g = Self {
            horizon_years,
            resolution,
        };
        validate_grid(&g)?;
        Ok(g)
    }

    /// Five years sampled at 100 points.
    pub fn reference() -> Self {
        Self {
            horizon_years: 5.0,
            resolution: 100,
        }
    }

    pub fn dt(&self) -> f64 {
        self.horizon_years / (self.resolution - 1) as f64
    }

    pub fn time(&self, i: usize) -> f64 {
        i as f64 * self.dt()
    }
}

/// Errors raised by the model.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    /// A configuration value or argument breaks an invariant.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// Payroll outside the domain of the logarithmic win-rate fit.
    #[error("payroll {payroll_usd} is outside the win-rate domain (must be > 0)")]
    NumericDomain { payroll_usd: f64 },
    /// Config document could not be parsed.
    #[error("config parse error: {0}")]
    Config(String),
}

fn invalid(msg: impl Into<String>) -> ModelError {
    ModelError::InvalidParameter(msg.into())
}

fn finite(name: &str, v: f64) -> Result<(), ModelError> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be finite, got {v}")))
    }
}

/// Validate calibrated coefficients.
pub fn validate_parameters(p: &CalibratedParameters) -> Result<(), ModelError> {
    finite("revenue_intercept_usd", p.revenue_intercept_usd)?;
    finite("win_revenue_coeff_usd", p.win_revenue_coeff_usd)?;
    finite("brand_revenue_coeff_usd", p.brand_revenue_coeff_usd)?;
    finite("brand_perf_coeff_usd", p.brand_perf_coeff_usd)?;
    finite("brand_star_coeff_usd", p.brand_star_coeff_usd)?;
    finite("win_slope", p.win_slope)?;
    finite("win_intercept", p.win_intercept)?;
    finite("operating_cost_usd", p.operating_cost_usd)?;
    finite("playoff_bonus_usd", p.playoff_bonus_usd)?;
    finite("playoff_threshold", p.playoff_threshold)?;
    if !(p.brand_decay_rate > 0.0 && p.brand_decay_rate < 1.0) {
        return Err(invalid(format!(
            "brand_decay_rate must be in (0, 1), got {}",
            p.brand_decay_rate
        )));
    }
    Ok(())
}

/// Validate a tax schedule: brackets must start at zero excess, be strictly
/// increasing and contiguous, and end in exactly one unbounded bracket.
pub fn validate_tax_schedule(t: &TaxSchedule) -> Result<(), ModelError> {
    if !(t.threshold_usd.is_finite() && t.threshold_usd >= 0.0) {
        return Err(invalid("tax threshold must be finite and >= 0"));
    }
    let Some(first) = t.brackets.first() else {
        return Err(invalid("tax schedule has no brackets"));
    };
    if first.lower_usd != 0.0 {
        return Err(invalid("first tax bracket must start at zero excess"));
    }
    let last = t.brackets.len() - 1;
    for (i, b) in t.brackets.iter().enumerate() {
        if !(b.multiplier.is_finite() && b.multiplier >= 0.0) {
            return Err(invalid(format!("bracket {i} multiplier must be finite and >= 0")));
        }
        if t.status == TaxpayerStatus::FirstTime && b.multiplier < 1.0 {
            return Err(invalid(format!(
                "bracket {i} multiplier must be >= 1 for first-time payers"
            )));
        }
        match (b.upper_usd, i == last) {
            (None, true) => {}
            (None, false) => {
                return Err(invalid(format!("bracket {i} is unbounded but not last")));
            }
            (Some(_), true) => {
                return Err(invalid("final tax bracket must be unbounded"));
            }
            (Some(upper), false) => {
                if !(upper.is_finite() && upper > b.lower_usd) {
                    return Err(invalid(format!("bracket {i} is empty or non-monotonic")));
                }
                let next = &t.brackets[i + 1];
                if next.lower_usd != upper {
                    return Err(invalid(format!(
                        "brackets {i} and {} overlap or leave a gap",
                        i + 1
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Validate payroll bounds.
pub fn validate_bounds(b: &PayrollBounds) -> Result<(), ModelError> {
    if !(b.min_usd.is_finite() && b.max_usd.is_finite()) {
        return Err(invalid("payroll bounds must be finite"));
    }
    if b.min_usd > b.max_usd {
        return Err(invalid(format!(
            "payroll min {} exceeds max {}",
            b.min_usd, b.max_usd
        )));
    }
    if b.min_usd <= 0.0 {
        return Err(invalid("payroll min must be > 0"));
    }
    Ok(())
}

/// Validate the integration grid.
pub fn validate_grid(g: &SimGrid) -> Result<(), ModelError> {
    if !(g.horizon_years.is_finite() && g.horizon_years > 0.0) {
        return Err(invalid(format!(
            "horizon must be > 0 years, got {}",
            g.horizon_years
        )));
    }
    if g.resolution < 2 {
        return Err(invalid(format!(
            "resolution must be >= 2, got {}",
            g.resolution
        )));
    }
    Ok(())
}

/// Validate the full configuration.
pub fn validate_config(cfg: &ModelConfig) -> Result<(), ModelError> {
    validate_parameters(&cfg.params)?;
    validate_tax_schedule(&cfg.tax)?;

    let c = &cfg.conversion;
    if !(c.payroll_scale_usd > 0.0 && c.payroll_scale_usd.is_finite()) {
        return Err(invalid("payroll_scale_usd must be > 0"));
    }
    if !(c.brand_scale_usd > 0.0 && c.brand_scale_usd.is_finite()) {
        return Err(invalid("brand_scale_usd must be > 0"));
    }
    if !(c.min_win_rate.is_finite() && c.max_win_rate.is_finite())
        || c.min_win_rate > c.max_win_rate
    {
        return Err(invalid("win-rate bounds must be finite with min <= max"));
    }
    finite("star_effect", c.star_effect)?;

    let o = &cfg.objective;
    finite("discount_rate", o.discount_rate)?;
    finite("profit_weight", o.profit_weight)?;
    finite("valuation_weight", o.valuation_weight)?;
    finite("valuation_multiplier", o.valuation_multiplier)?;
    if !(o.max_tolerable_loss_usd.is_finite() && o.max_tolerable_loss_usd >= 0.0) {
        return Err(invalid("max_tolerable_loss_usd must be finite and >= 0"));
    }

    let s = &cfg.scenarios;
    if !(s.conservative_fraction_of_tax_line > 0.0 && s.aggressive_payroll_usd > 0.0) {
        return Err(invalid("scenario payroll levels must be > 0"));
    }

    finite("initial profit", cfg.initial_state.profit_usd)?;
    finite("initial brand value", cfg.initial_state.brand_value_usd)?;
    Ok(())
}
