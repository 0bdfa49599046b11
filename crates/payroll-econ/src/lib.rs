#![deny(warnings)]

//! Economic models: luxury tax, performance conversion and state dynamics.
//!
//! Everything here is a pure function of the immutable [`ModelConfig`]:
//! - Progressive repeat-offender luxury tax
//! - Payroll to win rate (log-linear, clipped)
//! - Revenue and expense for a season at a given payroll
//! - Instantaneous rates of the (profit, brand value) system

use payroll_core::{ModelConfig, ModelError, State, TaxSchedule, TaxpayerStatus};
use serde::Serialize;

/// Luxury tax owed on a total payroll.
///
/// The excess over the threshold is consumed bracket by bracket; a payroll
/// sitting exactly on a bracket edge is taxed only by the brackets below it.
///
/// ```
/// use payroll_core::TaxSchedule;
/// use payroll_econ::luxury_tax;
///
/// let t = TaxSchedule::reference();
/// assert_eq!(luxury_tax(&t, t.threshold_usd), 0.0);
/// ```
pub fn luxury_tax(schedule: &TaxSchedule, payroll_usd: f64) -> f64 {
    if payroll_usd <= schedule.threshold_usd {
        return 0.0;
    }
    let discount = match schedule.status {
        TaxpayerStatus::Repeater => 0.0,
        TaxpayerStatus::FirstTime => 1.0,
    };
    let mut remaining = payroll_usd - schedule.threshold_usd;
    let mut tax = 0.0;
    for bracket in &schedule.brackets {
        if remaining <= 0.0 {
            break;
        }
        let taxable = remaining.min(bracket.width());
        tax += taxable * (bracket.multiplier - discount);
        remaining -= taxable;
    }
    tax
}

/// Win rate implied by a payroll level, clipped to the plausibility bounds.
///
/// Fails with [`ModelError::NumericDomain`] when `payroll_usd <= 0`.
pub fn win_rate(cfg: &ModelConfig, payroll_usd: f64) -> Result<f64, ModelError> {
    if payroll_usd <= 0.0 || payroll_usd.is_nan() {
        return Err(ModelError::NumericDomain { payroll_usd });
    }
    let c = &cfg.conversion;
    let raw = cfg.params.win_slope * (payroll_usd / c.payroll_scale_usd).ln()
        + cfg.params.win_intercept;
    // An infinite payroll gives an infinite raw rate; clamp saturates it.
    Ok(raw.clamp(c.min_win_rate, c.max_win_rate))
}

/// Whether a win rate earns the all-or-nothing playoff bonus.
pub fn makes_playoffs(cfg: &ModelConfig, win_rate: f64) -> bool {
    win_rate >= cfg.params.playoff_threshold
}

/// Annual revenue for a win rate and brand value.
pub fn revenue(cfg: &ModelConfig, win_rate: f64, brand_value_usd: f64) -> f64 {
    let p = &cfg.params;
    let bonus = if makes_playoffs(cfg, win_rate) {
        p.playoff_bonus_usd
    } else {
        0.0
    };
    p.revenue_intercept_usd
        + p.win_revenue_coeff_usd * win_rate
        + p.brand_revenue_coeff_usd * (brand_value_usd / cfg.conversion.brand_scale_usd)
        + bonus
}

/// Luxury tax and the total expense it feeds into.
fn tax_and_expense(cfg: &ModelConfig, payroll_usd: f64) -> (f64, f64) {
    let tax = luxury_tax(&cfg.tax, payroll_usd);
    (tax, payroll_usd + tax + cfg.params.operating_cost_usd)
}

/// Annual expense: payroll, luxury tax and fixed operating cost.
pub fn expense(cfg: &ModelConfig, payroll_usd: f64) -> f64 {
    tax_and_expense(cfg, payroll_usd).1
}

/// Everything the dynamics compute for one state and payroll.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Rates {
    pub win_rate: f64,
    pub revenue_usd: f64,
    pub tax_usd: f64,
    pub expense_usd: f64,
    /// dProfit/dt, USD per year.
    pub profit_rate: f64,
    /// dBrandValue/dt, USD per year.
    pub brand_rate: f64,
}

/// Instantaneous rates of change of the state at the given payroll.
pub fn dynamics(cfg: &ModelConfig, state: &State, payroll_usd: f64) -> Result<Rates, ModelError> {
    let s = win_rate(cfg, payroll_usd)?;
    let p = &cfg.params;
    let rev = revenue(cfg, s, state.brand_value_usd);
    let (tax, exp) = tax_and_expense(cfg, payroll_usd);
    let brand_rate = p.brand_perf_coeff_usd * s
        + p.brand_star_coeff_usd * cfg.conversion.star_effect
        - p.brand_decay_rate * state.brand_value_usd;
    Ok(Rates {
        win_rate: s,
        revenue_usd: rev,
        tax_usd: tax,
        expense_usd: exp,
        profit_rate: rev - exp,
        brand_rate,
    })
}
