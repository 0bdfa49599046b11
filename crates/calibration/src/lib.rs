#![deny(warnings)]

//! One-time calibration of the payroll model from historical seasons.
//!
//! Produces a [`CalibratedParameters`] record:
//! - revenue ~ 1 + win rate + brand value (ordinary least squares)
//! - win rate ~ 1 + ln(payroll / payroll scale) (simple regression)
//! - operating cost = mean(revenue - payroll - luxury tax - EBITDA)
//!
//! Brand dynamics and playoff terms are not identifiable from a handful of
//! seasons and are taken as given [`BrandAssumptions`].

use anyhow::Context;
use payroll_core::{CalibratedParameters, ConversionSettings, BILLION, MILLION};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Financial and competitive record of one completed season.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoricalSeason {
    /// Season label, e.g. "2023-24".
    pub season: String,
    pub win_rate: f64,
    pub revenue_usd: f64,
    pub brand_value_usd: f64,
    pub payroll_usd: f64,
    pub luxury_tax_usd: f64,
    pub ebitda_usd: f64,
}

/// Coefficients supplied by judgement rather than regression.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BrandAssumptions {
    pub brand_perf_coeff_usd: f64,
    pub brand_star_coeff_usd: f64,
    pub brand_decay_rate: f64,
    pub playoff_bonus_usd: f64,
    pub playoff_threshold: f64,
}

impl Default for BrandAssumptions {
    fn default() -> Self {
        Self {
            brand_perf_coeff_usd: 0.5 * BILLION,
            brand_star_coeff_usd: 0.1 * BILLION,
            brand_decay_rate: 0.15,
            playoff_bonus_usd: 34.7 * MILLION,
            playoff_threshold: 0.5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationInputs {
    pub seasons: Vec<HistoricalSeason>,
    #[serde(default)]
    pub assumptions: BrandAssumptions,
}

/// Errors produced by calibration.
#[derive(Debug, Error, PartialEq)]
pub enum CalibrationError {
    /// Three revenue coefficients need at least three seasons.
    #[error("need at least 3 seasons, got {0}")]
    TooFewSeasons(usize),
    #[error("season {season}: {reason}")]
    InvalidRecord { season: String, reason: String },
    /// Regressors are collinear or constant.
    #[error("regression design matrix is singular")]
    Singular,
    #[error("history parse error: {0}")]
    Parse(String),
}

/// Seasons 2020-21 through 2024-25 behind the reference calibration.
pub fn reference_history() -> CalibrationInputs {
    let rows = [
        ("2020-21", 0.542, 258e6, 0.95e9, 147.7e6, 68.9e6, -44e6),
        ("2021-22", 0.646, 765e6, 1.005e9, 175.85e6, 170.3e6, 206e6),
        ("2022-23", 0.537, 765e6, 1.18e9, 191.7e6, 163.7e6, 79e6),
        ("2023-24", 0.561, 800e6, 1.36e9, 209.3e6, 176.9e6, 142e6),
        ("2024-25", 0.585, 880e6, 1.521e9, 176.89e6, 15.41e6, 409e6),
    ];
    CalibrationInputs {
        seasons: rows
            .iter()
            .map(|&(season, win, rev, brand, pay, tax, ebitda)| HistoricalSeason {
                season: season.to_string(),
                win_rate: win,
                revenue_usd: rev,
                brand_value_usd: brand,
                payroll_usd: pay,
                luxury_tax_usd: tax,
                ebitda_usd: ebitda,
            })
            .collect(),
        assumptions: BrandAssumptions::default(),
    }
}

fn validate_season(s: &HistoricalSeason) -> Result<(), CalibrationError> {
    let bad = |reason: &str| CalibrationError::InvalidRecord {
        season: s.season.clone(),
        reason: reason.to_string(),
    };
    let all_finite = [
        s.win_rate,
        s.revenue_usd,
        s.brand_value_usd,
        s.payroll_usd,
        s.luxury_tax_usd,
        s.ebitda_usd,
    ]
    .iter()
    .all(|v| v.is_finite());
    if !all_finite {
        return Err(bad("non-finite value"));
    }
    if !(0.0..=1.0).contains(&s.win_rate) {
        return Err(bad("win rate must be within [0,1]"));
    }
    if s.payroll_usd <= 0.0 {
        return Err(bad("payroll must be > 0"));
    }
    if s.luxury_tax_usd < 0.0 {
        return Err(bad("luxury tax must be >= 0"));
    }
    Ok(())
}

/// Solve a 3x3 system by Gaussian elimination with partial pivoting.
fn solve3(mut a: [[f64; 3]; 3], mut b: [f64; 3]) -> Result<[f64; 3], CalibrationError> {
    let scale = a
        .iter()
        .flat_map(|r| r.iter())
        .fold(0.0f64, |m, v| m.max(v.abs()));
    if scale == 0.0 {
        return Err(CalibrationError::Singular);
    }
    for col in 0..3 {
        let pivot = (col..3)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() <= 1e-12 * scale {
            return Err(CalibrationError::Singular);
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..3 {
            let f = a[row][col] / a[col][col];
            for k in col..3 {
                a[row][k] -= f * a[col][k];
            }
            b[row] -= f * b[col];
        }
    }
    let mut x = [0.0; 3];
    for row in (0..3).rev() {
        let tail: f64 = (row + 1..3).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Ok(x)
}

/// Fit [`CalibratedParameters`] from history using the conversion units of the model.
pub fn fit(
    inputs: &CalibrationInputs,
    conversion: &ConversionSettings,
) -> Result<CalibratedParameters, CalibrationError> {
    let seasons = &inputs.seasons;
    if seasons.len() < 3 {
        return Err(CalibrationError::TooFewSeasons(seasons.len()));
    }
    for s in seasons {
        validate_season(s)?;
    }
    let n = seasons.len() as f64;

    // Normal equations X'X beta = X'y with rows [1, win, brand / scale].
    let mut xtx = [[0.0; 3]; 3];
    let mut xty = [0.0; 3];
    for s in seasons {
        let row = [1.0, s.win_rate, s.brand_value_usd / conversion.brand_scale_usd];
        for i in 0..3 {
            for j in 0..3 {
                xtx[i][j] += row[i] * row[j];
            }
            xty[i] += row[i] * s.revenue_usd;
        }
    }
    let [intercept, win_coeff, brand_coeff] = solve3(xtx, xty)?;

    let logs: Vec<f64> = seasons
        .iter()
        .map(|s| (s.payroll_usd / conversion.payroll_scale_usd).ln())
        .collect();
    let mean_x = logs.iter().sum::<f64>() / n;
    let mean_y = seasons.iter().map(|s| s.win_rate).sum::<f64>() / n;
    let sxx: f64 = logs.iter().map(|x| (x - mean_x).powi(2)).sum();
    if sxx <= f64::EPSILON * n {
        return Err(CalibrationError::Singular);
    }
    let sxy: f64 = logs
        .iter()
        .zip(seasons)
        .map(|(x, s)| (x - mean_x) * (s.win_rate - mean_y))
        .sum();
    let win_slope = sxy / sxx;
    let win_intercept = mean_y - win_slope * mean_x;

    let operating_cost_usd = seasons
        .iter()
        .map(|s| s.revenue_usd - s.payroll_usd - s.luxury_tax_usd - s.ebitda_usd)
        .sum::<f64>()
        / n;

    let a = &inputs.assumptions;
    let params = CalibratedParameters {
        revenue_intercept_usd: intercept,
        win_revenue_coeff_usd: win_coeff,
        brand_revenue_coeff_usd: brand_coeff,
        brand_perf_coeff_usd: a.brand_perf_coeff_usd,
        brand_star_coeff_usd: a.brand_star_coeff_usd,
        brand_decay_rate: a.brand_decay_rate,
        win_slope,
        win_intercept,
        operating_cost_usd,
        playoff_bonus_usd: a.playoff_bonus_usd,
        playoff_threshold: a.playoff_threshold,
    };
    info!(
        seasons = seasons.len(),
        intercept,
        win_coeff,
        brand_coeff,
        win_slope,
        win_intercept,
        operating_cost_usd,
        "calibrated parameters"
    );
    Ok(params)
}

/// Parse history from YAML text.
pub fn parse_history_yaml(text: &str) -> Result<CalibrationInputs, CalibrationError> {
    serde_yaml::from_str(text).map_err(|e| CalibrationError::Parse(e.to_string()))
}

/// Parse history from JSON text.
pub fn parse_history_json(text: &str) -> Result<CalibrationInputs, CalibrationError> {
    serde_json::from_str(text).map_err(|e| CalibrationError::Parse(e.to_string()))
}

/// Load history from a `.json` or `.yaml`/`.yml` file.
pub fn load_history(path: &Path) -> anyhow::Result<CalibrationInputs> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading history file {}", path.display()))?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    let inputs = if is_json {
        parse_history_json(&text)?
    } else {
        parse_history_yaml(&text)?
    };
    Ok(inputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::path::PathBuf;

    fn rel_close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol * b.abs().max(1e-12)
    }

    #[test]
    fn reference_history_reproduces_reference_parameters() {
        let p = fit(&reference_history(), &ConversionSettings::default()).unwrap();
        let r = CalibratedParameters::reference();
        assert!(rel_close(p.revenue_intercept_usd, r.revenue_intercept_usd, 1e-6));
        assert!(rel_close(p.win_revenue_coeff_usd, r.win_revenue_coeff_usd, 1e-6));
        assert!(rel_close(p.brand_revenue_coeff_usd, r.brand_revenue_coeff_usd, 1e-6));
        assert!(rel_close(p.win_slope, r.win_slope, 1e-6));
        assert!(rel_close(p.win_intercept, r.win_intercept, 1e-6));
        assert!(rel_close(p.operating_cost_usd, r.operating_cost_usd, 1e-9));
        assert_eq!(p.brand_decay_rate, 0.15);
    }

    #[test]
    fn too_few_seasons() {
        let mut h = reference_history();
        h.seasons.truncate(2);
        assert_eq!(
            fit(&h, &ConversionSettings::default()),
            Err(CalibrationError::TooFewSeasons(2))
        );
    }

    #[test]
    fn constant_regressors_are_singular() {
        let mut h = reference_history();
        for s in &mut h.seasons {
            s.win_rate = 0.5;
            s.brand_value_usd = 1e9;
        }
        assert_eq!(
            fit(&h, &ConversionSettings::default()),
            Err(CalibrationError::Singular)
        );
    }

    #[test]
    fn bad_records_name_the_season() {
        let mut h = reference_history();
        h.seasons[3].payroll_usd = 0.0;
        match fit(&h, &ConversionSettings::default()) {
            Err(CalibrationError::InvalidRecord { season, .. }) => assert_eq!(season, "2023-24"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn yaml_history_uses_default_assumptions() {
        let text = "
seasons:
  - { season: '2001-02', win_rate: 0.40, revenue_usd: 1.0e8, brand_value_usd: 2.0e8, payroll_usd: 5.0e7, luxury_tax_usd: 0.0, ebitda_usd: 1.0e7 }
  - { season: '2002-03', win_rate: 0.55, revenue_usd: 1.3e8, brand_value_usd: 2.5e8, payroll_usd: 6.0e7, luxury_tax_usd: 0.0, ebitda_usd: 2.0e7 }
  - { season: '2003-04', win_rate: 0.60, revenue_usd: 1.5e8, brand_value_usd: 2.4e8, payroll_usd: 7.5e7, luxury_tax_usd: 2.0e6, ebitda_usd: 1.5e7 }
";
        let h = parse_history_yaml(text).unwrap();
        assert_eq!(h.seasons.len(), 3);
        assert_eq!(h.assumptions, BrandAssumptions::default());
        let p = fit(&h, &ConversionSettings::default()).unwrap();
        assert!(p.win_slope > 0.0);
        assert!(parse_history_yaml("seasons: 3").is_err());
    }

    #[test]
    fn bundled_history_asset_loads() {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../../assets/history/reference_seasons.yaml");
        let h = load_history(&path).unwrap();
        assert_eq!(h, reference_history());
    }

    #[test]
    fn exact_linear_revenue_is_recovered() {
        let mut h = reference_history();
        for s in &mut h.seasons {
            s.revenue_usd = 100e6 + 400e6 * s.win_rate + 300e6 * (s.brand_value_usd / 1e9);
        }
        let p = fit(&h, &ConversionSettings::default()).unwrap();
        assert!(rel_close(p.revenue_intercept_usd, 100e6, 1e-6));
        assert!(rel_close(p.win_revenue_coeff_usd, 400e6, 1e-6));
        assert!(rel_close(p.brand_revenue_coeff_usd, 300e6, 1e-6));
    }

    proptest! {
        #[test]
        fn exact_log_win_fit_is_recovered(slope in -0.5f64..0.5, mid in 0.1f64..0.9) {
            prop_assume!(slope.abs() > 1e-3);
            // Centre the line on the mean log payroll so every season stays inside (0, 1).
            let icpt = mid - slope * 5.17;
            let mut h = reference_history();
            for s in &mut h.seasons {
                s.win_rate = slope * (s.payroll_usd / 1e6).ln() + icpt;
            }
            let p = fit(&h, &ConversionSettings::default()).unwrap();
            prop_assert!((p.win_slope - slope).abs() < 1e-9);
            prop_assert!((p.win_intercept - icpt).abs() < 1e-8);
        }
    }
}
