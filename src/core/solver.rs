use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::engine::run_simulation;
use super::error::SimulationError;
use super::rules::RuleBook;
use super::summary::HealthRubric;
use super::types::HouseholdInput;

const RATE_EPS: f64 = 1e-12;

/// Search settings for [`solve_max_spending`]. The candidate is a multiplier
/// applied to all three spending phases at once.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpendingSolveConfig {
    pub target_success_rate: f64,
    pub search_min: f64,
    pub search_max: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
}

impl Default for SpendingSolveConfig {
    fn default() -> Self {
        Self {
            target_success_rate: 1.0,
            search_min: 0.0,
            search_max: 4.0,
            tolerance: 0.001,
            max_iterations: 40,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpendingSolveIteration {
    pub iteration: u32,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub candidate_multiplier: f64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpendingPhases {
    pub go_go: f64,
    pub slow_go: f64,
    pub no_go: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpendingSolveResult {
    pub config: SpendingSolveConfig,
    pub solved_multiplier: Option<f64>,
    pub solved_spending: Option<SpendingPhases>,
    pub achieved_success_rate: Option<f64>,
    pub iterations: Vec<SpendingSolveIteration>,
    pub converged: bool,
    pub feasible: bool,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum SolveError {
    #[error("invalid solver settings: {0}")]
    Config(String),
    #[error(transparent)]
    Simulation(#[from] SimulationError),
}

fn scaled(input: &HouseholdInput, multiplier: f64) -> HouseholdInput {
    let mut scaled = input.clone();
    scaled.spending_go_go *= multiplier;
    scaled.spending_slow_go *= multiplier;
    scaled.spending_no_go *= multiplier;
    scaled.stop_on_fail = false;
    scaled
}

fn phases(input: &HouseholdInput, multiplier: f64) -> SpendingPhases {
    SpendingPhases {
        go_go: input.spending_go_go * multiplier,
        slow_go: input.spending_slow_go * multiplier,
        no_go: input.spending_no_go * multiplier,
    }
}

fn success_rate(
    input: &HouseholdInput,
    rule_book: &RuleBook,
    multiplier: f64,
) -> Result<f64, SimulationError> {
    let response = run_simulation(&scaled(input, multiplier), rule_book, &HealthRubric::default())?;
    Ok(response.summary.success_rate)
}

/// Largest spending multiplier whose run keeps at least
/// `target_success_rate` of years funded.
pub fn solve_max_spending(
    input: &HouseholdInput,
    rule_book: &RuleBook,
    config: SpendingSolveConfig,
) -> Result<SpendingSolveResult, SolveError> {
    validate_config(input, config).map_err(SolveError::Config)?;

    let target = config.target_success_rate;
    let meets = |rate: f64| rate + RATE_EPS >= target;
    let mut iterations = Vec::with_capacity(config.max_iterations as usize);
    let mut solved = None;
    let mut converged = false;
    let feasible;
    let message;

    let low_rate = success_rate(input, rule_book, config.search_min)?;
    let high_rate = success_rate(input, rule_book, config.search_max)?;
    if !meets(low_rate) {
        feasible = false;
        message = "No feasible spending level found within the search bounds.".to_string();
    } else if meets(high_rate) {
        solved = Some((config.search_max, high_rate));
        converged = true;
        feasible = true;
        message = "Upper spending bound is still funded; raise search_max for a higher answer."
            .to_string();
    } else {
        let mut lo = (config.search_min, low_rate);
        let mut hi = config.search_max;
        for it in 1..=config.max_iterations {
            let mid = (lo.0 + hi) * 0.5;
            let rate = success_rate(input, rule_book, mid)?;
            iterations.push(SpendingSolveIteration {
                iteration: it,
                lower_bound: lo.0,
                upper_bound: hi,
                candidate_multiplier: mid,
                success_rate: rate,
            });
            debug!(iteration = it, multiplier = mid, success_rate = rate, "spending solver step");

            if meets(rate) {
                lo = (mid, rate);
            } else {
                hi = mid;
            }
            if hi - lo.0 <= config.tolerance {
                converged = true;
                break;
            }
        }
        solved = Some(lo);
        feasible = true;
        message = if converged {
            "Solved maximum sustainable spending.".to_string()
        } else {
            "Reached max iterations before tolerance was met; returning best estimate.".to_string()
        };
    }

    Ok(SpendingSolveResult {
        config,
        solved_multiplier: solved.map(|(m, _)| m),
        solved_spending: solved.map(|(m, _)| phases(input, m)),
        achieved_success_rate: solved.map(|(_, rate)| rate),
        iterations,
        converged,
        feasible,
        message,
    })
}

fn validate_config(input: &HouseholdInput, config: SpendingSolveConfig) -> Result<(), String> {
    if input.spending_go_go + input.spending_slow_go + input.spending_no_go <= 0.0 {
        return Err("at least one spending phase must be > 0".to_string());
    }
    if !(0.0..=1.0).contains(&config.target_success_rate) {
        return Err("target_success_rate must be between 0 and 1".to_string());
    }
    if !config.search_min.is_finite() || !config.search_max.is_finite() {
        return Err("search bounds must be finite".to_string());
    }
    if config.search_min < 0.0 {
        return Err("search_min must be >= 0".to_string());
    }
    if config.search_max <= config.search_min {
        return Err("search_max must be greater than search_min".to_string());
    }
    if !config.tolerance.is_finite() || config.tolerance <= 0.0 {
        return Err("tolerance must be > 0".to_string());
    }
    if config.max_iterations == 0 {
        return Err("max_iterations must be > 0".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{PersonInput, WithdrawalStrategy};

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn flat_tfsa_household() -> HouseholdInput {
        HouseholdInput {
            p1: PersonInput {
                name: "Riley".to_string(),
                start_age: 60,
                tfsa_balance: 300_000.0,
                ..PersonInput::default()
            },
            end_age: 70,
            strategy: WithdrawalStrategy::TfsaFirst,
            spending_go_go: 10_000.0,
            spending_slow_go: 10_000.0,
            spending_no_go: 10_000.0,
            spending_inflation: 0.0,
            general_inflation: 0.0,
            gap_tolerance: 0.0,
            ..HouseholdInput::default()
        }
    }

    #[test]
    fn finds_multiplier_that_exhausts_the_tfsa() {
        let input = flat_tfsa_household();
        let config = SpendingSolveConfig {
            search_max: 5.0,
            ..SpendingSolveConfig::default()
        };
        let result = solve_max_spending(&input, &RuleBook::canada(), config).expect("solves");
        assert!(result.feasible);
        assert!(result.converged);
        assert_close(result.solved_multiplier.expect("multiplier"), 3.0, 0.01);
        let spending = result.solved_spending.expect("spending");
        assert_close(spending.go_go, 30_000.0, 100.0);
        assert_eq!(result.achieved_success_rate, Some(1.0));
        assert!(!result.iterations.is_empty());
        assert!(result.iterations.len() <= config.max_iterations as usize);
    }

    #[test]
    fn reports_upper_bound_when_still_funded() {
        let input = flat_tfsa_household();
        let config = SpendingSolveConfig {
            search_max: 2.0,
            ..SpendingSolveConfig::default()
        };
        let result = solve_max_spending(&input, &RuleBook::canada(), config).expect("solves");
        assert!(result.feasible);
        assert_eq!(result.solved_multiplier, Some(2.0));
        assert!(result.iterations.is_empty());
    }

    #[test]
    fn reports_infeasible_when_lower_bound_fails() {
        let input = flat_tfsa_household();
        let config = SpendingSolveConfig {
            search_min: 4.0,
            search_max: 6.0,
            ..SpendingSolveConfig::default()
        };
        let result = solve_max_spending(&input, &RuleBook::canada(), config).expect("returns");
        assert!(!result.feasible);
        assert!(result.solved_multiplier.is_none());
    }

    #[test]
    fn rejects_bad_settings() {
        let input = flat_tfsa_household();
        let bad_bounds = SpendingSolveConfig {
            search_min: 2.0,
            search_max: 1.0,
            ..SpendingSolveConfig::default()
        };
        assert!(matches!(
            solve_max_spending(&input, &RuleBook::canada(), bad_bounds),
            Err(SolveError::Config(_))
        ));

        let mut no_spending = flat_tfsa_household();
        no_spending.spending_go_go = 0.0;
        no_spending.spending_slow_go = 0.0;
        no_spending.spending_no_go = 0.0;
        assert!(matches!(
            solve_max_spending(&no_spending, &RuleBook::canada(), SpendingSolveConfig::default()),
            Err(SolveError::Config(_))
        ));
    }

    #[test]
    fn invalid_household_surfaces_simulation_error() {
        let mut input = flat_tfsa_household();
        input.province = "Narnia".to_string();
        assert!(matches!(
            solve_max_spending(&input, &RuleBook::canada(), SpendingSolveConfig::default()),
            Err(SolveError::Simulation(SimulationError::Validation(_)))
        ));
    }
}
