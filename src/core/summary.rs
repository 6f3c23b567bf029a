//! Run-level rollups derived from the year sequence.

use serde::{Deserialize, Serialize};

use super::types::{
    ChartPoint, EstateSummary, HealthCriteria, HouseholdInput, NetWorthTrend, SimulationSummary,
    SimulationWarning, WarningLevel, YearResult,
};

const TREND_BAND: f64 = 0.05;
const TAX_RATE_FULL_SCORE: f64 = 0.10;
const TAX_RATE_ZERO_SCORE: f64 = 0.40;
const WITHDRAWAL_RATE_FULL_SCORE: f64 = 0.04;
const WITHDRAWAL_RATE_ZERO_SCORE: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthRubric {
    pub funding_coverage: f64,
    pub tax_efficiency: f64,
    pub estate_preservation: f64,
    pub benefit_optimization: f64,
    pub risk_management: f64,
}

impl Default for HealthRubric {
    fn default() -> Self {
        Self {
            funding_coverage: 30.0,
            tax_efficiency: 20.0,
            estate_preservation: 20.0,
            benefit_optimization: 15.0,
            risk_management: 15.0,
        }
    }
}

impl HealthRubric {
    fn total_weight(&self) -> f64 {
        self.funding_coverage
            + self.tax_efficiency
            + self.estate_preservation
            + self.benefit_optimization
            + self.risk_management
    }

    pub fn score(&self, criteria: &HealthCriteria) -> f64 {
        let weight = self.total_weight();
        if weight <= 0.0 {
            return 0.0;
        }
        (self.funding_coverage * criteria.funding_coverage
            + self.tax_efficiency * criteria.tax_efficiency
            + self.estate_preservation * criteria.estate_preservation
            + self.benefit_optimization * criteria.benefit_optimization
            + self.risk_management * criteria.risk_management)
            / weight
    }
}

pub fn health_rating(score: f64) -> &'static str {
    if score >= 80.0 {
        "Excellent"
    } else if score >= 65.0 {
        "Good"
    } else if score >= 50.0 {
        "Fair"
    } else {
        "At Risk"
    }
}

/// 100 at or below `full`, 0 at or above `zero`, linear in between.
fn linear_score(value: f64, full: f64, zero: f64) -> f64 {
    if value <= full {
        100.0
    } else if value >= zero {
        0.0
    } else {
        100.0 * (zero - value) / (zero - full)
    }
}

fn personal_tax(y: &YearResult) -> f64 {
    y.tax_p1 + y.tax_p2 + y.oas_clawback_p1 + y.oas_clawback_p2
}

fn gross_income(y: &YearResult) -> f64 {
    y.cpp_p1
        + y.cpp_p2
        + y.oas_p1
        + y.oas_p2
        + y.pension_income_p1
        + y.pension_income_p2
        + y.other_income_p1
        + y.other_income_p2
        + y.nonreg_distributions_p1
        + y.nonreg_distributions_p2
        + y.total_withdrawals
}

pub fn summarize(
    years: &[YearResult],
    input: &HouseholdInput,
    estate: &EstateSummary,
    rubric: &HealthRubric,
) -> SimulationSummary {
    let years_simulated = years.len() as u32;
    let years_funded = years.iter().filter(|y| y.plan_success).count() as u32;
    let first_failure = years.iter().position(|y| !y.plan_success);
    let sum = |f: fn(&YearResult) -> f64| years.iter().map(f).sum::<f64>();

    let total_tax_paid = sum(personal_tax);
    let total_corporate_tax = sum(|y| y.corporate_tax_p1 + y.corporate_tax_p2);
    let total_cpp = sum(|y| y.cpp_p1 + y.cpp_p2);
    let total_oas = sum(|y| y.oas_p1 + y.oas_p2);
    let total_gis = sum(|y| y.gis_p1 + y.gis_p2);
    let total_oas_clawback = sum(|y| y.oas_clawback_p1 + y.oas_clawback_p2);
    let total_withdrawals = sum(|y| y.total_withdrawals);
    let total_taxable_income = sum(|y| y.taxable_income_p1 + y.taxable_income_p2);
    let total_gross_income = sum(gross_income);

    let initial_total_assets = input.initial_total_assets();
    let final_net_worth = years
        .last()
        .map_or(initial_total_assets, |y| y.total_portfolio);
    let peak_net_worth = years
        .iter()
        .map(|y| y.total_portfolio)
        .fold(initial_total_assets, f64::max);

    let net_worth_trend = if initial_total_assets <= 0.0 {
        if final_net_worth > 0.0 {
            NetWorthTrend::Growing
        } else {
            NetWorthTrend::Stable
        }
    } else {
        let ratio = final_net_worth / initial_total_assets;
        if ratio > 1.0 + TREND_BAND {
            NetWorthTrend::Growing
        } else if ratio < 1.0 - TREND_BAND {
            NetWorthTrend::Declining
        } else {
            NetWorthTrend::Stable
        }
    };
    let net_worth_cagr = if initial_total_assets > 0.0 && years_simulated > 0 {
        (final_net_worth.max(0.0) / initial_total_assets).powf(1.0 / years_simulated as f64) - 1.0
    } else {
        0.0
    };

    let avg_effective_tax_rate = if total_taxable_income > 0.0 {
        total_tax_paid / total_taxable_income
    } else {
        0.0
    };
    let tax_efficiency_ratio = if total_gross_income > 0.0 {
        1.0 - total_tax_paid / total_gross_income
    } else {
        1.0
    };

    let funding_coverage = if years_simulated > 0 {
        100.0 * years_funded as f64 / years_simulated as f64
    } else {
        0.0
    };
    let estate_preservation = if initial_total_assets > 0.0 {
        100.0 * (estate.after_tax_estate / initial_total_assets).clamp(0.0, 1.0)
    } else {
        100.0
    };
    let benefit_optimization = if total_oas > 0.0 {
        100.0 * (1.0 - total_oas_clawback / total_oas).clamp(0.0, 1.0)
    } else {
        100.0
    };
    let depletion_score = match first_failure {
        None => 100.0,
        Some(idx) => 100.0 * idx as f64 / years_simulated.max(1) as f64,
    };
    let initial_withdrawal_rate = match years.first() {
        Some(y) if initial_total_assets > 0.0 => y.total_withdrawals / initial_total_assets,
        _ => 0.0,
    };
    let risk_management = 0.5
        * (depletion_score
            + linear_score(
                initial_withdrawal_rate,
                WITHDRAWAL_RATE_FULL_SCORE,
                WITHDRAWAL_RATE_ZERO_SCORE,
            ));

    let health_criteria = HealthCriteria {
        funding_coverage,
        tax_efficiency: linear_score(avg_effective_tax_rate, TAX_RATE_FULL_SCORE, TAX_RATE_ZERO_SCORE),
        estate_preservation,
        benefit_optimization,
        risk_management,
    };
    let health_score = rubric.score(&health_criteria);

    SimulationSummary {
        years_simulated,
        years_funded,
        total_underfunded_years: years_simulated - years_funded,
        success_rate: if years_simulated > 0 {
            years_funded as f64 / years_simulated as f64
        } else {
            0.0
        },
        first_failure_year: first_failure.map(|idx| years[idx].year),
        total_spending_gap: sum(|y| y.spending_gap),
        total_tax_paid,
        total_corporate_tax,
        total_withdrawals,
        total_tfsa_withdrawals: sum(|y| y.tfsa_withdrawal_p1 + y.tfsa_withdrawal_p2),
        total_rrif_withdrawals: sum(|y| y.rrif_withdrawal_p1 + y.rrif_withdrawal_p2),
        total_nonreg_withdrawals: sum(|y| y.nonreg_withdrawal_p1 + y.nonreg_withdrawal_p2),
        total_corporate_withdrawals: sum(|y| y.corporate_withdrawal_p1 + y.corporate_withdrawal_p2),
        total_cpp,
        total_oas,
        total_gis,
        total_oas_clawback,
        total_government_benefits: total_cpp + total_oas + total_gis - total_oas_clawback,
        initial_total_assets,
        final_net_worth,
        peak_net_worth,
        net_worth_trend,
        net_worth_cagr,
        avg_effective_tax_rate,
        tax_efficiency_ratio,
        health_score,
        health_rating: health_rating(health_score).to_string(),
        health_criteria,
        final_estate_gross: estate.gross_estate,
        final_estate_after_tax: estate.after_tax_estate,
    }
}

pub fn chart_data(years: &[YearResult]) -> Vec<ChartPoint> {
    years
        .iter()
        .map(|y| ChartPoint {
            year: y.year,
            age_p1: y.age_p1,
            age_p2: y.age_p2,
            net_worth: y.total_portfolio,
            spending_need: y.spending_need,
            spending_met: y.spending_met,
            total_tax: y.total_tax,
            government_benefits: y.total_government_benefits(),
            tfsa: y.tfsa_balance_p1 + y.tfsa_balance_p2,
            registered: y.rrif_balance_p1 + y.rrif_balance_p2 + y.rrsp_balance_p1 + y.rrsp_balance_p2,
            nonreg: y.nonreg_balance_p1 + y.nonreg_balance_p2,
            corporate: y.corporate_balance_p1 + y.corporate_balance_p2,
        })
        .collect()
}

pub fn summary_warnings(summary: &SimulationSummary) -> Vec<SimulationWarning> {
    let mut warnings = Vec::new();
    if summary.total_underfunded_years > 0 {
        let first = summary
            .first_failure_year
            .map(|y| format!(" starting in {y}"))
            .unwrap_or_default();
        warnings.push(SimulationWarning::new(
            WarningLevel::Alert,
            "underfunded",
            format!(
                "Plan is underfunded in {} of {} years{first}; total shortfall ${:.0}.",
                summary.total_underfunded_years, summary.years_simulated, summary.total_spending_gap
            ),
        ));
    }
    if summary.total_oas_clawback > 0.0 {
        warnings.push(SimulationWarning::new(
            WarningLevel::Warning,
            "oas_clawback",
            format!(
                "OAS recovery tax of ${:.0} over the plan.",
                summary.total_oas_clawback
            ),
        ));
    }
    if summary.total_gis > 0.0 {
        warnings.push(SimulationWarning::new(
            WarningLevel::Info,
            "gis_received",
            format!("GIS of ${:.0} received over the plan.", summary.total_gis),
        ));
    }
    warnings
}
