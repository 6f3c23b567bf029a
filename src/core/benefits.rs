//! CPP, OAS (with recovery tax) and GIS projections.
//!
//! `index` arguments are the cumulative general-inflation factor since the
//! simulation's start year; benefit amounts in [`PersonInput`] are in
//! start-year dollars.

use super::rules::YearRules;
use super::types::PersonInput;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OasResult {
    pub gross: f64,
    pub clawback: f64,
}

impl OasResult {
    pub fn net(&self) -> f64 {
        self.gross - self.clawback
    }
}

pub fn cpp_start_factor(start_age: u32, rules: &YearRules<'_>) -> f64 {
    let cpp = rules.table.cpp;
    let start_age = start_age.clamp(cpp.min_start_age, cpp.max_start_age);
    if start_age < cpp.standard_age {
        let months = ((cpp.standard_age - start_age) * 12) as f64;
        1.0 - cpp.early_monthly_reduction * months
    } else {
        let months = ((start_age - cpp.standard_age) * 12) as f64;
        1.0 + cpp.late_monthly_increase * months
    }
}

pub fn project_cpp(person: &PersonInput, age: u32, index: f64, rules: &YearRules<'_>) -> f64 {
    if age < person.cpp_start_age || person.cpp_annual_at_start <= 0.0 {
        return 0.0;
    }
    person.cpp_annual_at_start * cpp_start_factor(person.cpp_start_age, rules) * index
}

pub fn oas_deferral_factor(start_age: u32, rules: &YearRules<'_>) -> f64 {
    let oas = rules.table.oas;
    let months = (start_age.clamp(oas.standard_age, oas.max_start_age) - oas.standard_age) * 12;
    1.0 + oas.deferral_monthly_increase * months as f64
}

pub fn oas_gross(person: &PersonInput, age: u32, index: f64, rules: &YearRules<'_>) -> f64 {
    if age < person.oas_start_age || person.oas_annual_at_start <= 0.0 {
        return 0.0;
    }
    let oas = rules.table.oas;
    let age_boost = if age >= oas.increase_age {
        1.0 + oas.increase_rate
    } else {
        1.0
    };
    person.oas_annual_at_start * oas_deferral_factor(person.oas_start_age, rules) * age_boost * index
}

/// Recovery tax on `gross` OAS given net income before the recovery deduction.
pub fn oas_clawback(gross: f64, net_income: f64, rules: &YearRules<'_>) -> f64 {
    if gross <= 0.0 {
        return 0.0;
    }
    let oas = rules.table.oas;
    let excess = (net_income - rules.dollars(oas.recovery_threshold)).max(0.0);
    (oas.recovery_rate * excess).min(gross)
}

pub fn project_oas(
    person: &PersonInput,
    age: u32,
    net_income: f64,
    index: f64,
    rules: &YearRules<'_>,
) -> OasResult {
    let gross = oas_gross(person, age, index, rules);
    OasResult {
        gross,
        clawback: oas_clawback(gross, net_income, rules),
    }
}

pub fn oas_headroom(net_income: f64, rules: &YearRules<'_>) -> f64 {
    (rules.dollars(rules.table.oas.recovery_threshold) - net_income).max(0.0)
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GisApplicant {
    pub receives_oas: bool,
    /// Income for the means test, excluding OAS and GIS.
    pub tested_income: f64,
}

/// GIS for `applicant`. A partner counts as a couple only while they also
/// receive OAS; otherwise the single schedule applies to combined income.
pub fn project_gis(
    applicant: GisApplicant,
    partner: Option<GisApplicant>,
    rules: &YearRules<'_>,
) -> f64 {
    if !applicant.receives_oas {
        return 0.0;
    }
    let gis = rules.table.gis;
    let income = applicant.tested_income.max(0.0)
        + partner.map_or(0.0, |p| p.tested_income.max(0.0));

    let (max, ceiling, rate) = match partner {
        Some(p) if p.receives_oas => (gis.couple_max, gis.couple_ceiling, gis.couple_reduction_rate),
        _ => (gis.single_max, gis.single_ceiling, gis.single_reduction_rate),
    };

    if income >= rules.dollars(ceiling) {
        return 0.0;
    }
    (rules.dollars(max) - rate * income).max(0.0)
}
