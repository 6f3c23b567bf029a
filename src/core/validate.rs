use tracing::warn;

use super::error::ValidationErrors;
use super::types::{HouseholdInput, PersonInput, Province, SimulationWarning, WarningLevel};

const ALLOCATION_TOLERANCE: f64 = 0.01;
const MAX_AGE: u32 = 120;

/// Codes that are Canadian but have no tax table of their own.
const UNMODELLED_PROVINCES: [&str; 9] = ["MB", "SK", "NS", "NB", "NL", "PE", "YT", "NT", "NU"];

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedHousehold {
    pub province: Province,
    pub active: [bool; 2],
    pub years: u32,
    pub warnings: Vec<SimulationWarning>,
}

pub fn resolve_province(code: &str) -> Result<(Province, Option<SimulationWarning>), String> {
    if let Some(province) = Province::from_code(code) {
        return Ok((province, None));
    }
    let upper = code.trim().to_ascii_uppercase();
    if UNMODELLED_PROVINCES.contains(&upper.as_str()) {
        warn!(province = %upper, "no tax table for province; using Ontario");
        return Ok((
            Province::Ontario,
            Some(SimulationWarning::new(
                WarningLevel::Warning,
                "province_approximated",
                format!("{upper} is not modelled; Ontario tax rules were used."),
            )),
        ));
    }
    Err(format!("province {code:?} is not a Canadian province or territory"))
}

fn non_negative(errors: &mut ValidationErrors, label: &str, value: f64) {
    if !value.is_finite() || value < 0.0 {
        errors.push(format!("{label} must be >= 0"));
    }
}

fn rate(errors: &mut ValidationErrors, label: &str, value: f64) {
    if !value.is_finite() || value <= -100.0 {
        errors.push(format!("{label} must be > -100"));
    }
}

fn allocation(errors: &mut ValidationErrors, label: &str, parts: [f64; 3]) {
    if parts.iter().any(|p| !p.is_finite() || *p < 0.0) {
        errors.push(format!("{label} percentages must be >= 0"));
        return;
    }
    let sum: f64 = parts.iter().sum();
    if (sum - 100.0).abs() > ALLOCATION_TOLERANCE {
        errors.push(format!("{label} percentages must sum to 100 (got {sum:.2})"));
    }
}

fn validate_person(
    errors: &mut ValidationErrors,
    warnings: &mut Vec<SimulationWarning>,
    tag: &str,
    person: &PersonInput,
) {
    if person.start_age == 0 || person.start_age >= MAX_AGE {
        errors.push(format!("{tag}.start_age must be between 1 and {}", MAX_AGE - 1));
    }
    if !(60..=70).contains(&person.cpp_start_age) {
        errors.push(format!("{tag}.cpp_start_age must be between 60 and 70"));
    }
    if !(65..=70).contains(&person.oas_start_age) {
        errors.push(format!("{tag}.oas_start_age must be between 65 and 70"));
    }

    for (label, value) in [
        ("cpp_annual_at_start", person.cpp_annual_at_start),
        ("oas_annual_at_start", person.oas_annual_at_start),
        ("tfsa_balance", person.tfsa_balance),
        ("rrif_balance", person.rrif_balance),
        ("rrsp_balance", person.rrsp_balance),
        ("nonreg_balance", person.nonreg_balance),
        ("nonreg_acb", person.nonreg_acb),
        ("corporate_balance", person.corporate_balance),
        ("corporate_rdtoh", person.corporate_rdtoh),
        ("corporate_cda", person.corporate_cda),
        ("tfsa_room_start", person.tfsa_room_start),
        ("y_nr_inv_elig_div", person.y_nr_inv_elig_div),
        ("y_nr_inv_nonelig_div", person.y_nr_inv_nonelig_div),
        ("y_nr_inv_capg", person.y_nr_inv_capg),
        ("y_nr_inv_roc_pct", person.y_nr_inv_roc_pct),
        ("y_corp_inv_elig_div", person.y_corp_inv_elig_div),
        ("y_corp_inv_capg", person.y_corp_inv_capg),
    ] {
        non_negative(errors, &format!("{tag}.{label}"), value);
    }
    for (label, value) in [
        ("tfsa_growth_rate", person.tfsa_growth_rate),
        ("rrif_growth_rate", person.rrif_growth_rate),
        ("y_nr_cash_interest", person.y_nr_cash_interest),
        ("y_nr_gic_interest", person.y_nr_gic_interest),
        ("y_nr_inv_total_return", person.y_nr_inv_total_return),
        ("y_corp_cash_interest", person.y_corp_cash_interest),
        ("y_corp_gic_interest", person.y_corp_gic_interest),
        ("y_corp_inv_total_return", person.y_corp_inv_total_return),
    ] {
        rate(errors, &format!("{tag}.{label}"), value);
    }
    if person.y_nr_inv_roc_pct > 100.0 {
        errors.push(format!("{tag}.y_nr_inv_roc_pct must be <= 100"));
    }

    allocation(
        errors,
        &format!("{tag} non-registered allocation"),
        [person.nr_cash_pct, person.nr_gic_pct, person.nr_invest_pct],
    );
    allocation(
        errors,
        &format!("{tag} corporate allocation"),
        [person.corp_cash_pct, person.corp_gic_pct, person.corp_invest_pct],
    );

    if person.nonreg_acb > person.nonreg_balance + ALLOCATION_TOLERANCE {
        warnings.push(SimulationWarning::new(
            WarningLevel::Info,
            "acb_capped",
            format!("{tag} non-registered ACB exceeds the balance; it was capped at the balance."),
        ));
    }

    for (i, stream) in person.income_streams.iter().enumerate() {
        non_negative(
            errors,
            &format!("{tag}.income_streams[{i}].annual_amount"),
            stream.annual_amount,
        );
        if let (Some(start), Some(end)) = (stream.start_age, stream.end_age) {
            if end < start {
                errors.push(format!(
                    "{tag}.income_streams[{i}].end_age must be >= start_age"
                ));
            }
        }
    }

    if let Some(manual) = person.manual_withdrawals {
        for (label, value) in [
            ("tfsa", manual.tfsa),
            ("rrif", manual.rrif),
            ("nonreg", manual.nonreg),
            ("corporate", manual.corporate),
        ] {
            non_negative(errors, &format!("{tag}.manual_withdrawals.{label}"), value);
        }
    }
}

pub fn validate_household(input: &HouseholdInput) -> Result<ValidatedHousehold, ValidationErrors> {
    let mut errors = ValidationErrors::default();
    let mut warnings = Vec::new();

    let province = match resolve_province(&input.province) {
        Ok((province, warning)) => {
            warnings.extend(warning);
            Some(province)
        }
        Err(msg) => {
            errors.push(msg);
            None
        }
    };

    let active = [input.p1.is_active(), input.p2.is_active()];
    if !active[0] {
        errors.push("p1 must be an active person");
    } else {
        validate_person(&mut errors, &mut warnings, "p1", &input.p1);
    }
    if active[1] {
        validate_person(&mut errors, &mut warnings, "p2", &input.p2);
    }

    let elder_age = [&input.p1, &input.p2]
        .iter()
        .zip(active)
        .filter(|(_, a)| *a)
        .map(|(p, _)| p.start_age)
        .max()
        .unwrap_or(0);
    if input.end_age <= elder_age {
        errors.push("end_age must be > the oldest person's start_age");
    }
    if input.end_age > MAX_AGE {
        errors.push(format!("end_age must be <= {MAX_AGE}"));
    }
    if input.go_go_end_age > input.slow_go_end_age {
        errors.push("go_go_end_age must be <= slow_go_end_age");
    }

    for (label, value) in [
        ("spending_go_go", input.spending_go_go),
        ("spending_slow_go", input.spending_slow_go),
        ("spending_no_go", input.spending_no_go),
        ("tfsa_room_annual_growth", input.tfsa_room_annual_growth),
        ("gap_tolerance", input.gap_tolerance),
        ("hybrid_topup_amount", input.hybrid_topup_amount),
    ] {
        non_negative(&mut errors, label, value);
    }
    rate(&mut errors, "spending_inflation", input.spending_inflation);
    rate(&mut errors, "general_inflation", input.general_inflation);
    if !(0.0..=0.5).contains(&input.income_split_rrif_fraction) {
        errors.push("income_split_rrif_fraction must be between 0 and 0.5");
    }

    match province {
        Some(province) if errors.is_empty() => Ok(ValidatedHousehold {
            province,
            active,
            years: input.end_age - elder_age,
            warnings,
        }),
        _ => Err(errors),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn couple() -> HouseholdInput {
        HouseholdInput {
            p1: PersonInput {
                name: "Alex".to_string(),
                start_age: 65,
                tfsa_balance: 100_000.0,
                ..PersonInput::default()
            },
            p2: PersonInput {
                name: "Sam".to_string(),
                start_age: 68,
                rrif_balance: 200_000.0,
                ..PersonInput::default()
            },
            ..HouseholdInput::default()
        }
    }

    #[test]
    fn accepts_defaults_and_measures_horizon_from_elder() {
        let validated = validate_household(&couple()).expect("valid");
        assert_eq!(validated.province, Province::Ontario);
        assert_eq!(validated.active, [true, true]);
        assert_eq!(validated.years, 95 - 68);
        assert!(validated.warnings.is_empty());
    }

    #[test]
    fn inactive_partner_is_not_validated() {
        let mut input = couple();
        input.p2 = PersonInput {
            cpp_start_age: 40,
            ..PersonInput::default()
        };
        let validated = validate_household(&input).expect("valid");
        assert_eq!(validated.active, [true, false]);
        assert_eq!(validated.years, 30);
    }

    #[test]
    fn rejects_allocation_that_does_not_sum() {
        let mut input = couple();
        input.p1.nr_cash_pct = 10.0;
        let errors = validate_household(&input).expect_err("invalid");
        assert!(errors.issues.iter().any(|e| e.contains("sum to 100")));
    }

    #[test]
    fn allocation_tolerance_is_a_hundredth() {
        let mut input = couple();
        input.p1.nr_cash_pct = 0.005;
        assert!(validate_household(&input).is_ok());
    }

    #[test]
    fn collects_every_problem() {
        let mut input = couple();
        input.p1.cpp_start_age = 59;
        input.p2.oas_start_age = 71;
        input.income_split_rrif_fraction = 0.6;
        input.end_age = 60;
        let errors = validate_household(&input).expect_err("invalid");
        assert_eq!(errors.issues.len(), 4, "{errors}");
    }

    #[test]
    fn requires_primary_person() {
        let input = HouseholdInput::default();
        let errors = validate_household(&input).expect_err("invalid");
        assert!(errors.issues[0].contains("p1"));
    }

    #[test]
    fn unmodelled_province_maps_to_ontario_with_warning() {
        let (province, warning) = resolve_province("mb").expect("canadian");
        assert_eq!(province, Province::Ontario);
        assert_eq!(warning.expect("warning").code, "province_approximated");
        assert_eq!(resolve_province(" bc ").expect("ok").0, Province::BritishColumbia);
        assert!(resolve_province("WA").is_err());
    }

    #[test]
    fn acb_above_balance_warns() {
        let mut input = couple();
        input.p1.nonreg_balance = 10_000.0;
        input.p1.nonreg_acb = 15_000.0;
        let validated = validate_household(&input).expect("valid");
        assert_eq!(validated.warnings[0].code, "acb_capped");
    }
}
