use tracing::info;

use super::error::SimulationError;
use super::ledger::PersonLedger;
use super::rules::{RuleBook, YearRules};
use super::strategy::resolve_strategy;
use super::summary::{HealthRubric, chart_data, summarize, summary_warnings};
use super::tax::{IncomeBreakdown, total_tax};
use super::types::{EstateSummary, HouseholdInput, Province, SimulationResponse, YearResult};
use super::validate::validate_household;
use super::year::{HouseholdState, YearContext, simulate_year};

pub fn simulate_household(input: &HouseholdInput) -> Result<SimulationResponse, SimulationError> {
    run_simulation(input, &RuleBook::canada(), &HealthRubric::default())
}

pub fn run_simulation(
    input: &HouseholdInput,
    rule_book: &RuleBook,
    rubric: &HealthRubric,
) -> Result<SimulationResponse, SimulationError> {
    let validated = validate_household(input)?;
    let (strategy, fallback) = resolve_strategy(input);
    let mut warnings = validated.warnings;
    warnings.extend(fallback);

    let ctx = YearContext {
        input,
        rule_book,
        province: validated.province,
        strategy,
        active: validated.active,
    };
    let (year_by_year, state) = run_years(&ctx, validated.years)?;

    let final_year = year_by_year
        .last()
        .map_or(input.start_year, |y| y.year);
    let rules = rule_book.for_year(final_year, input.general_inflation);
    let estate_summary = estate_at_horizon(&state, year_by_year.last(), validated.province, &rules);
    let summary = summarize(&year_by_year, input, &estate_summary, rubric);
    warnings.extend(summary_warnings(&summary));

    info!(
        strategy = strategy.as_str(),
        province = validated.province.code(),
        years = summary.years_simulated,
        years_funded = summary.years_funded,
        final_net_worth = summary.final_net_worth,
        health_score = summary.health_score,
        "household simulation finished"
    );

    Ok(SimulationResponse {
        success: true,
        message: format!(
            "Simulated {} years with the {} strategy; {} funded.",
            summary.years_simulated,
            strategy.as_str(),
            summary.years_funded
        ),
        chart_data: chart_data(&year_by_year),
        year_by_year,
        summary,
        estate_summary,
        warnings,
    })
}

/// Runs years in order, stopping after the first underfunded year when
/// `stop_on_fail` is set.
pub fn run_years(
    ctx: &YearContext<'_>,
    years: u32,
) -> Result<(Vec<YearResult>, HouseholdState), SimulationError> {
    let mut state = HouseholdState::from_input(ctx.input);
    let mut results = Vec::with_capacity(years as usize);
    for year_index in 0..years {
        let result = simulate_year(ctx, &mut state, year_index)?;
        let failed = !result.plan_success;
        results.push(result);
        if failed && ctx.input.stop_on_fail {
            break;
        }
    }
    Ok((results, state))
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct PersonEstate {
    tfsa: f64,
    registered: f64,
    nonreg: f64,
    corporate: f64,
    tax_on_registered: f64,
    tax_on_capital_gains: f64,
    tax_on_corporate: f64,
}

/// Deemed disposition at death, stacked on top of the final year's income:
/// registered balances first, then the taxable half of unrealized gains,
/// then the corporate wind-up dividend.
fn person_estate(
    ledger: &PersonLedger,
    age: u32,
    final_income: f64,
    province: Province,
    rules: &YearRules<'_>,
) -> PersonEstate {
    let table = rules.table;
    let registered = ledger.registered_balance().max(0.0);
    let unrealized = (ledger.nonreg.balance - ledger.nonreg.acb).max(0.0);
    let wind_up = ledger.corporate.max_gross(&table.corporate);
    let taxable_dividend = (wind_up - ledger.corporate.capital_dividend_room()).max(0.0);

    let mut income = IncomeBreakdown::ordinary(final_income.max(0.0), age);
    let base = total_tax(&income, province, rules);
    income.ordinary_income += registered;
    let with_registered = total_tax(&income, province, rules);
    income.taxable_capital_gains += unrealized * table.capital_gains_inclusion;
    let with_gains = total_tax(&income, province, rules);
    income.non_eligible_dividends += taxable_dividend;
    let with_corporate = total_tax(&income, province, rules);

    PersonEstate {
        tfsa: ledger.tfsa.max(0.0),
        registered,
        nonreg: ledger.nonreg.balance.max(0.0),
        corporate: wind_up,
        tax_on_registered: with_registered - base,
        tax_on_capital_gains: with_gains - with_registered,
        tax_on_corporate: with_corporate - with_gains,
    }
}

/// Values what is left at the end of the horizon. Corporate holdings are
/// valued at wind-up proceeds, dividend refund included.
pub fn estate_at_horizon(
    state: &HouseholdState,
    last: Option<&YearResult>,
    province: Province,
    rules: &YearRules<'_>,
) -> EstateSummary {
    let ages = last.map_or([0, 0], |y| [y.age_p1, y.age_p2]);
    let incomes = last.map_or([0.0, 0.0], |y| [y.taxable_income_p1, y.taxable_income_p2]);
    let people: Vec<PersonEstate> = state
        .ledgers
        .iter()
        .enumerate()
        .map(|(i, ledger)| person_estate(ledger, ages[i], incomes[i], province, rules))
        .collect();
    let sum = |f: fn(&PersonEstate) -> f64| people.iter().map(f).sum::<f64>();

    let tfsa_value = sum(|p| p.tfsa);
    let registered_value = sum(|p| p.registered);
    let nonreg_value = sum(|p| p.nonreg);
    let corporate_value = sum(|p| p.corporate);
    let cash_value = state.cash_on_hand.max(0.0);
    let tax_on_registered = sum(|p| p.tax_on_registered);
    let tax_on_capital_gains = sum(|p| p.tax_on_capital_gains);
    let tax_on_corporate = sum(|p| p.tax_on_corporate);

    let gross_estate = tfsa_value + registered_value + nonreg_value + corporate_value + cash_value;
    let total_estate_tax = tax_on_registered + tax_on_capital_gains + tax_on_corporate;
    EstateSummary {
        gross_estate,
        tfsa_value,
        registered_value,
        nonreg_value,
        corporate_value,
        cash_value,
        tax_on_registered,
        tax_on_capital_gains,
        tax_on_corporate,
        total_estate_tax,
        after_tax_estate: gross_estate - total_estate_tax,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{
        ManualWithdrawals, PersonInput, WarningLevel, WithdrawalStrategy,
    };
    use proptest::prelude::{prop_assert, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn assert_approx_tol(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn retiree(name: &str, age: u32) -> PersonInput {
        PersonInput {
            name: name.to_string(),
            start_age: age,
            tfsa_growth_rate: 4.0,
            rrif_growth_rate: 4.0,
            y_nr_inv_total_return: 4.0,
            ..PersonInput::default()
        }
    }

    fn flat_spending(input: &mut HouseholdInput, amount: f64) {
        input.spending_go_go = amount;
        input.spending_slow_go = amount;
        input.spending_no_go = amount;
    }

    fn couple(strategy: WithdrawalStrategy) -> HouseholdInput {
        let mut input = HouseholdInput {
            p1: PersonInput {
                cpp_annual_at_start: 12_000.0,
                oas_annual_at_start: 8_800.0,
                tfsa_balance: 120_000.0,
                rrif_balance: 450_000.0,
                nonreg_balance: 150_000.0,
                nonreg_acb: 100_000.0,
                y_nr_inv_elig_div: 2.0,
                ..retiree("Alex", 72)
            },
            p2: PersonInput {
                cpp_annual_at_start: 7_000.0,
                oas_annual_at_start: 8_800.0,
                tfsa_balance: 90_000.0,
                rrif_balance: 200_000.0,
                nonreg_balance: 80_000.0,
                nonreg_acb: 80_000.0,
                corporate_balance: 60_000.0,
                manual_withdrawals: Some(ManualWithdrawals {
                    tfsa: 5_000.0,
                    rrif: 1_000.0,
                    nonreg: 3_000.0,
                    corporate: 2_000.0,
                }),
                ..retiree("Sam", 70)
            },
            province: "BC".to_string(),
            strategy,
            end_age: 97,
            ..HouseholdInput::default()
        };
        flat_spending(&mut input, 70_000.0);
        input
    }

    #[test]
    fn horizon_runs_from_elder_start_age() {
        let response = simulate_household(&couple(WithdrawalStrategy::Balanced)).expect("runs");
        assert_eq!(response.summary.years_simulated, 97 - 72);
        assert_eq!(response.year_by_year.len(), 25);
        assert_eq!(response.chart_data.len(), 25);
        assert_eq!(response.year_by_year[0].year, 2025);
        assert_eq!(response.year_by_year[24].age_p1, 96);
        assert_eq!(response.year_by_year[24].age_p2, 94);
        assert!(response.success);
    }

    #[test]
    fn phantom_income_taxed_the_same_whether_reinvested_or_paid_out() {
        let build = |reinvest: bool| {
            let mut input = HouseholdInput {
                p1: PersonInput {
                    tfsa_balance: 1_000_000.0,
                    nonreg_balance: 300_000.0,
                    nonreg_acb: 300_000.0,
                    y_nr_inv_total_return: 6.0,
                    y_nr_inv_elig_div: 2.5,
                    ..retiree("Robin", 60)
                },
                strategy: WithdrawalStrategy::TfsaFirst,
                end_age: 70,
                reinvest_nonreg_dist: reinvest,
                ..HouseholdInput::default()
            };
            flat_spending(&mut input, 40_000.0);
            simulate_household(&input).expect("runs")
        };
        let reinvested = build(true);
        let paid_out = build(false);
        assert_eq!(reinvested.year_by_year.len(), 10);

        let mut cumulative_distributions = 0.0;
        for (r, p) in reinvested.year_by_year.iter().zip(&paid_out.year_by_year) {
            assert_approx(r.taxable_income_p1, p.taxable_income_p1);
            assert_approx(r.nonreg_distributions_p1, p.nonreg_distributions_p1);
            assert_approx(r.tax_p1, p.tax_p1);
            assert_approx(r.tfsa_withdrawal_p1, p.tfsa_withdrawal_p1);
            assert_approx(r.rrif_withdrawal_p1, p.rrif_withdrawal_p1);
            assert_approx(r.nonreg_withdrawal_p1, 0.0);
            assert_approx(p.nonreg_withdrawal_p1, 0.0);

            cumulative_distributions += p.nonreg_distributions_p1;
            assert!(r.nonreg_balance_p1 > p.nonreg_balance_p1);
            assert_approx_tol(
                r.nonreg_balance_p1 - p.nonreg_balance_p1,
                cumulative_distributions,
                1e-4,
            );
            assert_approx_tol(p.cash_on_hand, cumulative_distributions, 1e-3);
        }
        assert_approx_tol(paid_out.year_by_year[0].cash_on_hand, 7_500.0, 1e-3);
    }

    #[test]
    fn empty_partner_contributes_nothing() {
        let mut input = HouseholdInput {
            p1: PersonInput {
                cpp_annual_at_start: 10_000.0,
                oas_annual_at_start: 8_800.0,
                tfsa_balance: 100_000.0,
                rrif_balance: 400_000.0,
                nonreg_balance: 100_000.0,
                nonreg_acb: 60_000.0,
                ..retiree("Jordan", 66)
            },
            ..HouseholdInput::default()
        };
        flat_spending(&mut input, 55_000.0);
        let response = simulate_household(&input).expect("runs");

        for y in &response.year_by_year {
            assert_eq!(y.age_p2, 0);
            for value in [
                y.cpp_p2,
                y.oas_p2,
                y.gis_p2,
                y.oas_clawback_p2,
                y.pension_income_p2,
                y.other_income_p2,
                y.nonreg_distributions_p2,
                y.tfsa_contribution_p2,
                y.tfsa_withdrawal_p2,
                y.rrif_withdrawal_p2,
                y.rrif_minimum_p2,
                y.nonreg_withdrawal_p2,
                y.corporate_withdrawal_p2,
                y.tfsa_balance_p2,
                y.rrif_balance_p2,
                y.rrsp_balance_p2,
                y.nonreg_balance_p2,
                y.nonreg_acb_p2,
                y.corporate_balance_p2,
                y.taxable_income_p2,
                y.tax_p2,
                y.marginal_rate_p2,
                y.corporate_tax_p2,
            ] {
                assert_eq!(value, 0.0);
            }
            let p1_only = y.tfsa_withdrawal_p1
                + y.rrif_withdrawal_p1
                + y.nonreg_withdrawal_p1
                + y.corporate_withdrawal_p1;
            assert_approx(y.total_withdrawals, p1_only);
        }
        let summary = &response.summary;
        let p1_cpp: f64 = response.year_by_year.iter().map(|y| y.cpp_p1).sum();
        assert_approx(summary.total_cpp, p1_cpp);
        assert_approx(summary.initial_total_assets, 600_000.0);
    }

    #[test]
    fn rrif_minimum_is_drawn_under_every_strategy() {
        let book = RuleBook::canada();
        for strategy in WithdrawalStrategy::ALL {
            let input = couple(strategy);
            let response = simulate_household(&input).expect("runs");
            let mut opening = [input.p1.rrif_balance, input.p2.rrif_balance];
            for y in &response.year_by_year {
                let rules = book.for_year(y.year, input.general_inflation);
                for (i, (age, minimum, drawn, closing)) in [
                    (y.age_p1, y.rrif_minimum_p1, y.rrif_withdrawal_p1, y.rrif_balance_p1),
                    (y.age_p2, y.rrif_minimum_p2, y.rrif_withdrawal_p2, y.rrif_balance_p2),
                ]
                .into_iter()
                .enumerate()
                {
                    let required = opening[i] * rules.table.rrif.minimum_rate(age);
                    assert_approx_tol(minimum, required, 1e-6);
                    assert!(
                        drawn + EPS >= required,
                        "{}: {} drew {drawn} below minimum {required} at age {age}",
                        strategy.as_str(),
                        if i == 0 { "p1" } else { "p2" }
                    );
                    opening[i] = closing;
                }
            }
        }
    }

    #[test]
    fn balanced_never_leans_on_one_source() {
        let mut input = HouseholdInput {
            p1: PersonInput {
                tfsa_balance: 400_000.0,
                rrif_balance: 400_000.0,
                nonreg_balance: 400_000.0,
                nonreg_acb: 300_000.0,
                ..retiree("Casey", 65)
            },
            strategy: WithdrawalStrategy::Balanced,
            end_age: 80,
            ..HouseholdInput::default()
        };
        flat_spending(&mut input, 50_000.0);
        let response = simulate_household(&input).expect("runs");
        for y in &response.year_by_year {
            assert!(y.total_withdrawals > 0.0);
            let sources = [
                y.tfsa_withdrawal_p1,
                y.rrif_withdrawal_p1,
                y.nonreg_withdrawal_p1,
                y.corporate_withdrawal_p1,
            ];
            for amount in sources {
                assert!(
                    amount < 0.8 * y.total_withdrawals,
                    "year {}: {amount} of {}",
                    y.year,
                    y.total_withdrawals
                );
            }
        }
    }

    #[test]
    fn zero_spending_only_grows() {
        let input = HouseholdInput {
            p1: PersonInput {
                tfsa_balance: 150_000.0,
                nonreg_balance: 100_000.0,
                nonreg_acb: 100_000.0,
                ..retiree("Morgan", 65)
            },
            ..HouseholdInput::default()
        };
        let response = simulate_household(&input).expect("runs");
        assert!(response.year_by_year.iter().all(|y| y.total_withdrawals == 0.0));
        assert_eq!(response.summary.total_withdrawals, 0.0);
        assert!(response.summary.final_estate_after_tax > response.summary.initial_total_assets);
        assert_eq!(response.summary.years_funded, 30);
    }

    #[test]
    fn zero_spending_draws_only_rrif_minimums() {
        let input = HouseholdInput {
            p1: PersonInput {
                tfsa_balance: 150_000.0,
                rrif_balance: 200_000.0,
                rrsp_balance: 100_000.0,
                nonreg_balance: 100_000.0,
                nonreg_acb: 100_000.0,
                ..retiree("Morgan", 65)
            },
            ..HouseholdInput::default()
        };
        let response = simulate_household(&input).expect("runs");
        for y in &response.year_by_year {
            assert_approx_tol(y.total_withdrawals, y.rrif_minimum_p1, 1e-6);
            assert_approx_tol(y.rrif_withdrawal_p1, y.rrif_minimum_p1, 1e-6);
            assert_eq!(y.tfsa_withdrawal_p1, 0.0);
            assert_eq!(y.nonreg_withdrawal_p1, 0.0);
            assert_eq!(y.corporate_withdrawal_p1, 0.0);
            assert!(y.plan_success);
        }
        assert!(response.year_by_year[0].rrif_minimum_p1 > 0.0);
        assert!(response.summary.final_estate_after_tax > response.summary.initial_total_assets);
    }

    #[test]
    fn zero_spending_rrsp_is_untouched_until_conversion() {
        let input = HouseholdInput {
            p1: PersonInput {
                rrsp_balance: 300_000.0,
                tfsa_balance: 50_000.0,
                ..retiree("Jordan", 65)
            },
            end_age: 75,
            ..HouseholdInput::default()
        };
        let response = simulate_household(&input).expect("runs");
        for y in &response.year_by_year {
            if y.age_p1 < 71 {
                assert_eq!(y.total_withdrawals, 0.0, "age {}", y.age_p1);
            } else {
                assert!(y.rrif_withdrawal_p1 > 0.0, "age {}", y.age_p1);
            }
        }
    }

    #[test]
    fn identical_inputs_give_identical_output() {
        let input = couple(WithdrawalStrategy::MinimizeIncome);
        let first = serde_json::to_string(&simulate_household(&input).expect("runs")).expect("json");
        let second = serde_json::to_string(&simulate_household(&input).expect("runs")).expect("json");
        assert_eq!(first, second);
    }

    #[test]
    fn insufficient_assets_raise_an_alert() {
        let mut input = HouseholdInput {
            p1: PersonInput {
                tfsa_balance: 150_000.0,
                ..retiree("Taylor", 65)
            },
            ..HouseholdInput::default()
        };
        flat_spending(&mut input, 60_000.0);
        let response = simulate_household(&input).expect("runs");
        let summary = &response.summary;
        assert_eq!(summary.years_simulated, 30);
        assert!(summary.years_funded < 30);
        assert!(summary.total_underfunded_years > 0);
        assert!(summary.first_failure_year.is_some());
        assert!(response.warnings.iter().any(|w| {
            w.level == WarningLevel::Alert && w.message.to_lowercase().contains("underfunded")
        }));
    }

    #[test]
    fn stop_on_fail_ends_after_first_failure() {
        let mut input = HouseholdInput {
            p1: PersonInput {
                tfsa_balance: 150_000.0,
                ..retiree("Taylor", 65)
            },
            stop_on_fail: true,
            ..HouseholdInput::default()
        };
        flat_spending(&mut input, 60_000.0);
        let response = simulate_household(&input).expect("runs");
        let last = response.year_by_year.last().expect("at least one year");
        assert!(!last.plan_success);
        assert!(response.year_by_year[..response.year_by_year.len() - 1]
            .iter()
            .all(|y| y.plan_success));
        assert_eq!(response.summary.years_simulated as usize, response.year_by_year.len());
        assert!(response.summary.years_simulated < 30);
    }

    #[test]
    fn long_horizon_stays_finite() {
        let mut input = HouseholdInput {
            p1: PersonInput {
                cpp_annual_at_start: 11_000.0,
                oas_annual_at_start: 8_800.0,
                tfsa_balance: 200_000.0,
                rrif_balance: 500_000.0,
                nonreg_balance: 200_000.0,
                nonreg_acb: 150_000.0,
                ..retiree("Quinn", 65)
            },
            end_age: 120,
            ..HouseholdInput::default()
        };
        flat_spending(&mut input, 45_000.0);
        let response = simulate_household(&input).expect("runs");
        assert_eq!(response.summary.years_simulated, 55);
        for y in &response.year_by_year {
            assert!(y.total_portfolio.is_finite());
            assert!(y.spending_need.is_finite());
            assert!(y.total_tax.is_finite());
        }
        assert!(response.summary.health_score.is_finite());
        assert!(response.estate_summary.after_tax_estate.is_finite());
    }

    #[test]
    fn corporate_optimized_draws_from_corporation_first_year() {
        let mut input = HouseholdInput {
            p1: PersonInput {
                corporate_balance: 300_000.0,
                tfsa_balance: 50_000.0,
                ..retiree("Devon", 60)
            },
            strategy: WithdrawalStrategy::CorporateOptimized,
            ..HouseholdInput::default()
        };
        flat_spending(&mut input, 50_000.0);
        let response = simulate_household(&input).expect("runs");
        assert!(response.year_by_year[0].corporate_withdrawal_p1 > 0.0);
        assert_eq!(
            response.year_by_year[0].strategy_applied,
            WithdrawalStrategy::CorporateOptimized
        );
    }

    #[test]
    fn fallback_strategy_is_reported() {
        let mut input = couple(WithdrawalStrategy::RrifSplitting);
        input.p2 = PersonInput::default();
        let response = simulate_household(&input).expect("runs");
        assert_eq!(
            response.year_by_year[0].strategy_applied,
            WithdrawalStrategy::Balanced
        );
        assert!(response.warnings.iter().any(|w| w.code == "strategy_fallback"));
    }

    #[test]
    fn invalid_input_is_rejected_before_any_year() {
        let mut input = couple(WithdrawalStrategy::Balanced);
        input.p1.nr_invest_pct = 50.0;
        input.province = "XX".to_string();
        match simulate_household(&input) {
            Err(SimulationError::Validation(errors)) => assert_eq!(errors.issues.len(), 2),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn estate_taxes_registered_and_gains_but_not_tfsa_or_cash() {
        let book = RuleBook::canada();
        let rules = book.for_year(2025, 0.0);
        let state = HouseholdState {
            ledgers: [
                PersonLedger::from_input(&PersonInput {
                    tfsa_balance: 100_000.0,
                    rrif_balance: 200_000.0,
                    nonreg_balance: 100_000.0,
                    nonreg_acb: 60_000.0,
                    ..PersonInput::default()
                }),
                PersonLedger::default(),
            ],
            cash_on_hand: 5_000.0,
        };
        let estate = estate_at_horizon(&state, None, Province::Ontario, &rules);

        assert_approx(estate.gross_estate, 405_000.0);
        assert_approx(estate.cash_value, 5_000.0);
        let registered_tax = total_tax(&IncomeBreakdown::ordinary(200_000.0, 0), Province::Ontario, &rules);
        assert_approx(estate.tax_on_registered, registered_tax);
        let gains = IncomeBreakdown {
            taxable_capital_gains: 20_000.0,
            ..IncomeBreakdown::ordinary(200_000.0, 0)
        };
        assert_approx(
            estate.tax_on_capital_gains,
            total_tax(&gains, Province::Ontario, &rules) - registered_tax,
        );
        assert_approx(estate.tax_on_corporate, 0.0);
        assert_approx(
            estate.after_tax_estate,
            estate.gross_estate - estate.total_estate_tax,
        );
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(24))]

        #[test]
        fn spending_met_plus_gap_is_need(
            tfsa_k in 0u32..800,
            rrif_k in 0u32..800,
            spending_k in 10u32..120,
            strategy_idx in 0usize..8,
        ) {
            let mut input = HouseholdInput {
                p1: PersonInput {
                    tfsa_balance: tfsa_k as f64 * 1_000.0,
                    rrif_balance: rrif_k as f64 * 1_000.0,
                    cpp_annual_at_start: 9_000.0,
                    ..retiree("Prop", 66)
                },
                strategy: WithdrawalStrategy::ALL[strategy_idx],
                end_age: 90,
                ..HouseholdInput::default()
            };
            flat_spending(&mut input, spending_k as f64 * 1_000.0);
            let response = simulate_household(&input).expect("runs");
            for y in &response.year_by_year {
                prop_assert!((y.spending_met + y.spending_gap - y.spending_need).abs() < 1e-6);
                prop_assert!(y.spending_gap >= 0.0);
                prop_assert!(y.total_portfolio >= -1e-6);
                prop_assert!(y.plan_success == (y.spending_gap <= input.gap_tolerance));
            }
        }
    }
}
