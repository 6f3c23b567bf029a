use tracing::debug;

use super::benefits::{oas_gross, project_cpp};
use super::error::SimulationError;
use super::ledger::{PersonGrowth, PersonLedger, RegisteredDraw};
use super::rules::{RuleBook, YearRules};
use super::strategy::{
    PersonIncome, PersonTaxOutcome, StrategyKnobs, StrategyPerson, TaxContext, WithdrawalPlan,
    decide_withdrawals,
};
use super::tax::compute_tax;
use super::types::{
    HouseholdInput, IncomeKind, ManualWithdrawals, PersonInput, Province, WithdrawalStrategy,
    YearResult,
};

const SETTLE_EPS: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct HouseholdState {
    pub ledgers: [PersonLedger; 2],
    /// Paid-out distributions and swept surplus that did not fit in a TFSA.
    pub cash_on_hand: f64,
}

impl HouseholdState {
    pub fn from_input(input: &HouseholdInput) -> Self {
        Self {
            ledgers: [
                PersonLedger::from_input(&input.p1),
                PersonLedger::from_input(&input.p2),
            ],
            cash_on_hand: 0.0,
        }
    }

    pub fn net_worth(&self) -> f64 {
        self.ledgers.iter().map(PersonLedger::total).sum::<f64>() + self.cash_on_hand
    }
}

#[derive(Debug, Clone, Copy)]
pub struct YearContext<'a> {
    pub input: &'a HouseholdInput,
    pub rule_book: &'a RuleBook,
    pub province: Province,
    pub strategy: WithdrawalStrategy,
    pub active: [bool; 2],
}

impl YearContext<'_> {
    fn person(&self, i: usize) -> &PersonInput {
        if i == 0 { &self.input.p1 } else { &self.input.p2 }
    }

    fn age(&self, i: usize, year_index: u32) -> u32 {
        if self.active[i] {
            self.person(i).start_age + year_index
        } else {
            0
        }
    }

    /// Spending target in current dollars; phases follow p1's age.
    pub fn spending_target(&self, year_index: u32) -> f64 {
        let input = self.input;
        let age = self.age(0, year_index);
        let base = if age <= input.go_go_end_age {
            input.spending_go_go
        } else if age <= input.slow_go_end_age {
            input.spending_slow_go
        } else {
            input.spending_no_go
        };
        base * growth_index(input.spending_inflation, year_index)
    }
}

pub fn growth_index(rate_pct: f64, years: u32) -> f64 {
    (1.0 + rate_pct / 100.0).powi(years as i32)
}

#[derive(Debug, Clone, Copy, Default)]
struct GuaranteedIncome {
    cpp: f64,
    oas_gross: f64,
    employer_pension: f64,
    other: f64,
}

impl GuaranteedIncome {
    fn cash(&self) -> f64 {
        self.cpp + self.oas_gross + self.employer_pension + self.other
    }
}

fn guaranteed_income(
    person: &PersonInput,
    age: u32,
    index: f64,
    rules: &YearRules<'_>,
) -> GuaranteedIncome {
    let mut income = GuaranteedIncome {
        cpp: project_cpp(person, age, index, rules),
        oas_gross: oas_gross(person, age, index, rules),
        ..GuaranteedIncome::default()
    };
    for stream in &person.income_streams {
        let started = stream.start_age.is_none_or(|start| age >= start);
        let running = stream.end_age.is_none_or(|end| age <= end);
        if !started || !running {
            continue;
        }
        let amount = stream.annual_amount * if stream.indexed { index } else { 1.0 };
        match stream.kind {
            IncomeKind::EmployerPension => income.employer_pension += amount,
            IncomeKind::Rental | IncomeKind::Other => income.other += amount,
        }
    }
    income
}

fn base_income(age: u32, guaranteed: &GuaranteedIncome, growth: &PersonGrowth) -> PersonIncome {
    let nonreg = &growth.nonreg;
    PersonIncome {
        active: true,
        age,
        ordinary: guaranteed.cpp + guaranteed.employer_pension + guaranteed.other + nonreg.interest,
        registered_draws: 0.0,
        pension_income: guaranteed.employer_pension,
        eligible_dividends: nonreg.eligible_dividends,
        non_eligible_dividends: nonreg.non_eligible_dividends,
        capital_gains: nonreg.capital_gain_distributions + nonreg.realized_gain,
        oas_gross: guaranteed.oas_gross,
        splittable_rrif: 0.0,
    }
}

fn indexed_manual(manual: Option<ManualWithdrawals>, index: f64) -> Option<ManualWithdrawals> {
    manual
        .filter(ManualWithdrawals::is_configured)
        .map(|m| ManualWithdrawals {
            tfsa: m.tfsa * index,
            rrif: m.rrif * index,
            nonreg: m.nonreg * index,
            corporate: m.corporate * index,
        })
}

#[derive(Debug, Clone, Copy, Default)]
struct RealizedDraws {
    tfsa: f64,
    registered: RegisteredDraw,
    nonreg: f64,
    nonreg_gain: f64,
    corporate_gross: f64,
    corporate_taxable: f64,
}

fn apply_plan(
    ledgers: &mut [PersonLedger; 2],
    plan: &WithdrawalPlan,
    rules: &YearRules<'_>,
) -> Result<[RealizedDraws; 2], SimulationError> {
    let mut realized = [RealizedDraws::default(); 2];
    for (i, ledger) in ledgers.iter_mut().enumerate() {
        let draws = &plan.people[i];
        let tfsa = ledger.withdraw_tfsa(draws.tfsa)?;
        let registered = ledger.withdraw_registered(draws.registered)?;
        let sale = ledger.nonreg.sell(draws.nonreg)?;
        let dividend = ledger
            .corporate
            .pay_dividend(draws.corporate, &rules.table.corporate)?;
        realized[i] = RealizedDraws {
            tfsa,
            registered,
            nonreg: sale.proceeds,
            nonreg_gain: sale.gain,
            corporate_gross: dividend.gross,
            corporate_taxable: dividend.taxable_dividend,
        };
    }
    Ok(realized)
}

pub fn simulate_year(
    ctx: &YearContext<'_>,
    state: &mut HouseholdState,
    year_index: u32,
) -> Result<YearResult, SimulationError> {
    let input = ctx.input;
    let year = input.start_year + year_index;
    let rules = ctx.rule_book.for_year(year, input.general_inflation);
    let index = growth_index(input.general_inflation, year_index);
    let spending_need = ctx.spending_target(year_index);
    let ages = [ctx.age(0, year_index), ctx.age(1, year_index)];

    // Stage 1: open the year.
    let new_room = if year_index == 0 {
        0.0
    } else {
        input.tfsa_room_annual_growth * index
    };
    let mut facts = [StrategyPerson::default(); 2];
    for i in 0..2 {
        if !ctx.active[i] {
            continue;
        }
        let rrif_minimum = state.ledgers[i].begin_year(ages[i], new_room, &rules);
        let person = ctx.person(i);
        facts[i] = StrategyPerson {
            active: true,
            age: ages[i],
            rrif_minimum,
            opening_registered: state.ledgers[i].registered_balance(),
            cpp_started: person.cpp_annual_at_start > 0.0 && ages[i] >= person.cpp_start_age,
            oas_started: person.oas_annual_at_start > 0.0 && ages[i] >= person.oas_start_age,
            manual: indexed_manual(person.manual_withdrawals, index),
        };
    }

    // Stage 2: growth and distributions.
    let mut growth = [PersonGrowth::default(); 2];
    for i in 0..2 {
        if !ctx.active[i] {
            continue;
        }
        growth[i] = state.ledgers[i].apply_annual_growth(input.reinvest_nonreg_dist, ctx.province, &rules);
        state.cash_on_hand += growth[i].nonreg.cash_paid_out;
    }

    // Stage 3: guaranteed income and the first benefits estimate.
    let mut guaranteed = [GuaranteedIncome::default(); 2];
    let mut base = [PersonIncome::default(); 2];
    for i in 0..2 {
        if !ctx.active[i] {
            continue;
        }
        guaranteed[i] = guaranteed_income(ctx.person(i), ages[i], index, &rules);
        base[i] = base_income(ages[i], &guaranteed[i], &growth[i]);
    }
    let split_fraction = (ctx.strategy == WithdrawalStrategy::RrifSplitting)
        .then_some(input.income_split_rrif_fraction);
    let tax_ctx = TaxContext {
        rules,
        province: ctx.province,
        people: base,
        split_fraction,
    };
    let guaranteed_cash: f64 = guaranteed.iter().map(GuaranteedIncome::cash).sum();
    let need = spending_need - (guaranteed_cash - tax_ctx.household_cost());

    // Stage 4: withdrawals.
    let knobs = StrategyKnobs {
        hybrid_topup: input.hybrid_topup_amount * index,
    };
    let outcome = decide_withdrawals(need, &state.ledgers, ctx.strategy, facts, knobs, tax_ctx)?;
    let plan = outcome.plan;
    let realized = apply_plan(&mut state.ledgers, &plan, &rules)?;

    // Stage 5: finalize tax and benefits from realized withdrawals.
    let mut finalized = base;
    for i in 0..2 {
        if !ctx.active[i] {
            continue;
        }
        let r = &realized[i];
        let income = &mut finalized[i];
        income.registered_draws += r.registered.total();
        if ages[i] >= 65 {
            income.pension_income += r.registered.from_rrif;
            income.splittable_rrif += r.registered.from_rrif;
        }
        income.capital_gains += r.nonreg_gain;
        income.non_eligible_dividends += r.corporate_taxable;
    }
    let final_ctx = TaxContext {
        people: finalized,
        ..tax_ctx
    };
    let outcomes = final_ctx.assess();

    // Stage 6: settle cash.
    let withdrawals = plan.total();
    let gis: f64 = outcomes.iter().map(|o| o.gis).sum();
    let personal_tax: f64 = outcomes.iter().map(|o| o.tax + o.oas_clawback).sum();
    let available = guaranteed_cash + gis + withdrawals - personal_tax;

    let mut tfsa_contribution = [0.0; 2];
    let spending_gap;
    if available + SETTLE_EPS >= spending_need {
        let mut surplus = (available - spending_need).max(0.0);
        for i in 0..2 {
            if ctx.active[i] && surplus > 0.0 {
                tfsa_contribution[i] = state.ledgers[i].contribute_tfsa(surplus);
                surplus -= tfsa_contribution[i];
            }
        }
        state.cash_on_hand += surplus;
        spending_gap = 0.0;
    } else {
        let shortfall = spending_need - available;
        let from_cash = shortfall.min(state.cash_on_hand);
        state.cash_on_hand -= from_cash;
        spending_gap = shortfall - from_cash;
    }

    for ledger in &state.ledgers {
        ledger.check()?;
    }
    if !available.is_finite() || !state.cash_on_hand.is_finite() || state.cash_on_hand < -1e-6 {
        return Err(SimulationError::Invariant(format!(
            "year {year}: cash position is not finite or negative"
        )));
    }

    let plan_success = spending_gap <= input.gap_tolerance;
    let failure_reason = (!plan_success).then(|| {
        format!(
            "Underfunded by ${spending_gap:.0} of ${spending_need:.0} planned spending; accounts exhausted."
        )
    });

    debug!(
        year,
        spending_need,
        withdrawals,
        spending_gap,
        net_worth = state.net_worth(),
        "simulated year"
    );

    let people = [0, 1].map(|i| PersonYear {
        age: ages[i],
        guaranteed: guaranteed[i],
        growth: growth[i],
        realized: realized[i],
        rrif_minimum: facts[i].rrif_minimum,
        tfsa_contribution: tfsa_contribution[i],
        outcome: outcomes[i],
        marginal_rate: if ctx.active[i] {
            compute_tax(&outcomes[i].income, ctx.province, &rules).marginal_rate
        } else {
            0.0
        },
        ledger: state.ledgers[i].clone(),
    });

    let totals = YearTotals {
        spending_need,
        spending_gap,
        withdrawals,
        plan_success,
        failure_reason,
    };
    Ok(build_result(year, &people, state, totals, ctx.strategy))
}

struct YearTotals {
    spending_need: f64,
    spending_gap: f64,
    withdrawals: f64,
    plan_success: bool,
    failure_reason: Option<String>,
}

struct PersonYear {
    age: u32,
    guaranteed: GuaranteedIncome,
    growth: PersonGrowth,
    realized: RealizedDraws,
    rrif_minimum: f64,
    tfsa_contribution: f64,
    outcome: PersonTaxOutcome,
    marginal_rate: f64,
    ledger: PersonLedger,
}

fn build_result(
    year: u32,
    people: &[PersonYear; 2],
    state: &HouseholdState,
    totals: YearTotals,
    strategy: WithdrawalStrategy,
) -> YearResult {
    let [p1, p2] = people;
    let YearTotals {
        spending_need,
        spending_gap,
        withdrawals,
        plan_success,
        failure_reason,
    } = totals;
    let tax_p = |p: &PersonYear| p.outcome.tax;
    let corp_tax = |p: &PersonYear| p.growth.corporate.total_tax();
    let total_tax: f64 = people
        .iter()
        .map(|p| tax_p(p) + p.outcome.oas_clawback + corp_tax(p))
        .sum();

    YearResult {
        year,
        age_p1: p1.age,
        age_p2: p2.age,

        cpp_p1: p1.guaranteed.cpp,
        cpp_p2: p2.guaranteed.cpp,
        oas_p1: p1.guaranteed.oas_gross,
        oas_p2: p2.guaranteed.oas_gross,
        gis_p1: p1.outcome.gis,
        gis_p2: p2.outcome.gis,
        oas_clawback_p1: p1.outcome.oas_clawback,
        oas_clawback_p2: p2.outcome.oas_clawback,
        pension_income_p1: p1.guaranteed.employer_pension,
        pension_income_p2: p2.guaranteed.employer_pension,
        other_income_p1: p1.guaranteed.other,
        other_income_p2: p2.guaranteed.other,
        nonreg_distributions_p1: p1.growth.nonreg.taxable_distributions(),
        nonreg_distributions_p2: p2.growth.nonreg.taxable_distributions(),

        tfsa_contribution_p1: p1.tfsa_contribution,
        tfsa_contribution_p2: p2.tfsa_contribution,
        tfsa_withdrawal_p1: p1.realized.tfsa,
        tfsa_withdrawal_p2: p2.realized.tfsa,
        rrif_withdrawal_p1: p1.realized.registered.total(),
        rrif_withdrawal_p2: p2.realized.registered.total(),
        rrif_minimum_p1: p1.rrif_minimum,
        rrif_minimum_p2: p2.rrif_minimum,
        nonreg_withdrawal_p1: p1.realized.nonreg,
        nonreg_withdrawal_p2: p2.realized.nonreg,
        corporate_withdrawal_p1: p1.realized.corporate_gross,
        corporate_withdrawal_p2: p2.realized.corporate_gross,

        tfsa_balance_p1: p1.ledger.tfsa,
        tfsa_balance_p2: p2.ledger.tfsa,
        rrif_balance_p1: p1.ledger.rrif,
        rrif_balance_p2: p2.ledger.rrif,
        rrsp_balance_p1: p1.ledger.rrsp,
        rrsp_balance_p2: p2.ledger.rrsp,
        nonreg_balance_p1: p1.ledger.nonreg.balance,
        nonreg_balance_p2: p2.ledger.nonreg.balance,
        nonreg_acb_p1: p1.ledger.nonreg.acb,
        nonreg_acb_p2: p2.ledger.nonreg.acb,
        corporate_balance_p1: p1.ledger.corporate.balance,
        corporate_balance_p2: p2.ledger.corporate.balance,

        taxable_income_p1: p1.outcome.taxable_income,
        taxable_income_p2: p2.outcome.taxable_income,
        tax_p1: tax_p(p1),
        tax_p2: tax_p(p2),
        marginal_rate_p1: p1.marginal_rate,
        marginal_rate_p2: p2.marginal_rate,
        corporate_tax_p1: corp_tax(p1),
        corporate_tax_p2: corp_tax(p2),

        cash_on_hand: state.cash_on_hand,
        total_portfolio: state.net_worth(),
        total_tax,
        total_withdrawals: withdrawals,
        spending_need,
        spending_met: spending_need - spending_gap,
        spending_gap,
        plan_success,
        failure_reason,
        strategy_applied: strategy,
    }
}
