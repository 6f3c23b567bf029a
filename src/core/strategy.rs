//! Withdrawal strategies.
//!
//! Every strategy funds a net (after-tax) target through a shared [`Drawer`],
//! which works on scratch copies of the ledgers and prices each draw against
//! the household's running tax position. RRIF minimums are always drawn
//! first. The resulting [`WithdrawalPlan`] is applied to the real ledgers by
//! the year simulator.

use tracing::warn;

use super::benefits::{GisApplicant, oas_clawback, oas_headroom, project_gis};
use super::error::LedgerError;
use super::ledger::PersonLedger;
use super::rules::{CorporateRules, YearRules};
use super::tax::{IncomeBreakdown, total_tax};
use super::types::{
    HouseholdInput, ManualWithdrawals, Province, SimulationWarning, WarningLevel,
    WithdrawalStrategy,
};

const BISECTION_STEPS: usize = 40;
const BALANCED_SHARE_CAP: f64 = 0.60;
const BALANCED_ROUNDS: usize = 4;
const FRONTLOAD_BEFORE_BENEFITS: f64 = 0.15;
const FRONTLOAD_AFTER_BENEFITS: f64 = 0.08;
const FUNDED_EPS: f64 = 1e-7;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AccountSource {
    Tfsa,
    Registered,
    NonRegistered,
    Corporate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PersonIncome {
    pub active: bool,
    pub age: u32,
    /// CPP, pensions, other income, interest. Excludes OAS and RRIF draws.
    pub ordinary: f64,
    pub registered_draws: f64,
    /// Portion of income eligible for the pension amount and for splitting.
    pub pension_income: f64,
    pub eligible_dividends: f64,
    pub non_eligible_dividends: f64,
    /// Realized gains before the inclusion rate.
    pub capital_gains: f64,
    pub oas_gross: f64,
    /// RRIF income eligible for splitting with a spouse.
    pub splittable_rrif: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PersonTaxOutcome {
    pub income: IncomeBreakdown,
    pub net_income: f64,
    pub taxable_income: f64,
    pub tax: f64,
    pub oas_clawback: f64,
    pub gis: f64,
    pub split_transfer: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct TaxContext<'a> {
    pub rules: YearRules<'a>,
    pub province: Province,
    pub people: [PersonIncome; 2],
    pub split_fraction: Option<f64>,
}

impl TaxContext<'_> {
    fn breakdowns(&self) -> ([IncomeBreakdown; 2], [f64; 2]) {
        let inclusion = self.rules.table.capital_gains_inclusion;
        let mut out = [IncomeBreakdown::default(); 2];
        for (slot, p) in out.iter_mut().zip(self.people.iter()) {
            if !p.active {
                continue;
            }
            *slot = IncomeBreakdown {
                ordinary_income: p.ordinary + p.registered_draws + p.oas_gross,
                eligible_dividends: p.eligible_dividends,
                non_eligible_dividends: p.non_eligible_dividends,
                taxable_capital_gains: p.capital_gains.max(0.0) * inclusion,
                pension_credit_income: p.pension_income,
                age: p.age,
                oas_clawback: 0.0,
            };
        }

        let mut transfers = [0.0; 2];
        if let Some(fraction) = self.split_fraction {
            if self.people[0].active && self.people[1].active && fraction > 0.0 {
                let net = [out[0].net_income(&self.rules), out[1].net_income(&self.rules)];
                let from = if net[1] > net[0] { 1 } else { 0 };
                let to = 1 - from;
                let amount = fraction * self.people[from].splittable_rrif;
                if amount > 0.0 {
                    out[from].ordinary_income -= amount;
                    out[from].pension_credit_income =
                        (out[from].pension_credit_income - amount).max(0.0);
                    out[to].ordinary_income += amount;
                    out[to].pension_credit_income += amount;
                    transfers[from] = -amount;
                    transfers[to] = amount;
                }
            }
        }
        (out, transfers)
    }

    pub fn assess(&self) -> [PersonTaxOutcome; 2] {
        let (breakdowns, transfers) = self.breakdowns();
        let net = [
            breakdowns[0].net_income(&self.rules),
            breakdowns[1].net_income(&self.rules),
        ];
        let applicants = [0, 1].map(|i| GisApplicant {
            receives_oas: self.people[i].active && self.people[i].oas_gross > 0.0,
            tested_income: (net[i] - self.people[i].oas_gross).max(0.0),
        });

        let mut outcomes = [PersonTaxOutcome::default(); 2];
        for i in 0..2 {
            if !self.people[i].active {
                continue;
            }
            let clawback = oas_clawback(self.people[i].oas_gross, net[i], &self.rules);
            let income = IncomeBreakdown {
                oas_clawback: clawback,
                ..breakdowns[i]
            };
            let partner = self.people[1 - i].active.then_some(applicants[1 - i]);
            outcomes[i] = PersonTaxOutcome {
                income,
                net_income: net[i],
                taxable_income: income.taxable_income(&self.rules),
                tax: total_tax(&income, self.province, &self.rules),
                oas_clawback: clawback,
                gis: project_gis(applicants[i], partner, &self.rules),
                split_transfer: transfers[i],
            };
        }
        outcomes
    }

    /// Tax plus OAS recovery, less GIS, across the household.
    pub fn household_cost(&self) -> f64 {
        self.assess()
            .iter()
            .map(|o| o.tax + o.oas_clawback - o.gis)
            .sum()
    }

    pub fn net_income(&self, person: usize) -> f64 {
        self.assess()[person].net_income
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PersonWithdrawals {
    pub tfsa: f64,
    pub registered: f64,
    pub nonreg: f64,
    pub corporate: f64,
}

impl PersonWithdrawals {
    pub fn total(&self) -> f64 {
        self.tfsa + self.registered + self.nonreg + self.corporate
    }

    fn add(&mut self, source: AccountSource, gross: f64) {
        match source {
            AccountSource::Tfsa => self.tfsa += gross,
            AccountSource::Registered => self.registered += gross,
            AccountSource::NonRegistered => self.nonreg += gross,
            AccountSource::Corporate => self.corporate += gross,
        }
    }

    pub fn get(&self, source: AccountSource) -> f64 {
        match source {
            AccountSource::Tfsa => self.tfsa,
            AccountSource::Registered => self.registered,
            AccountSource::NonRegistered => self.nonreg,
            AccountSource::Corporate => self.corporate,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WithdrawalPlan {
    pub people: [PersonWithdrawals; 2],
}

impl WithdrawalPlan {
    pub fn total(&self) -> f64 {
        self.people.iter().map(PersonWithdrawals::total).sum()
    }

    pub fn source_total(&self, source: AccountSource) -> f64 {
        self.people.iter().map(|p| p.get(source)).sum()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StrategyPerson {
    pub active: bool,
    pub age: u32,
    pub rrif_minimum: f64,
    /// RRIF + RRSP at the start of the year, after conversion.
    pub opening_registered: f64,
    pub cpp_started: bool,
    pub oas_started: bool,
    pub manual: Option<ManualWithdrawals>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StrategyKnobs {
    pub hybrid_topup: f64,
}

#[derive(Debug, Clone)]
pub struct StrategyOutcome<'a> {
    pub plan: WithdrawalPlan,
    /// Net cash produced by the plan after its incremental tax cost.
    pub net_funded: f64,
    pub tax_context: TaxContext<'a>,
}

pub struct Drawer<'a> {
    ctx: TaxContext<'a>,
    ledgers: [PersonLedger; 2],
    people: [StrategyPerson; 2],
    knobs: StrategyKnobs,
    corporate_rules: CorporateRules,
    plan: WithdrawalPlan,
    remaining: f64,
    funded: f64,
}

impl<'a> Drawer<'a> {
    pub fn new(
        need: f64,
        ledgers: &[PersonLedger; 2],
        people: [StrategyPerson; 2],
        knobs: StrategyKnobs,
        ctx: TaxContext<'a>,
    ) -> Self {
        Self {
            corporate_rules: ctx.rules.table.corporate,
            ctx,
            ledgers: ledgers.clone(),
            people,
            knobs,
            plan: WithdrawalPlan::default(),
            remaining: need,
            funded: 0.0,
        }
    }

    pub fn remaining(&self) -> f64 {
        self.remaining
    }

    fn is_funded(&self) -> bool {
        self.remaining <= FUNDED_EPS
    }

    fn active_people(&self) -> impl Iterator<Item = usize> + '_ {
        (0..2).filter(|&i| self.people[i].active)
    }

    pub fn capacity(&self, person: usize, source: AccountSource) -> f64 {
        let ledger = &self.ledgers[person];
        let cap = match source {
            AccountSource::Tfsa => ledger.tfsa,
            AccountSource::Registered => ledger.registered_balance(),
            AccountSource::NonRegistered => ledger.nonreg.balance,
            AccountSource::Corporate => ledger.corporate.max_gross(&self.corporate_rules),
        };
        cap.max(0.0)
    }

    fn household_capacity(&self, source: AccountSource) -> f64 {
        self.active_people().map(|i| self.capacity(i, source)).sum()
    }

    fn oas_headroom(&self, person: usize) -> f64 {
        oas_headroom(self.ctx.net_income(person), &self.ctx.rules)
    }

    fn with_gross(&self, person: usize, source: AccountSource, gross: f64) -> TaxContext<'a> {
        let mut ctx = self.ctx;
        let ledger = &self.ledgers[person];
        let income = &mut ctx.people[person];
        match source {
            AccountSource::Tfsa => {}
            AccountSource::Registered => {
                income.registered_draws += gross;
                if income.age >= 65 {
                    let from_rrif = gross.min(ledger.rrif.max(0.0));
                    income.pension_income += from_rrif;
                    income.splittable_rrif += from_rrif;
                }
            }
            AccountSource::NonRegistered => {
                income.capital_gains += gross * (1.0 - ledger.nonreg.acb_ratio());
            }
            AccountSource::Corporate => {
                let capital = gross.min(ledger.corporate.capital_dividend_room());
                income.non_eligible_dividends += gross - capital;
            }
        }
        ctx
    }

    fn net_for_gross(&self, person: usize, source: AccountSource, gross: f64, base_cost: f64) -> f64 {
        let cost = self.with_gross(person, source, gross).household_cost();
        gross - (cost - base_cost)
    }

    pub fn draw_gross(
        &mut self,
        person: usize,
        source: AccountSource,
        gross: f64,
    ) -> Result<f64, LedgerError> {
        let gross = gross.min(self.capacity(person, source));
        if gross <= 0.0 || !self.people[person].active {
            return Ok(0.0);
        }
        let base_cost = self.ctx.household_cost();
        let next = self.with_gross(person, source, gross);
        let ledger = &mut self.ledgers[person];
        match source {
            AccountSource::Tfsa => {
                ledger.withdraw_tfsa(gross)?;
            }
            AccountSource::Registered => {
                ledger.withdraw_registered(gross)?;
            }
            AccountSource::NonRegistered => {
                ledger.nonreg.sell(gross)?;
            }
            AccountSource::Corporate => {
                ledger.corporate.pay_dividend(gross, &self.corporate_rules)?;
            }
        }
        self.ctx = next;
        let net = gross - (self.ctx.household_cost() - base_cost);
        self.plan.people[person].add(source, gross);
        self.remaining -= net;
        self.funded += net;
        Ok(net)
    }

    /// Draws the smallest gross from `source` whose net covers `target_net`,
    /// never more than `max_gross`.
    pub fn draw_net(
        &mut self,
        person: usize,
        source: AccountSource,
        target_net: f64,
        max_gross: f64,
    ) -> Result<f64, LedgerError> {
        if target_net <= 0.0 || !self.people[person].active {
            return Ok(0.0);
        }
        let capacity = self.capacity(person, source).min(max_gross.max(0.0));
        if capacity <= 0.0 {
            return Ok(0.0);
        }

        let base_cost = self.ctx.household_cost();
        let max_net = self.net_for_gross(person, source, capacity, base_cost);
        let gross = if max_net <= target_net {
            capacity
        } else {
            let mut lo = 0.0;
            let mut hi = capacity;
            for _ in 0..BISECTION_STEPS {
                let mid = (lo + hi) * 0.5;
                if self.net_for_gross(person, source, mid, base_cost) < target_net {
                    lo = mid;
                } else {
                    hi = mid;
                }
            }
            hi
        };
        self.draw_gross(person, source, gross)
    }

    fn fund_target(
        &mut self,
        source: AccountSource,
        target: f64,
        cap: fn(&Drawer<'_>, usize) -> f64,
    ) -> Result<f64, LedgerError> {
        if target <= FUNDED_EPS {
            return Ok(0.0);
        }
        let total_capacity = self.household_capacity(source);
        if total_capacity <= 0.0 {
            return Ok(0.0);
        }

        let mut got = 0.0;
        let shares: Vec<(usize, f64)> = self
            .active_people()
            .map(|i| (i, self.capacity(i, source) / total_capacity))
            .collect();
        for (person, share) in shares {
            let limit = cap(self, person);
            got += self.draw_net(person, source, target * share, limit)?;
        }
        for person in [0, 1] {
            let left = target - got;
            if left <= FUNDED_EPS {
                break;
            }
            let limit = cap(self, person);
            got += self.draw_net(person, source, left, limit)?;
        }
        Ok(got)
    }

    pub fn fund(&mut self, source: AccountSource) -> Result<(), LedgerError> {
        self.fund_target(source, self.remaining, uncapped)?;
        Ok(())
    }

    pub fn fund_capped(
        &mut self,
        source: AccountSource,
        cap: fn(&Drawer<'_>, usize) -> f64,
    ) -> Result<(), LedgerError> {
        self.fund_target(source, self.remaining, cap)?;
        Ok(())
    }

    pub fn fund_in_order(&mut self, order: &[AccountSource]) -> Result<(), LedgerError> {
        for &source in order {
            if self.is_funded() {
                break;
            }
            self.fund(source)?;
        }
        Ok(())
    }

    fn draw_rrif_minimums(&mut self) -> Result<(), LedgerError> {
        for person in [0, 1] {
            let minimum = self.people[person].rrif_minimum;
            self.draw_gross(person, AccountSource::Registered, minimum)?;
        }
        Ok(())
    }

    fn draw_hybrid_topup(&mut self) -> Result<(), LedgerError> {
        let topup = self.knobs.hybrid_topup;
        if topup <= 0.0 {
            return Ok(());
        }
        for person in [0, 1] {
            let amount = topup.min(self.oas_headroom(person));
            self.draw_gross(person, AccountSource::Registered, amount)?;
        }
        Ok(())
    }

    pub fn finish(self) -> StrategyOutcome<'a> {
        StrategyOutcome {
            plan: self.plan,
            net_funded: self.funded,
            tax_context: self.ctx,
        }
    }
}

fn uncapped(_: &Drawer<'_>, _: usize) -> f64 {
    f64::INFINITY
}

fn oas_headroom_cap(drawer: &Drawer<'_>, person: usize) -> f64 {
    drawer.oas_headroom(person)
}

pub trait WithdrawalPolicy {
    fn fund(&self, drawer: &mut Drawer<'_>) -> Result<(), LedgerError>;
}

struct TfsaFirst;
struct MinimizeIncome;
struct RrifSplitting;
struct CapitalGainsOptimized;
struct CorporateOptimized;
struct Balanced;
struct RrifFrontload;
struct Manual;

impl WithdrawalPolicy for TfsaFirst {
    fn fund(&self, drawer: &mut Drawer<'_>) -> Result<(), LedgerError> {
        drawer.fund_in_order(&[
            AccountSource::Tfsa,
            AccountSource::NonRegistered,
            AccountSource::Corporate,
            AccountSource::Registered,
        ])
    }
}

impl WithdrawalPolicy for MinimizeIncome {
    fn fund(&self, drawer: &mut Drawer<'_>) -> Result<(), LedgerError> {
        drawer.draw_hybrid_topup()?;
        drawer.fund_in_order(&[AccountSource::Tfsa, AccountSource::NonRegistered])?;
        if !drawer.is_funded() {
            drawer.fund_capped(AccountSource::Registered, oas_headroom_cap)?;
        }
        drawer.fund_in_order(&[AccountSource::Corporate, AccountSource::Registered])
    }
}

impl WithdrawalPolicy for RrifSplitting {
    fn fund(&self, drawer: &mut Drawer<'_>) -> Result<(), LedgerError> {
        drawer.fund_in_order(&[
            AccountSource::Registered,
            AccountSource::NonRegistered,
            AccountSource::Tfsa,
            AccountSource::Corporate,
        ])
    }
}

impl WithdrawalPolicy for CapitalGainsOptimized {
    fn fund(&self, drawer: &mut Drawer<'_>) -> Result<(), LedgerError> {
        let mut order: Vec<usize> = drawer.active_people().collect();
        order.sort_by(|&a, &b| {
            let ra = drawer.ledgers[a].nonreg.acb_ratio();
            let rb = drawer.ledgers[b].nonreg.acb_ratio();
            rb.total_cmp(&ra).then(a.cmp(&b))
        });
        for person in order {
            let target = drawer.remaining();
            drawer.draw_net(person, AccountSource::NonRegistered, target, f64::INFINITY)?;
        }
        drawer.fund_in_order(&[
            AccountSource::Registered,
            AccountSource::Corporate,
            AccountSource::Tfsa,
        ])
    }
}

impl WithdrawalPolicy for CorporateOptimized {
    fn fund(&self, drawer: &mut Drawer<'_>) -> Result<(), LedgerError> {
        for person in [0, 1] {
            let recovery = drawer.ledgers[person]
                .corporate
                .refund_recovery_dividend(&drawer.corporate_rules);
            drawer.draw_gross(person, AccountSource::Corporate, recovery)?;
        }
        drawer.fund_in_order(&[
            AccountSource::Corporate,
            AccountSource::NonRegistered,
            AccountSource::Registered,
            AccountSource::Tfsa,
        ])
    }
}

impl WithdrawalPolicy for Balanced {
    fn fund(&self, drawer: &mut Drawer<'_>) -> Result<(), LedgerError> {
        const ORDER: [AccountSource; 4] = [
            AccountSource::Tfsa,
            AccountSource::NonRegistered,
            AccountSource::Registered,
            AccountSource::Corporate,
        ];
        const REGISTERED: usize = 2;
        if drawer.is_funded() {
            return Ok(());
        }
        // RRIF minimums are already in `funded` and count against the registered share.
        let mandatory = drawer.funded.max(0.0);
        let target = drawer.remaining() + mandatory;
        let funded_sources = ORDER
            .iter()
            .filter(|&&s| drawer.household_capacity(s) > 0.0)
            .count();
        let share_cap = if funded_sources > 1 {
            BALANCED_SHARE_CAP * target
        } else {
            target
        };

        let mut drawn = [0.0; 4];
        drawn[REGISTERED] = mandatory;
        for _ in 0..BALANCED_ROUNDS {
            if drawer.is_funded() {
                break;
            }
            let open: Vec<usize> = (0..ORDER.len())
                .filter(|&k| drawer.household_capacity(ORDER[k]) > 0.0 && drawn[k] < share_cap - FUNDED_EPS)
                .collect();
            if open.is_empty() {
                break;
            }
            let share = drawer.remaining() / open.len() as f64;
            for k in open {
                let want = share.min(share_cap - drawn[k]);
                drawn[k] += drawer.fund_target(ORDER[k], want, uncapped)?;
            }
        }
        drawer.fund_in_order(&ORDER)
    }
}

impl WithdrawalPolicy for RrifFrontload {
    fn fund(&self, drawer: &mut Drawer<'_>) -> Result<(), LedgerError> {
        for person in [0, 1] {
            let facts = drawer.people[person];
            if !facts.active {
                continue;
            }
            let rate = if facts.cpp_started || facts.oas_started {
                FRONTLOAD_AFTER_BENEFITS
            } else {
                FRONTLOAD_BEFORE_BENEFITS
            };
            let mut extra = rate * facts.opening_registered - drawer.plan.people[person].registered;
            if facts.oas_started {
                extra = extra.min(drawer.oas_headroom(person));
            }
            drawer.draw_gross(person, AccountSource::Registered, extra)?;
        }
        drawer.draw_hybrid_topup()?;
        drawer.fund_in_order(&[
            AccountSource::Tfsa,
            AccountSource::NonRegistered,
            AccountSource::Corporate,
            AccountSource::Registered,
        ])
    }
}

impl WithdrawalPolicy for Manual {
    fn fund(&self, drawer: &mut Drawer<'_>) -> Result<(), LedgerError> {
        for person in [0, 1] {
            let Some(manual) = drawer.people[person].manual else {
                continue;
            };
            let already = drawer.plan.people[person].registered;
            drawer.draw_gross(person, AccountSource::Tfsa, manual.tfsa)?;
            drawer.draw_gross(person, AccountSource::Registered, manual.rrif - already)?;
            drawer.draw_gross(person, AccountSource::NonRegistered, manual.nonreg)?;
            drawer.draw_gross(person, AccountSource::Corporate, manual.corporate)?;
        }
        Ok(())
    }
}

pub fn policy_for(strategy: WithdrawalStrategy) -> &'static dyn WithdrawalPolicy {
    match strategy {
        WithdrawalStrategy::TfsaFirst => &TfsaFirst,
        WithdrawalStrategy::MinimizeIncome => &MinimizeIncome,
        WithdrawalStrategy::RrifSplitting => &RrifSplitting,
        WithdrawalStrategy::CapitalGainsOptimized => &CapitalGainsOptimized,
        WithdrawalStrategy::CorporateOptimized => &CorporateOptimized,
        WithdrawalStrategy::Balanced => &Balanced,
        WithdrawalStrategy::RrifFrontload => &RrifFrontload,
        WithdrawalStrategy::Manual => &Manual,
    }
}

/// Plans the year's withdrawals to cover `need` (net of guaranteed income
/// and the tax already owed on it).
pub fn decide_withdrawals<'a>(
    need: f64,
    ledgers: &[PersonLedger; 2],
    strategy: WithdrawalStrategy,
    people: [StrategyPerson; 2],
    knobs: StrategyKnobs,
    ctx: TaxContext<'a>,
) -> Result<StrategyOutcome<'a>, LedgerError> {
    let mut drawer = Drawer::new(need, ledgers, people, knobs, ctx);
    drawer.draw_rrif_minimums()?;
    policy_for(strategy).fund(&mut drawer)?;
    Ok(drawer.finish())
}

pub fn resolve_strategy(input: &HouseholdInput) -> (WithdrawalStrategy, Option<SimulationWarning>) {
    match input.strategy {
        WithdrawalStrategy::RrifSplitting if !(input.p1.is_active() && input.p2.is_active()) => {
            warn!(strategy = "rrif-splitting", "no partner to split with; using balanced");
            (
                WithdrawalStrategy::Balanced,
                Some(SimulationWarning::new(
                    WarningLevel::Warning,
                    "strategy_fallback",
                    "rrif-splitting needs two people; the balanced strategy was used instead.",
                )),
            )
        }
        WithdrawalStrategy::Manual
            if !input
                .p1
                .manual_withdrawals
                .is_some_and(|m| m.is_configured())
                && !input
                    .p2
                    .manual_withdrawals
                    .is_some_and(|m| m.is_configured()) =>
        {
            warn!(strategy = "manual", "no manual amounts configured; using balanced");
            (
                WithdrawalStrategy::Balanced,
                Some(SimulationWarning::new(
                    WarningLevel::Warning,
                    "strategy_fallback",
                    "manual strategy has no withdrawal amounts configured; the balanced strategy was used instead.",
                )),
            )
        }
        other => (other, None),
    }
}
