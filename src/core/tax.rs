//! Federal and provincial personal income tax.

use serde::Serialize;

use super::rules::{JurisdictionRules, YearRules};
use super::types::Province;

const MARGINAL_PROBE: f64 = 100.0;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IncomeBreakdown {
    /// Interest, CPP, OAS, RRIF/RRSP draws, pensions and other fully taxable income.
    pub ordinary_income: f64,
    pub eligible_dividends: f64,
    pub non_eligible_dividends: f64,
    /// Capital gains after the inclusion rate.
    pub taxable_capital_gains: f64,
    /// Income qualifying for the pension income amount.
    pub pension_credit_income: f64,
    pub age: u32,
    /// OAS recovery tax, deductible when computing taxable income.
    pub oas_clawback: f64,
}

impl IncomeBreakdown {
    pub fn ordinary(amount: f64, age: u32) -> Self {
        Self {
            ordinary_income: amount,
            age,
            ..Self::default()
        }
    }

    /// Net income before the OAS recovery deduction, with dividends grossed up.
    pub fn net_income(&self, rules: &YearRules<'_>) -> f64 {
        let table = rules.table;
        (self.ordinary_income
            + self.eligible_dividends * (1.0 + table.eligible_gross_up)
            + self.non_eligible_dividends * (1.0 + table.non_eligible_gross_up)
            + self.taxable_capital_gains)
            .max(0.0)
    }

    pub fn taxable_income(&self, rules: &YearRules<'_>) -> f64 {
        (self.net_income(rules) - self.oas_clawback).max(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BracketSlice {
    pub jurisdiction: &'static str,
    pub lower: f64,
    pub upper: Option<f64>,
    pub rate: f64,
    pub income_in_bracket: f64,
    pub tax: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaxResult {
    pub taxable_income: f64,
    pub federal_tax: f64,
    pub provincial_tax: f64,
    pub total_tax: f64,
    pub marginal_rate: f64,
    pub brackets: Vec<BracketSlice>,
}

pub fn compute_tax_on_income(
    taxable_income: f64,
    province: Province,
    rules: &YearRules<'_>,
) -> TaxResult {
    compute_tax(&IncomeBreakdown::ordinary(taxable_income, 0), province, rules)
}

pub fn compute_tax(income: &IncomeBreakdown, province: Province, rules: &YearRules<'_>) -> TaxResult {
    let base = tax_components(income, province, rules, true);

    let mut probe = *income;
    probe.ordinary_income += MARGINAL_PROBE;
    let bumped = tax_components(&probe, province, rules, false);
    let marginal_rate = ((bumped.total() - base.total()) / MARGINAL_PROBE).max(0.0);

    TaxResult {
        taxable_income: base.taxable_income,
        federal_tax: base.federal,
        provincial_tax: base.provincial,
        total_tax: base.total(),
        marginal_rate,
        brackets: base.brackets,
    }
}

pub fn total_tax(income: &IncomeBreakdown, province: Province, rules: &YearRules<'_>) -> f64 {
    tax_components(income, province, rules, false).total()
}

struct Components {
    taxable_income: f64,
    federal: f64,
    provincial: f64,
    brackets: Vec<BracketSlice>,
}

impl Components {
    fn total(&self) -> f64 {
        self.federal + self.provincial
    }
}

fn tax_components(
    income: &IncomeBreakdown,
    province: Province,
    rules: &YearRules<'_>,
    with_brackets: bool,
) -> Components {
    let table = rules.table;
    let provincial_rules = table.province(province);
    let taxable_income = income.taxable_income(rules);
    let net_income = income.net_income(rules);

    let mut brackets = Vec::new();
    let federal_basic = jurisdiction_tax(
        "federal",
        &table.federal,
        income,
        taxable_income,
        net_income,
        rules,
        with_brackets.then_some(&mut brackets),
    );
    let federal = federal_basic * (1.0 - provincial_rules.federal_abatement);

    let provincial_basic = jurisdiction_tax(
        province.code(),
        &provincial_rules.tax,
        income,
        taxable_income,
        net_income,
        rules,
        with_brackets.then_some(&mut brackets),
    );
    let surtax: f64 = provincial_rules
        .tax
        .surtax
        .iter()
        .map(|tier| tier.rate * (provincial_basic - rules.dollars(tier.threshold)).max(0.0))
        .sum();

    Components {
        taxable_income,
        federal,
        provincial: provincial_basic + surtax,
        brackets,
    }
}

fn jurisdiction_tax(
    label: &'static str,
    juris: &JurisdictionRules,
    income: &IncomeBreakdown,
    taxable_income: f64,
    net_income: f64,
    rules: &YearRules<'_>,
    slices: Option<&mut Vec<BracketSlice>>,
) -> f64 {
    let table = rules.table;
    let mut gross = 0.0;
    let mut collected = Vec::new();
    for (i, bracket) in juris.brackets.iter().enumerate() {
        let lower = rules.dollars(bracket.threshold);
        let upper = juris
            .brackets
            .get(i + 1)
            .map(|next| rules.dollars(next.threshold));
        if taxable_income <= lower {
            break;
        }
        let top = upper.map_or(taxable_income, |u| taxable_income.min(u));
        let in_bracket = top - lower;
        let tax = in_bracket * bracket.rate;
        gross += tax;
        collected.push(BracketSlice {
            jurisdiction: label,
            lower,
            upper,
            rate: bracket.rate,
            income_in_bracket: in_bracket,
            tax,
        });
    }
    if let Some(out) = slices {
        out.extend(collected);
    }

    let mut credit_base = basic_personal_amount(juris, net_income, rules);
    if income.age >= 65 {
        let reduction = juris.age_amount_reduction_rate
            * (net_income - rules.dollars(juris.age_amount_threshold)).max(0.0);
        credit_base += (rules.dollars(juris.age_amount) - reduction).max(0.0);
    }
    credit_base += income.pension_credit_income.max(0.0).min(juris.pension_amount);

    let non_refundable = credit_base * juris.lowest_rate();
    let dividend_credit = juris.eligible_dividend_credit
        * income.eligible_dividends.max(0.0)
        * (1.0 + table.eligible_gross_up)
        + juris.non_eligible_dividend_credit
            * income.non_eligible_dividends.max(0.0)
            * (1.0 + table.non_eligible_gross_up);

    (gross - non_refundable - dividend_credit).max(0.0)
}

fn basic_personal_amount(juris: &JurisdictionRules, net_income: f64, rules: &YearRules<'_>) -> f64 {
    let full = rules.dollars(juris.basic_personal_amount);
    let Some(phase) = juris.bpa_phase_down else {
        return full;
    };
    let start = rules.dollars(phase.start);
    let end = rules.dollars(phase.end);
    let minimum = rules.dollars(phase.minimum_amount);
    if net_income <= start {
        full
    } else if net_income >= end {
        minimum
    } else {
        let t = (net_income - start) / (end - start);
        full - (full - minimum) * t
    }
}
