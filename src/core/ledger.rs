//! Per-person account balances and the rules that move them.

use super::error::LedgerError;
use super::rules::{CorporateRules, YearRules};
use super::types::{PersonInput, Province};

pub const BALANCE_EPS: f64 = 1e-6;

pub fn apply_withdrawal(account: &'static str, balance: f64, amount: f64) -> Result<f64, LedgerError> {
    if amount < 0.0 {
        return Err(LedgerError::NegativeAmount { account, amount });
    }
    if amount > balance + BALANCE_EPS {
        return Err(LedgerError::Overdraw {
            account,
            amount,
            balance,
        });
    }
    Ok((balance - amount).max(0.0))
}

pub fn rrif_minimum(age: u32, opening_balance: f64, rules: &YearRules<'_>) -> f64 {
    if opening_balance <= 0.0 {
        return 0.0;
    }
    opening_balance * rules.table.rrif.minimum_rate(age)
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AllocationMix {
    pub cash: f64,
    pub gic: f64,
    pub invest: f64,
}

impl AllocationMix {
    fn from_pct(cash: f64, gic: f64, invest: f64) -> Self {
        Self {
            cash: cash / 100.0,
            gic: gic / 100.0,
            invest: invest / 100.0,
        }
    }
}

/// Annual yields as fractions of each bucket's opening value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BucketYields {
    pub cash_interest: f64,
    pub gic_interest: f64,
    pub total_return: f64,
    pub eligible_dividends: f64,
    pub non_eligible_dividends: f64,
    pub capital_gains: f64,
    pub return_of_capital: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NonRegGrowth {
    pub interest: f64,
    pub eligible_dividends: f64,
    pub non_eligible_dividends: f64,
    pub capital_gain_distributions: f64,
    pub return_of_capital: f64,
    pub appreciation: f64,
    /// Distributions paid out in cash (zero when reinvested).
    pub cash_paid_out: f64,
    /// Gain from return of capital in excess of ACB.
    pub realized_gain: f64,
    pub new_balance: f64,
}

impl NonRegGrowth {
    pub fn taxable_distributions(&self) -> f64 {
        self.interest
            + self.eligible_dividends
            + self.non_eligible_dividends
            + self.capital_gain_distributions
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NonRegSale {
    pub proceeds: f64,
    pub acb_sold: f64,
    pub gain: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NonRegAccount {
    pub balance: f64,
    pub acb: f64,
    /// Part of `balance` bought with reinvested distributions. It earns
    /// nothing, so distributions are the same whether reinvested or paid out.
    pub reinvested: f64,
    pub mix: AllocationMix,
    pub yields: BucketYields,
}

impl NonRegAccount {
    pub fn acb_ratio(&self) -> f64 {
        if self.balance <= 0.0 {
            return 0.0;
        }
        (self.acb / self.balance).clamp(0.0, 1.0)
    }

    pub fn apply_annual_growth(&mut self, reinvest: bool) -> NonRegGrowth {
        let opening = (self.balance - self.reinvested).max(0.0);
        let invest = opening * self.mix.invest;
        let y = self.yields;

        let interest = opening * self.mix.cash * y.cash_interest + opening * self.mix.gic * y.gic_interest;
        let eligible_dividends = invest * y.eligible_dividends;
        let non_eligible_dividends = invest * y.non_eligible_dividends;
        let capital_gain_distributions = invest * y.capital_gains;
        let return_of_capital = invest * y.return_of_capital;
        let appreciation = invest
            * (y.total_return
                - y.eligible_dividends
                - y.non_eligible_dividends
                - y.capital_gains
                - y.return_of_capital);

        let taxable = interest + eligible_dividends + non_eligible_dividends + capital_gain_distributions;
        let mut growth = NonRegGrowth {
            interest,
            eligible_dividends,
            non_eligible_dividends,
            capital_gain_distributions,
            return_of_capital,
            appreciation,
            ..NonRegGrowth::default()
        };

        if reinvest {
            let swept = taxable + return_of_capital;
            self.balance = (self.balance + appreciation + swept).max(0.0);
            self.reinvested = (self.reinvested + swept).min(self.balance);
            self.acb += taxable;
        } else {
            self.balance = (self.balance + appreciation).max(0.0);
            self.reinvested = self.reinvested.min(self.balance);
            growth.cash_paid_out = taxable + return_of_capital;
            self.acb -= return_of_capital;
            if self.acb < 0.0 {
                growth.realized_gain = -self.acb;
                self.acb = 0.0;
            }
        }
        growth.new_balance = self.balance;
        growth
    }

    pub fn sell(&mut self, amount: f64) -> Result<NonRegSale, LedgerError> {
        let opening = self.balance;
        let new_balance = apply_withdrawal("non-registered", opening, amount)?;
        if amount <= 0.0 {
            return Ok(NonRegSale::default());
        }
        let fraction = (amount / opening).min(1.0);
        let acb_sold = self.acb * fraction;
        self.balance = new_balance;
        self.reinvested = (self.reinvested - amount).clamp(0.0, self.balance);
        self.acb = (self.acb - acb_sold).max(0.0);
        if self.balance <= 0.0 {
            self.acb = 0.0;
        }
        Ok(NonRegSale {
            proceeds: amount,
            acb_sold,
            gain: amount - acb_sold,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CorporateGrowth {
    pub interest: f64,
    pub eligible_dividends: f64,
    pub capital_gains: f64,
    pub passive_tax: f64,
    pub part_iv_tax: f64,
    pub rdtoh_added: f64,
    pub cda_added: f64,
    pub new_balance: f64,
}

impl CorporateGrowth {
    pub fn total_tax(&self) -> f64 {
        self.passive_tax + self.part_iv_tax
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CorporateDraw {
    pub gross: f64,
    pub capital_dividend: f64,
    pub taxable_dividend: f64,
    pub dividend_refund: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CorporateAccount {
    pub balance: f64,
    pub rdtoh: f64,
    pub cda: f64,
    pub mix: AllocationMix,
    pub yields: BucketYields,
}

impl CorporateAccount {
    pub fn apply_annual_growth(
        &mut self,
        passive_rate: f64,
        corp: &CorporateRules,
        inclusion_rate: f64,
    ) -> CorporateGrowth {
        let opening = self.balance.max(0.0);
        let invest = opening * self.mix.invest;
        let y = self.yields;

        let interest = opening * self.mix.cash * y.cash_interest + opening * self.mix.gic * y.gic_interest;
        let eligible_dividends = invest * y.eligible_dividends;
        let capital_gains = invest * y.capital_gains;
        let taxable_gains = capital_gains * inclusion_rate;

        let aggregate_investment_income = interest + taxable_gains;
        let passive_tax = passive_rate * aggregate_investment_income;
        let part_iv_tax = corp.part_iv_rate * eligible_dividends;
        let rdtoh_added = corp.refundable_rate * aggregate_investment_income + part_iv_tax;
        let cda_added = capital_gains - taxable_gains;

        self.balance = (opening + interest + invest * y.total_return - passive_tax - part_iv_tax).max(0.0);
        self.rdtoh += rdtoh_added;
        self.cda += cda_added;

        CorporateGrowth {
            interest,
            eligible_dividends,
            capital_gains,
            passive_tax,
            part_iv_tax,
            rdtoh_added,
            cda_added,
            new_balance: self.balance,
        }
    }

    pub fn capital_dividend_room(&self) -> f64 {
        self.cda.clamp(0.0, self.balance.max(0.0))
    }

    /// Largest gross dividend payable once the dividend refund is counted.
    pub fn max_gross(&self, corp: &CorporateRules) -> f64 {
        let cda = self.capital_dividend_room();
        let remaining = (self.balance - cda).max(0.0);
        let r = corp.dividend_refund_rate;
        let full_refund_case = remaining / (1.0 - r);
        let taxable = if r * full_refund_case <= self.rdtoh {
            full_refund_case
        } else {
            remaining + self.rdtoh
        };
        cda + taxable
    }

    /// Gross dividend needed to recover the whole RDTOH balance.
    pub fn refund_recovery_dividend(&self, corp: &CorporateRules) -> f64 {
        if self.rdtoh <= 0.0 || corp.dividend_refund_rate <= 0.0 {
            return 0.0;
        }
        (self.capital_dividend_room() + self.rdtoh / corp.dividend_refund_rate).min(self.max_gross(corp))
    }

    pub fn pay_dividend(&mut self, gross: f64, corp: &CorporateRules) -> Result<CorporateDraw, LedgerError> {
        let max = self.max_gross(corp);
        apply_withdrawal("corporate", max, gross)?;
        if gross <= 0.0 {
            return Ok(CorporateDraw::default());
        }
        let gross = gross.min(max);
        let capital_dividend = gross.min(self.capital_dividend_room());
        let taxable_dividend = gross - capital_dividend;
        let dividend_refund = (corp.dividend_refund_rate * taxable_dividend).min(self.rdtoh.max(0.0));

        self.cda -= capital_dividend;
        self.rdtoh -= dividend_refund;
        self.balance = (self.balance - gross + dividend_refund).max(0.0);

        Ok(CorporateDraw {
            gross,
            capital_dividend,
            taxable_dividend,
            dividend_refund,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RegisteredDraw {
    pub from_rrif: f64,
    pub from_rrsp: f64,
}

impl RegisteredDraw {
    pub fn total(&self) -> f64 {
        self.from_rrif + self.from_rrsp
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PersonGrowth {
    pub nonreg: NonRegGrowth,
    pub corporate: CorporateGrowth,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersonLedger {
    pub tfsa: f64,
    pub rrif: f64,
    pub rrsp: f64,
    pub nonreg: NonRegAccount,
    pub corporate: CorporateAccount,
    pub tfsa_room: f64,
    /// TFSA withdrawals made this year; returned as room next year.
    pub pending_room_restore: f64,
    tfsa_growth: f64,
    registered_growth: f64,
}

impl PersonLedger {
    pub fn from_input(person: &PersonInput) -> Self {
        Self {
            tfsa: person.tfsa_balance,
            rrif: person.rrif_balance,
            rrsp: person.rrsp_balance,
            nonreg: NonRegAccount {
                balance: person.nonreg_balance,
                acb: person.nonreg_acb.min(person.nonreg_balance.max(0.0)),
                reinvested: 0.0,
                mix: AllocationMix::from_pct(person.nr_cash_pct, person.nr_gic_pct, person.nr_invest_pct),
                yields: BucketYields {
                    cash_interest: person.y_nr_cash_interest / 100.0,
                    gic_interest: person.y_nr_gic_interest / 100.0,
                    total_return: person.y_nr_inv_total_return / 100.0,
                    eligible_dividends: person.y_nr_inv_elig_div / 100.0,
                    non_eligible_dividends: person.y_nr_inv_nonelig_div / 100.0,
                    capital_gains: person.y_nr_inv_capg / 100.0,
                    return_of_capital: person.y_nr_inv_roc_pct / 100.0,
                },
            },
            corporate: CorporateAccount {
                balance: person.corporate_balance,
                rdtoh: person.corporate_rdtoh,
                cda: person.corporate_cda,
                mix: AllocationMix::from_pct(person.corp_cash_pct, person.corp_gic_pct, person.corp_invest_pct),
                yields: BucketYields {
                    cash_interest: person.y_corp_cash_interest / 100.0,
                    gic_interest: person.y_corp_gic_interest / 100.0,
                    total_return: person.y_corp_inv_total_return / 100.0,
                    eligible_dividends: person.y_corp_inv_elig_div / 100.0,
                    non_eligible_dividends: 0.0,
                    capital_gains: person.y_corp_inv_capg / 100.0,
                    return_of_capital: 0.0,
                },
            },
            tfsa_room: person.tfsa_room_start,
            pending_room_restore: 0.0,
            tfsa_growth: person.tfsa_growth_rate / 100.0,
            registered_growth: person.rrif_growth_rate / 100.0,
        }
    }

    pub fn registered_balance(&self) -> f64 {
        self.rrif + self.rrsp
    }

    pub fn total(&self) -> f64 {
        self.tfsa + self.rrif + self.rrsp + self.nonreg.balance + self.corporate.balance
    }

    /// Opens a tax year: restores TFSA room, adds new room, converts the
    /// RRSP at the conversion age. Returns the RRIF minimum on the opening
    /// balance.
    pub fn begin_year(
        &mut self,
        age: u32,
        new_room: f64,
        rules: &YearRules<'_>,
    ) -> f64 {
        self.tfsa_room += self.pending_room_restore + new_room.max(0.0);
        self.pending_room_restore = 0.0;

        if age >= rules.table.rrif.conversion_age && self.rrsp > 0.0 {
            self.rrif += self.rrsp;
            self.rrsp = 0.0;
        }
        rrif_minimum(age, self.rrif, rules)
    }

    pub fn apply_annual_growth(
        &mut self,
        reinvest_nonreg: bool,
        province: Province,
        rules: &YearRules<'_>,
    ) -> PersonGrowth {
        self.tfsa *= 1.0 + self.tfsa_growth;
        self.rrif *= 1.0 + self.registered_growth;
        self.rrsp *= 1.0 + self.registered_growth;
        let table = rules.table;
        PersonGrowth {
            nonreg: self.nonreg.apply_annual_growth(reinvest_nonreg),
            corporate: self.corporate.apply_annual_growth(
                table.province(province).corporate_passive_rate,
                &table.corporate,
                table.capital_gains_inclusion,
            ),
        }
    }

    pub fn withdraw_tfsa(&mut self, amount: f64) -> Result<f64, LedgerError> {
        self.tfsa = apply_withdrawal("tfsa", self.tfsa, amount)?;
        self.pending_room_restore += amount;
        Ok(amount)
    }

    pub fn withdraw_registered(&mut self, amount: f64) -> Result<RegisteredDraw, LedgerError> {
        apply_withdrawal("rrif/rrsp", self.registered_balance(), amount)?;
        let from_rrif = amount.min(self.rrif);
        self.rrif = apply_withdrawal("rrif", self.rrif, from_rrif)?;
        let from_rrsp = (amount - from_rrif).min(self.rrsp).max(0.0);
        self.rrsp = apply_withdrawal("rrsp", self.rrsp, from_rrsp)?;
        Ok(RegisteredDraw { from_rrif, from_rrsp })
    }

    pub fn contribute_tfsa(&mut self, amount: f64) -> f64 {
        let accepted = amount.max(0.0).min(self.tfsa_room.max(0.0));
        self.tfsa += accepted;
        self.tfsa_room -= accepted;
        accepted
    }

    pub fn check(&self) -> Result<(), LedgerError> {
        let accounts = [
            ("tfsa", self.tfsa),
            ("rrif", self.rrif),
            ("rrsp", self.rrsp),
            ("non-registered", self.nonreg.balance),
            ("non-registered acb", self.nonreg.acb),
            ("corporate", self.corporate.balance),
            ("corporate rdtoh", self.corporate.rdtoh),
        ];
        for (account, balance) in accounts {
            if !balance.is_finite() {
                return Err(LedgerError::NonFinite { account });
            }
            if balance < -BALANCE_EPS {
                return Err(LedgerError::NegativeBalance { account, balance });
            }
        }
        Ok(())
    }
}
