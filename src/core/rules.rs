//! Versioned tax and benefit tables.
//!
//! Tables are keyed by tax year and never mutated. A simulation year past the
//! newest table reuses it with every dollar threshold indexed by general
//! inflation; see [`RuleBook::for_year`].

use std::collections::BTreeMap;

use super::types::Province;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaxBracket {
    pub threshold: f64,
    pub rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BpaPhaseDown {
    pub start: f64,
    pub end: f64,
    pub minimum_amount: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurtaxTier {
    pub threshold: f64,
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JurisdictionRules {
    pub brackets: Vec<TaxBracket>,
    pub basic_personal_amount: f64,
    pub bpa_phase_down: Option<BpaPhaseDown>,
    pub age_amount: f64,
    pub age_amount_threshold: f64,
    pub age_amount_reduction_rate: f64,
    pub pension_amount: f64,
    /// Credit as a fraction of the grossed-up dividend.
    pub eligible_dividend_credit: f64,
    pub non_eligible_dividend_credit: f64,
    pub surtax: Vec<SurtaxTier>,
}

impl JurisdictionRules {
    pub fn lowest_rate(&self) -> f64 {
        self.brackets.first().map(|b| b.rate).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProvinceRules {
    pub tax: JurisdictionRules,
    /// Reduction of basic federal tax (Québec abatement).
    pub federal_abatement: f64,
    pub corporate_passive_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OasRules {
    pub recovery_threshold: f64,
    pub recovery_rate: f64,
    pub standard_age: u32,
    pub max_start_age: u32,
    pub deferral_monthly_increase: f64,
    pub increase_age: u32,
    pub increase_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CppRules {
    pub standard_age: u32,
    pub min_start_age: u32,
    pub max_start_age: u32,
    pub early_monthly_reduction: f64,
    pub late_monthly_increase: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GisRules {
    pub single_max: f64,
    pub single_ceiling: f64,
    pub single_reduction_rate: f64,
    pub couple_max: f64,
    pub couple_ceiling: f64,
    pub couple_reduction_rate: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RrifRules {
    pub conversion_age: u32,
    /// Prescribed factors from `conversion_age` upward.
    pub factors: Vec<f64>,
    pub terminal_rate: f64,
}

impl RrifRules {
    pub fn minimum_rate(&self, age: u32) -> f64 {
        if age < self.conversion_age {
            return 1.0 / (90u32.saturating_sub(age).max(1)) as f64;
        }
        let offset = (age - self.conversion_age) as usize;
        self.factors
            .get(offset)
            .copied()
            .unwrap_or(self.terminal_rate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorporateRules {
    pub refundable_rate: f64,
    pub part_iv_rate: f64,
    pub dividend_refund_rate: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaxYearRules {
    pub year: u32,
    pub federal: JurisdictionRules,
    pub alberta: ProvinceRules,
    pub british_columbia: ProvinceRules,
    pub ontario: ProvinceRules,
    pub quebec: ProvinceRules,
    pub eligible_gross_up: f64,
    pub non_eligible_gross_up: f64,
    pub capital_gains_inclusion: f64,
    pub oas: OasRules,
    pub cpp: CppRules,
    pub gis: GisRules,
    pub rrif: RrifRules,
    pub corporate: CorporateRules,
}

impl TaxYearRules {
    pub fn province(&self, province: Province) -> &ProvinceRules {
        match province {
            Province::Alberta => &self.alberta,
            Province::BritishColumbia => &self.british_columbia,
            Province::Ontario => &self.ontario,
            Province::Quebec => &self.quebec,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct YearRules<'a> {
    pub table: &'a TaxYearRules,
    pub index: f64,
}

impl YearRules<'_> {
    pub fn dollars(&self, amount: f64) -> f64 {
        amount * self.index
    }
}

#[derive(Debug, Clone)]
pub struct RuleBook {
    tables: BTreeMap<u32, TaxYearRules>,
}

impl RuleBook {
    pub fn new(tables: Vec<TaxYearRules>) -> Option<Self> {
        if tables.is_empty() {
            return None;
        }
        Some(Self {
            tables: tables.into_iter().map(|t| (t.year, t)).collect(),
        })
    }

    pub fn canada() -> Self {
        let table = canada_2025();
        Self {
            tables: BTreeMap::from([(table.year, table)]),
        }
    }

    pub fn newest_year(&self) -> Option<u32> {
        self.tables.keys().next_back().copied()
    }

    /// Rules for `year`. Years past a table's own year are indexed at
    /// `general_inflation` percent per year; years before the oldest table
    /// use it as published.
    pub fn for_year(&self, year: u32, general_inflation: f64) -> YearRules<'_> {
        let table = self
            .tables
            .range(..=year)
            .next_back()
            .or_else(|| self.tables.iter().next())
            .map(|(_, t)| t)
            .expect("rule book holds at least one table");
        let years_past = year.saturating_sub(table.year);
        let index = (1.0 + general_inflation / 100.0).powi(years_past as i32);
        YearRules { table, index }
    }
}

impl Default for RuleBook {
    fn default() -> Self {
        Self::canada()
    }
}

fn brackets(rows: &[(f64, f64)]) -> Vec<TaxBracket> {
    rows.iter()
        .map(|&(threshold, rate)| TaxBracket { threshold, rate })
        .collect()
}

fn canada_2025() -> TaxYearRules {
    let federal = JurisdictionRules {
        brackets: brackets(&[
            (0.0, 0.145),
            (57_375.0, 0.205),
            (114_750.0, 0.26),
            (177_882.0, 0.29),
            (253_414.0, 0.33),
        ]),
        basic_personal_amount: 16_129.0,
        bpa_phase_down: Some(BpaPhaseDown {
            start: 177_882.0,
            end: 253_414.0,
            minimum_amount: 14_538.0,
        }),
        age_amount: 9_028.0,
        age_amount_threshold: 45_522.0,
        age_amount_reduction_rate: 0.15,
        pension_amount: 2_000.0,
        eligible_dividend_credit: 0.150198,
        non_eligible_dividend_credit: 0.090301,
        surtax: Vec::new(),
    };

    let ontario = ProvinceRules {
        tax: JurisdictionRules {
            brackets: brackets(&[
                (0.0, 0.0505),
                (52_886.0, 0.0915),
                (105_775.0, 0.1116),
                (150_000.0, 0.1216),
                (220_000.0, 0.1316),
            ]),
            basic_personal_amount: 12_747.0,
            bpa_phase_down: None,
            age_amount: 6_223.0,
            age_amount_threshold: 46_330.0,
            age_amount_reduction_rate: 0.15,
            pension_amount: 1_762.0,
            eligible_dividend_credit: 0.10,
            non_eligible_dividend_credit: 0.029863,
            surtax: vec![
                SurtaxTier {
                    threshold: 5_710.0,
                    rate: 0.20,
                },
                SurtaxTier {
                    threshold: 7_307.0,
                    rate: 0.36,
                },
            ],
        },
        federal_abatement: 0.0,
        corporate_passive_rate: 0.5017,
    };

    let british_columbia = ProvinceRules {
        tax: JurisdictionRules {
            brackets: brackets(&[
                (0.0, 0.0506),
                (49_279.0, 0.077),
                (98_560.0, 0.105),
                (113_158.0, 0.1229),
                (137_407.0, 0.147),
                (186_306.0, 0.168),
                (259_829.0, 0.205),
            ]),
            basic_personal_amount: 12_932.0,
            bpa_phase_down: None,
            age_amount: 5_799.0,
            age_amount_threshold: 43_169.0,
            age_amount_reduction_rate: 0.15,
            pension_amount: 1_000.0,
            eligible_dividend_credit: 0.12,
            non_eligible_dividend_credit: 0.0196,
            surtax: Vec::new(),
        },
        federal_abatement: 0.0,
        corporate_passive_rate: 0.5067,
    };

    let alberta = ProvinceRules {
        tax: JurisdictionRules {
            brackets: brackets(&[
                (0.0, 0.08),
                (60_000.0, 0.10),
                (151_234.0, 0.12),
                (181_481.0, 0.13),
                (241_974.0, 0.14),
                (362_961.0, 0.15),
            ]),
            basic_personal_amount: 22_323.0,
            bpa_phase_down: None,
            age_amount: 6_221.0,
            age_amount_threshold: 46_308.0,
            age_amount_reduction_rate: 0.15,
            pension_amount: 1_719.0,
            eligible_dividend_credit: 0.0812,
            non_eligible_dividend_credit: 0.0218,
            surtax: Vec::new(),
        },
        federal_abatement: 0.0,
        corporate_passive_rate: 0.4667,
    };

    let quebec = ProvinceRules {
        tax: JurisdictionRules {
            brackets: brackets(&[
                (0.0, 0.14),
                (53_255.0, 0.19),
                (106_495.0, 0.24),
                (129_590.0, 0.2575),
            ]),
            basic_personal_amount: 18_571.0,
            bpa_phase_down: None,
            age_amount: 3_986.0,
            age_amount_threshold: 42_090.0,
            age_amount_reduction_rate: 0.15,
            pension_amount: 3_374.0,
            eligible_dividend_credit: 0.117,
            non_eligible_dividend_credit: 0.0342,
            surtax: Vec::new(),
        },
        federal_abatement: 0.165,
        corporate_passive_rate: 0.5017,
    };

    TaxYearRules {
        year: 2025,
        federal,
        alberta,
        british_columbia,
        ontario,
        quebec,
        eligible_gross_up: 0.38,
        non_eligible_gross_up: 0.15,
        capital_gains_inclusion: 0.5,
        oas: OasRules {
            recovery_threshold: 93_454.0,
            recovery_rate: 0.15,
            standard_age: 65,
            max_start_age: 70,
            deferral_monthly_increase: 0.006,
            increase_age: 75,
            increase_rate: 0.10,
        },
        cpp: CppRules {
            standard_age: 65,
            min_start_age: 60,
            max_start_age: 70,
            early_monthly_reduction: 0.006,
            late_monthly_increase: 0.007,
        },
        gis: GisRules {
            single_max: 13_043.0,
            single_ceiling: 22_056.0,
            single_reduction_rate: 0.50,
            couple_max: 7_851.0,
            couple_ceiling: 29_136.0,
            couple_reduction_rate: 0.25,
        },
        rrif: RrifRules {
            conversion_age: 71,
            factors: vec![
                0.0528, 0.0540, 0.0553, 0.0567, 0.0582, 0.0598, 0.0617, 0.0636, 0.0658, 0.0682,
                0.0708, 0.0738, 0.0771, 0.0808, 0.0851, 0.0899, 0.0955, 0.1021, 0.1099, 0.1192,
                0.1306, 0.1449, 0.1634, 0.1879,
            ],
            terminal_rate: 0.20,
        },
        corporate: CorporateRules {
            refundable_rate: 0.3067,
            part_iv_rate: 0.3833,
            dividend_refund_rate: 0.3833,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn rrif_minimum_rates_follow_schedule() {
        let rules = RuleBook::canada();
        let table = rules.for_year(2025, 0.0).table;
        assert_approx(table.rrif.minimum_rate(65), 1.0 / 25.0);
        assert_approx(table.rrif.minimum_rate(70), 1.0 / 20.0);
        assert_approx(table.rrif.minimum_rate(71), 0.0528);
        assert_approx(table.rrif.minimum_rate(80), 0.0682);
        assert_approx(table.rrif.minimum_rate(94), 0.1879);
        assert_approx(table.rrif.minimum_rate(95), 0.20);
        assert_approx(table.rrif.minimum_rate(110), 0.20);
    }

    #[test]
    fn years_past_newest_table_are_indexed() {
        let rules = RuleBook::canada();
        let same = rules.for_year(2025, 2.0);
        assert_eq!(same.table.year, 2025);
        assert_approx(same.index, 1.0);

        let later = rules.for_year(2027, 2.0);
        assert_eq!(later.table.year, 2025);
        assert_approx(later.index, 1.02 * 1.02);
        assert_approx(later.dollars(100.0), 104.04);
    }

    #[test]
    fn years_before_oldest_table_use_it_unindexed() {
        let rules = RuleBook::canada();
        let early = rules.for_year(2020, 3.0);
        assert_eq!(early.table.year, 2025);
        assert_approx(early.index, 1.0);
    }

    #[test]
    fn brackets_are_sorted_for_every_jurisdiction() {
        let book = RuleBook::canada();
        let table = book.for_year(2025, 0.0).table;
        for province in [
            Province::Alberta,
            Province::BritishColumbia,
            Province::Ontario,
            Province::Quebec,
        ] {
            let brackets = &table.province(province).tax.brackets;
            assert!(brackets.windows(2).all(|w| w[0].threshold < w[1].threshold));
            assert_approx(brackets[0].threshold, 0.0);
        }
        assert!(
            table
                .federal
                .brackets
                .windows(2)
                .all(|w| w[0].rate < w[1].rate)
        );
    }
}
