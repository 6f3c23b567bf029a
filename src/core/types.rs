use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WithdrawalStrategy {
    TfsaFirst,
    MinimizeIncome,
    RrifSplitting,
    CapitalGainsOptimized,
    CorporateOptimized,
    Balanced,
    RrifFrontload,
    Manual,
}

impl WithdrawalStrategy {
    pub const ALL: [WithdrawalStrategy; 8] = [
        WithdrawalStrategy::TfsaFirst,
        WithdrawalStrategy::MinimizeIncome,
        WithdrawalStrategy::RrifSplitting,
        WithdrawalStrategy::CapitalGainsOptimized,
        WithdrawalStrategy::CorporateOptimized,
        WithdrawalStrategy::Balanced,
        WithdrawalStrategy::RrifFrontload,
        WithdrawalStrategy::Manual,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WithdrawalStrategy::TfsaFirst => "tfsa-first",
            WithdrawalStrategy::MinimizeIncome => "minimize-income",
            WithdrawalStrategy::RrifSplitting => "rrif-splitting",
            WithdrawalStrategy::CapitalGainsOptimized => "capital-gains-optimized",
            WithdrawalStrategy::CorporateOptimized => "corporate-optimized",
            WithdrawalStrategy::Balanced => "balanced",
            WithdrawalStrategy::RrifFrontload => "rrif-frontload",
            WithdrawalStrategy::Manual => "manual",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Province {
    #[serde(rename = "AB")]
    Alberta,
    #[serde(rename = "BC")]
    BritishColumbia,
    #[serde(rename = "ON")]
    Ontario,
    #[serde(rename = "QC")]
    Quebec,
}

impl Province {
    pub fn code(self) -> &'static str {
        match self {
            Province::Alberta => "AB",
            Province::BritishColumbia => "BC",
            Province::Ontario => "ON",
            Province::Quebec => "QC",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "AB" => Some(Province::Alberta),
            "BC" => Some(Province::BritishColumbia),
            "ON" => Some(Province::Ontario),
            "QC" => Some(Province::Quebec),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomeKind {
    EmployerPension,
    Rental,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeStream {
    pub kind: IncomeKind,
    pub annual_amount: f64,
    #[serde(default)]
    pub start_age: Option<u32>,
    #[serde(default)]
    pub end_age: Option<u32>,
    #[serde(default = "default_true")]
    pub indexed: bool,
}

fn default_true() -> bool {
    true
}

/// Fixed annual gross amounts for the `manual` strategy, in start-year dollars.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManualWithdrawals {
    pub tfsa: f64,
    pub rrif: f64,
    pub nonreg: f64,
    pub corporate: f64,
}

impl ManualWithdrawals {
    pub fn is_configured(&self) -> bool {
        self.tfsa > 0.0 || self.rrif > 0.0 || self.nonreg > 0.0 || self.corporate > 0.0
    }
}

/// One individual's starting state. Rates are percentages (`6.0` is 6%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonInput {
    pub name: String,
    pub start_age: u32,

    pub cpp_start_age: u32,
    pub cpp_annual_at_start: f64,
    pub oas_start_age: u32,
    pub oas_annual_at_start: f64,
    pub income_streams: Vec<IncomeStream>,

    pub tfsa_balance: f64,
    pub rrif_balance: f64,
    pub rrsp_balance: f64,
    pub nonreg_balance: f64,
    pub nonreg_acb: f64,
    pub corporate_balance: f64,
    pub corporate_rdtoh: f64,
    pub corporate_cda: f64,

    pub tfsa_growth_rate: f64,
    pub rrif_growth_rate: f64,

    pub nr_cash_pct: f64,
    pub nr_gic_pct: f64,
    pub nr_invest_pct: f64,
    pub y_nr_cash_interest: f64,
    pub y_nr_gic_interest: f64,
    pub y_nr_inv_total_return: f64,
    pub y_nr_inv_elig_div: f64,
    pub y_nr_inv_nonelig_div: f64,
    pub y_nr_inv_capg: f64,
    pub y_nr_inv_roc_pct: f64,

    pub corp_cash_pct: f64,
    pub corp_gic_pct: f64,
    pub corp_invest_pct: f64,
    pub y_corp_cash_interest: f64,
    pub y_corp_gic_interest: f64,
    pub y_corp_inv_total_return: f64,
    pub y_corp_inv_elig_div: f64,
    pub y_corp_inv_capg: f64,

    pub tfsa_room_start: f64,
    pub manual_withdrawals: Option<ManualWithdrawals>,
}

impl Default for PersonInput {
    fn default() -> Self {
        Self {
            name: String::new(),
            start_age: 0,
            cpp_start_age: 65,
            cpp_annual_at_start: 0.0,
            oas_start_age: 65,
            oas_annual_at_start: 0.0,
            income_streams: Vec::new(),
            tfsa_balance: 0.0,
            rrif_balance: 0.0,
            rrsp_balance: 0.0,
            nonreg_balance: 0.0,
            nonreg_acb: 0.0,
            corporate_balance: 0.0,
            corporate_rdtoh: 0.0,
            corporate_cda: 0.0,
            tfsa_growth_rate: 0.0,
            rrif_growth_rate: 0.0,
            nr_cash_pct: 0.0,
            nr_gic_pct: 0.0,
            nr_invest_pct: 100.0,
            y_nr_cash_interest: 0.0,
            y_nr_gic_interest: 0.0,
            y_nr_inv_total_return: 0.0,
            y_nr_inv_elig_div: 0.0,
            y_nr_inv_nonelig_div: 0.0,
            y_nr_inv_capg: 0.0,
            y_nr_inv_roc_pct: 0.0,
            corp_cash_pct: 0.0,
            corp_gic_pct: 0.0,
            corp_invest_pct: 100.0,
            y_corp_cash_interest: 0.0,
            y_corp_gic_interest: 0.0,
            y_corp_inv_total_return: 0.0,
            y_corp_inv_elig_div: 0.0,
            y_corp_inv_capg: 0.0,
            tfsa_room_start: 0.0,
            manual_withdrawals: None,
        }
    }
}

impl PersonInput {
    /// A zeroed placeholder used for single-person households.
    pub fn is_active(&self) -> bool {
        !self.name.trim().is_empty()
            || self.total_assets() > 0.0
            || self.cpp_annual_at_start > 0.0
            || self.oas_annual_at_start > 0.0
            || self.income_streams.iter().any(|s| s.annual_amount > 0.0)
    }

    pub fn total_assets(&self) -> f64 {
        self.tfsa_balance
            + self.rrif_balance
            + self.rrsp_balance
            + self.nonreg_balance
            + self.corporate_balance
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HouseholdInput {
    pub p1: PersonInput,
    pub p2: PersonInput,
    pub province: String,
    pub start_year: u32,
    pub end_age: u32,
    pub strategy: WithdrawalStrategy,

    pub spending_go_go: f64,
    pub go_go_end_age: u32,
    pub spending_slow_go: f64,
    pub slow_go_end_age: u32,
    pub spending_no_go: f64,
    pub spending_inflation: f64,

    pub general_inflation: f64,
    pub tfsa_room_annual_growth: f64,

    pub gap_tolerance: f64,
    pub reinvest_nonreg_dist: bool,
    pub income_split_rrif_fraction: f64,
    pub hybrid_topup_amount: f64,
    pub stop_on_fail: bool,
}

impl Default for HouseholdInput {
    fn default() -> Self {
        Self {
            p1: PersonInput::default(),
            p2: PersonInput::default(),
            province: "ON".to_string(),
            start_year: 2025,
            end_age: 95,
            strategy: WithdrawalStrategy::Balanced,
            spending_go_go: 0.0,
            go_go_end_age: 75,
            spending_slow_go: 0.0,
            slow_go_end_age: 85,
            spending_no_go: 0.0,
            spending_inflation: 2.0,
            general_inflation: 2.0,
            tfsa_room_annual_growth: 7_000.0,
            gap_tolerance: 500.0,
            reinvest_nonreg_dist: true,
            income_split_rrif_fraction: 0.5,
            hybrid_topup_amount: 0.0,
            stop_on_fail: false,
        }
    }
}

impl HouseholdInput {
    pub fn initial_total_assets(&self) -> f64 {
        self.p1.total_assets() + self.p2.total_assets()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearResult {
    pub year: u32,
    pub age_p1: u32,
    pub age_p2: u32,

    pub cpp_p1: f64,
    pub cpp_p2: f64,
    pub oas_p1: f64,
    pub oas_p2: f64,
    pub gis_p1: f64,
    pub gis_p2: f64,
    pub oas_clawback_p1: f64,
    pub oas_clawback_p2: f64,
    pub pension_income_p1: f64,
    pub pension_income_p2: f64,
    pub other_income_p1: f64,
    pub other_income_p2: f64,
    pub nonreg_distributions_p1: f64,
    pub nonreg_distributions_p2: f64,

    pub tfsa_contribution_p1: f64,
    pub tfsa_contribution_p2: f64,
    pub tfsa_withdrawal_p1: f64,
    pub tfsa_withdrawal_p2: f64,
    pub rrif_withdrawal_p1: f64,
    pub rrif_withdrawal_p2: f64,
    pub rrif_minimum_p1: f64,
    pub rrif_minimum_p2: f64,
    pub nonreg_withdrawal_p1: f64,
    pub nonreg_withdrawal_p2: f64,
    pub corporate_withdrawal_p1: f64,
    pub corporate_withdrawal_p2: f64,

    pub tfsa_balance_p1: f64,
    pub tfsa_balance_p2: f64,
    pub rrif_balance_p1: f64,
    pub rrif_balance_p2: f64,
    pub rrsp_balance_p1: f64,
    pub rrsp_balance_p2: f64,
    pub nonreg_balance_p1: f64,
    pub nonreg_balance_p2: f64,
    pub nonreg_acb_p1: f64,
    pub nonreg_acb_p2: f64,
    pub corporate_balance_p1: f64,
    pub corporate_balance_p2: f64,

    pub taxable_income_p1: f64,
    pub taxable_income_p2: f64,
    pub tax_p1: f64,
    pub tax_p2: f64,
    pub marginal_rate_p1: f64,
    pub marginal_rate_p2: f64,
    pub corporate_tax_p1: f64,
    pub corporate_tax_p2: f64,

    pub cash_on_hand: f64,
    pub total_portfolio: f64,
    pub total_tax: f64,
    pub total_withdrawals: f64,
    pub spending_need: f64,
    pub spending_met: f64,
    pub spending_gap: f64,
    pub plan_success: bool,
    pub failure_reason: Option<String>,
    pub strategy_applied: WithdrawalStrategy,
}

impl YearResult {
    pub fn total_government_benefits(&self) -> f64 {
        self.cpp_p1 + self.cpp_p2 + self.oas_p1 + self.oas_p2 + self.gis_p1 + self.gis_p2
            - self.oas_clawback_p1
            - self.oas_clawback_p2
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NetWorthTrend {
    Growing,
    Stable,
    Declining,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthCriteria {
    pub funding_coverage: f64,
    pub tax_efficiency: f64,
    pub estate_preservation: f64,
    pub benefit_optimization: f64,
    pub risk_management: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationSummary {
    pub years_simulated: u32,
    pub years_funded: u32,
    pub total_underfunded_years: u32,
    pub success_rate: f64,
    pub first_failure_year: Option<u32>,
    pub total_spending_gap: f64,

    pub total_tax_paid: f64,
    pub total_corporate_tax: f64,
    pub total_withdrawals: f64,
    pub total_tfsa_withdrawals: f64,
    pub total_rrif_withdrawals: f64,
    pub total_nonreg_withdrawals: f64,
    pub total_corporate_withdrawals: f64,
    pub total_cpp: f64,
    pub total_oas: f64,
    pub total_gis: f64,
    pub total_oas_clawback: f64,
    pub total_government_benefits: f64,

    pub initial_total_assets: f64,
    pub final_net_worth: f64,
    pub peak_net_worth: f64,
    pub net_worth_trend: NetWorthTrend,
    pub net_worth_cagr: f64,

    pub avg_effective_tax_rate: f64,
    pub tax_efficiency_ratio: f64,

    pub health_score: f64,
    pub health_rating: String,
    pub health_criteria: HealthCriteria,

    pub final_estate_gross: f64,
    pub final_estate_after_tax: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EstateSummary {
    pub gross_estate: f64,
    pub tfsa_value: f64,
    pub registered_value: f64,
    pub nonreg_value: f64,
    pub corporate_value: f64,
    pub cash_value: f64,
    pub tax_on_registered: f64,
    pub tax_on_capital_gains: f64,
    pub tax_on_corporate: f64,
    pub total_estate_tax: f64,
    pub after_tax_estate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub year: u32,
    pub age_p1: u32,
    pub age_p2: u32,
    pub net_worth: f64,
    pub spending_need: f64,
    pub spending_met: f64,
    pub total_tax: f64,
    pub government_benefits: f64,
    pub tfsa: f64,
    pub registered: f64,
    pub nonreg: f64,
    pub corporate: f64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningLevel {
    Info,
    Warning,
    Alert,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationWarning {
    pub level: WarningLevel,
    pub code: String,
    pub message: String,
}

impl SimulationWarning {
    pub fn new(level: WarningLevel, code: &str, message: impl Into<String>) -> Self {
        Self {
            level,
            code: code.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResponse {
    pub success: bool,
    pub message: String,
    pub year_by_year: Vec<YearResult>,
    pub summary: SimulationSummary,
    pub estate_summary: EstateSummary,
    pub chart_data: Vec<ChartPoint>,
    pub warnings: Vec<SimulationWarning>,
}
