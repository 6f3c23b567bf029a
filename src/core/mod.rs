mod benefits;
mod engine;
mod error;
mod ledger;
mod rules;
mod solver;
mod strategy;
mod summary;
mod tax;
mod types;
mod validate;
mod year;

pub use benefits::{GisApplicant, OasResult, project_cpp, project_gis, project_oas};
pub use engine::{estate_at_horizon, run_simulation, simulate_household};
pub use error::{LedgerError, SimulationError, ValidationErrors};
pub use ledger::PersonLedger;
pub use rules::{RuleBook, TaxYearRules, YearRules};
pub use solver::{
    SolveError, SpendingPhases, SpendingSolveConfig, SpendingSolveIteration, SpendingSolveResult,
    solve_max_spending,
};
pub use strategy::{WithdrawalPlan, decide_withdrawals, resolve_strategy};
pub use summary::{HealthRubric, health_rating};
pub use tax::{BracketSlice, IncomeBreakdown, TaxResult, compute_tax, compute_tax_on_income};
pub use types::{
    ChartPoint, EstateSummary, HealthCriteria, HouseholdInput, IncomeKind, IncomeStream,
    ManualWithdrawals, NetWorthTrend, PersonInput, Province, SimulationResponse,
    SimulationSummary, SimulationWarning, WarningLevel, WithdrawalStrategy, YearResult,
};
pub use validate::{ValidatedHousehold, resolve_province, validate_household};
pub use year::{HouseholdState, YearContext, simulate_year};
