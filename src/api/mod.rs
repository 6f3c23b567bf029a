use axum::{
    Router,
    extract::{Json, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::core::{
    HealthRubric, HouseholdInput, RuleBook, SimulationError, SolveError, SpendingSolveConfig,
    run_simulation, solve_max_spending,
};

#[derive(Parser, Debug)]
#[command(
    name = "nestegg",
    about = "Year-by-year retirement decumulation simulator for Canadian households"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the JSON API.
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
        #[arg(long, help = "Engine settings file (JSON)")]
        config: Option<PathBuf>,
    },
    /// Simulate one household from a JSON file and print the response.
    Run {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        pretty: bool,
        #[arg(long, help = "Engine settings file (JSON)")]
        config: Option<PathBuf>,
    },
}

/// Settings that are not part of a household: scoring weights and solver
/// defaults. Every field is optional in the file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub health_rubric: HealthRubric,
    pub solver: SpendingSolveConfig,
}

impl EngineConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, CliError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path).map_err(|source| CliError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| CliError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Simulation(#[from] SimulationError),
    #[error("failed to encode response: {0}")]
    Encode(#[source] serde_json::Error),
}

pub fn run_household_file(
    input: &Path,
    pretty: bool,
    config: &EngineConfig,
) -> Result<String, CliError> {
    let raw = std::fs::read_to_string(input).map_err(|source| CliError::Read {
        path: input.to_path_buf(),
        source,
    })?;
    let household: HouseholdInput = serde_json::from_str(&raw).map_err(|source| CliError::Parse {
        path: input.to_path_buf(),
        source,
    })?;
    let response = run_simulation(&household, &RuleBook::canada(), &config.health_rubric)?;
    let encoded = if pretty {
        serde_json::to_string_pretty(&response)
    } else {
        serde_json::to_string(&response)
    };
    encoded.map_err(CliError::Encode)
}

#[derive(Clone)]
pub struct AppState {
    pub rule_book: Arc<RuleBook>,
    pub config: Arc<EngineConfig>,
}

impl AppState {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            rule_book: Arc::new(RuleBook::canada()),
            config: Arc::new(config),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    error_details: Vec<String>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    rules_year: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct MaxSpendingRequest {
    pub household: HouseholdInput,
    #[serde(default)]
    pub solver: Option<SpendingSolveConfig>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{error}")]
    BadRequest { error: String, details: Vec<String> },
    #[error("{error}")]
    Internal { error: String, details: Vec<String> },
    #[error("Not found")]
    NotFound,
}

impl From<SimulationError> for ApiError {
    fn from(err: SimulationError) -> Self {
        let details = err.details();
        match err {
            SimulationError::Validation(_) => ApiError::BadRequest {
                error: "Invalid household input".to_string(),
                details,
            },
            SimulationError::Invariant(_) => ApiError::Internal {
                error: "Simulation failed to run".to_string(),
                details,
            },
        }
    }
}

impl From<SolveError> for ApiError {
    fn from(err: SolveError) -> Self {
        match err {
            SolveError::Config(msg) => ApiError::BadRequest {
                error: "Invalid solver settings".to_string(),
                details: vec![msg],
            },
            SolveError::Simulation(err) => err.into(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest {
            error: "Invalid JSON payload".to_string(),
            details: vec![rejection.body_text()],
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, error_details) = match self {
            ApiError::BadRequest { error, details } => (StatusCode::BAD_REQUEST, error, details),
            ApiError::Internal { error, details } => {
                (StatusCode::INTERNAL_SERVER_ERROR, error, details)
            }
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string(), Vec::new()),
        };
        json_response(
            status,
            ErrorResponse {
                error,
                error_details,
            },
        )
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/simulate", post(simulate_handler))
        .route("/api/max-spending", post(max_spending_handler))
        .fallback(not_found_handler)
        .with_state(state)
}

pub async fn run_http_server(port: u16, config: EngineConfig) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router(AppState::new(config));

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "nestegg HTTP API listening");

    axum::serve(listener, app).await
}

async fn health_handler(State(state): State<AppState>) -> Response {
    json_response(
        StatusCode::OK,
        HealthResponse {
            status: "ok",
            rules_year: state.rule_book.newest_year(),
        },
    )
}

async fn not_found_handler() -> Response {
    ApiError::NotFound.into_response()
}

async fn simulate_handler(
    State(state): State<AppState>,
    payload: Result<Json<HouseholdInput>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(household)) => simulate_impl(&state, &household),
        Err(rejection) => ApiError::from(rejection).into_response(),
    }
}

fn simulate_impl(state: &AppState, household: &HouseholdInput) -> Response {
    match run_simulation(household, &state.rule_book, &state.config.health_rubric) {
        Ok(response) => json_response(StatusCode::OK, response),
        Err(err) => {
            if matches!(err, SimulationError::Invariant(_)) {
                error!(error = %err, "simulation aborted");
            }
            ApiError::from(err).into_response()
        }
    }
}

async fn max_spending_handler(
    State(state): State<AppState>,
    payload: Result<Json<MaxSpendingRequest>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(request)) => max_spending_impl(&state, &request),
        Err(rejection) => ApiError::from(rejection).into_response(),
    }
}

fn max_spending_impl(state: &AppState, request: &MaxSpendingRequest) -> Response {
    let config = request.solver.unwrap_or(state.config.solver);
    match solve_max_spending(&request.household, &state.rule_book, config) {
        Ok(result) => json_response(StatusCode::OK, result),
        Err(err) => ApiError::from(err).into_response(),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        "no-store".parse().expect("valid header"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::WithdrawalStrategy;
    use serde_json::Value;

    const HOUSEHOLD_JSON: &str = r#"{
      "p1": {
        "name": "Avery",
        "start_age": 65,
        "cpp_annual_at_start": 12000,
        "oas_annual_at_start": 8800,
        "tfsa_balance": 150000,
        "rrif_balance": 400000,
        "nonreg_balance": 200000,
        "nonreg_acb": 150000,
        "tfsa_growth_rate": 5.0,
        "rrif_growth_rate": 5.0,
        "y_nr_inv_total_return": 6.0,
        "y_nr_inv_elig_div": 2.0
      },
      "province": "AB",
      "end_age": 90,
      "strategy": "minimize-income",
      "spending_go_go": 60000,
      "spending_slow_go": 50000,
      "spending_no_go": 40000
    }"#;

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body readable");
        serde_json::from_slice(&bytes).expect("json body")
    }

    fn state() -> AppState {
        AppState::new(EngineConfig::default())
    }

    #[test]
    fn household_json_uses_percent_rates_and_kebab_strategies() {
        let household: HouseholdInput = serde_json::from_str(HOUSEHOLD_JSON).expect("parses");
        assert_eq!(household.strategy, WithdrawalStrategy::MinimizeIncome);
        assert_eq!(household.p1.y_nr_inv_total_return, 6.0);
        assert_eq!(household.p1.cpp_start_age, 65);
        assert_eq!(household.p1.nr_invest_pct, 100.0);
        assert!(!household.p2.is_active());
        assert_eq!(household.gap_tolerance, 500.0);
    }

    #[test]
    fn unknown_strategy_is_rejected_at_parse_time() {
        let json = HOUSEHOLD_JSON.replace("minimize-income", "yolo");
        let err = serde_json::from_str::<HouseholdInput>(&json).expect_err("unknown variant");
        assert!(err.to_string().contains("unknown variant"));
    }

    #[tokio::test]
    async fn simulate_returns_full_response() {
        let household: HouseholdInput = serde_json::from_str(HOUSEHOLD_JSON).expect("parses");
        let response = simulate_impl(&state(), &household);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).expect("header"),
            "no-store"
        );
        let body = body_json(response).await;
        assert_eq!(body["success"], Value::Bool(true));
        assert_eq!(body["year_by_year"].as_array().expect("years").len(), 25);
        assert_eq!(body["year_by_year"][0]["strategy_applied"], "minimize-income");
        assert!(body["summary"]["health_rating"].is_string());
        assert!(body["estate_summary"]["after_tax_estate"].is_number());
        assert_eq!(body["chart_data"].as_array().expect("chart").len(), 25);
    }

    #[tokio::test]
    async fn invalid_household_is_a_bad_request_with_details() {
        let mut household: HouseholdInput = serde_json::from_str(HOUSEHOLD_JSON).expect("parses");
        household.p1.nr_cash_pct = 20.0;
        household.province = "ZZ".to_string();
        let response = simulate_impl(&state(), &household);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Invalid household input");
        assert_eq!(body["error_details"].as_array().expect("details").len(), 2);
    }

    #[tokio::test]
    async fn invariant_failures_map_to_internal_error() {
        let response =
            ApiError::from(SimulationError::Invariant("negative balance".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error_details"][0], "negative balance");
    }

    #[tokio::test]
    async fn max_spending_solves_with_request_settings() {
        let household: HouseholdInput = serde_json::from_str(HOUSEHOLD_JSON).expect("parses");
        let request = MaxSpendingRequest {
            household,
            solver: Some(SpendingSolveConfig {
                search_max: 3.0,
                tolerance: 0.01,
                ..SpendingSolveConfig::default()
            }),
        };
        let response = max_spending_impl(&state(), &request);
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["feasible"], Value::Bool(true));
        assert!(body["solved_multiplier"].as_f64().expect("multiplier") > 0.0);
    }

    #[tokio::test]
    async fn solver_settings_errors_are_bad_requests() {
        let household: HouseholdInput = serde_json::from_str(HOUSEHOLD_JSON).expect("parses");
        let request = MaxSpendingRequest {
            household,
            solver: Some(SpendingSolveConfig {
                tolerance: 0.0,
                ..SpendingSolveConfig::default()
            }),
        };
        let response = max_spending_impl(&state(), &request);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Invalid solver settings");
    }

    #[test]
    fn engine_config_fills_missing_fields() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"health_rubric": {"funding_coverage": 50}}"#).expect("parses");
        assert_eq!(config.health_rubric.funding_coverage, 50.0);
        assert_eq!(config.health_rubric.tax_efficiency, 20.0);
        assert_eq!(config.solver, SpendingSolveConfig::default());
        assert_eq!(EngineConfig::load(None).expect("default"), EngineConfig::default());
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["nestegg", "run", "--input", "household.json", "--pretty"])
            .expect("parses");
        match cli.command {
            Command::Run {
                input,
                pretty,
                config,
            } => {
                assert_eq!(input, PathBuf::from("household.json"));
                assert!(pretty);
                assert!(config.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }

        let cli = Cli::try_parse_from(["nestegg", "serve"]).expect("parses");
        assert!(matches!(cli.command, Command::Serve { port: 8080, .. }));
    }

    #[test]
    fn run_household_file_reports_missing_file() {
        let err = run_household_file(
            Path::new("/nonexistent/household.json"),
            false,
            &EngineConfig::default(),
        )
        .expect_err("missing file");
        assert!(matches!(err, CliError::Read { .. }));
    }
}
