use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationErrors {
    pub issues: Vec<String>,
}

impl ValidationErrors {
    pub fn push(&mut self, issue: impl Into<String>) {
        self.issues.push(issue.into());
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn single(issue: impl Into<String>) -> Self {
        Self {
            issues: vec![issue.into()],
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.issues.join("; "))
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LedgerError {
    #[error("{account}: withdrawal of {amount:.2} exceeds balance {balance:.2}")]
    Overdraw {
        account: &'static str,
        amount: f64,
        balance: f64,
    },
    #[error("{account}: negative withdrawal {amount:.2}")]
    NegativeAmount { account: &'static str, amount: f64 },
    #[error("{account}: balance became negative ({balance:.2})")]
    NegativeBalance { account: &'static str, balance: f64 },
    #[error("{account}: non-finite value")]
    NonFinite { account: &'static str },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimulationError {
    #[error("invalid household input: {0}")]
    Validation(ValidationErrors),
    #[error("simulation invariant violated: {0}")]
    Invariant(String),
}

impl From<LedgerError> for SimulationError {
    fn from(err: LedgerError) -> Self {
        SimulationError::Invariant(err.to_string())
    }
}

impl From<ValidationErrors> for SimulationError {
    fn from(err: ValidationErrors) -> Self {
        SimulationError::Validation(err)
    }
}

impl SimulationError {
    pub fn details(&self) -> Vec<String> {
        match self {
            SimulationError::Validation(errors) => errors.issues.clone(),
            SimulationError::Invariant(msg) => vec![msg.clone()],
        }
    }
}
