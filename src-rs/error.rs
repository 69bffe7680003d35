use thiserror::Error;

#[derive(Error, Debug)]
pub enum WarehouseError {
    #[error("warehouse grid not found: missing {missing}")]
    GeometryNotFound { missing: String },

    #[error("scroll desync: wanted top row {target}, still at {observed} after {attempts} attempts")]
    ScrollDesync {
        target: i32,
        observed: i32,
        attempts: u32,
    },

    #[error("timed out waiting for {what} after {attempts} attempts")]
    Timeout { what: String, attempts: u32 },

    #[error("price extraction failed: {0}")]
    ExtractionFailure(String),

    #[error("sell flow abandoned at step: {step}")]
    SellFlowAbandoned { step: String },

    #[error("session cancelled")]
    Cancelled,

    #[error("frame capture failed: {0}")]
    Capture(String),

    #[error("input injection failed: {0}")]
    Input(String),

    #[error("template unavailable: {0}")]
    Template(String),
}

impl WarehouseError {
    pub fn abandoned(step: impl Into<String>) -> Self {
        WarehouseError::SellFlowAbandoned { step: step.into() }
    }

    /// Per-item failures are absorbed by the scan and the executor; everything
    /// else ends the session.
    pub fn is_item_local(&self) -> bool {
        matches!(
            self,
            WarehouseError::ExtractionFailure(_) | WarehouseError::SellFlowAbandoned { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, WarehouseError>;
