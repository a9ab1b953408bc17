use thiserror::Error;

/// Engine-level failures. Everything carries enough context (match/group/user
/// id) for the caller to retry the specific unit.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The match's synchronized flag is already set; the incremental path is
    /// rejected and the caller must go through reconciliation instead.
    #[error("match {0} has already been synchronized")]
    AlreadySynced(i32),

    /// The match is not in a state the sync path accepts.
    #[error("match {match_id} is not ready to sync: {reason}")]
    NotReady { match_id: i32, reason: &'static str },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i32 },

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// A persisted JSON state column (points ledger, table snapshot) failed
    /// to encode or decode.
    #[error("invalid JSON state: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub(crate) fn not_found(entity: &'static str, id: i32) -> EngineError {
        EngineError::NotFound { entity, id }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
