use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DrawError {
    #[error("Invalid bracket size: {0}")]
    InvalidBracketSize(String),

    #[error("Stage incomplete: {pending} group match(es) still unfinished")]
    IncompleteStage { pending: usize },

    #[error("Knockout already started: {0} match(es) in progress or completed")]
    KnockoutAlreadyStarted(usize),

    #[error("Group stage already started: {0} match(es) in progress or completed")]
    GroupStageAlreadyStarted(usize),

    #[error("Match {0} is already completed")]
    AlreadyCompleted(Uuid),

    #[error("Winner {winner_id} is not a player of match {match_id}")]
    InvalidWinner { match_id: Uuid, winner_id: Uuid },

    #[error("Match {0} does not have both players assigned")]
    MatchNotReady(Uuid),

    #[error("Slot unavailable: {0}")]
    SlotUnavailable(String),

    #[error("Corrupt bracket: {0}")]
    CorruptBracket(String),

    #[error("Unsupported for draw format: {0}")]
    UnsupportedFormat(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DrawError {
    pub fn not_found(what: impl Into<String>) -> Self {
        DrawError::NotFound(what.into())
    }

    pub fn corrupt(detail: impl Into<String>) -> Self {
        DrawError::CorruptBracket(detail.into())
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        DrawError::Internal(detail.into())
    }

    /// HTTP status the surrounding web layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            DrawError::InvalidBracketSize(_)
            | DrawError::InvalidWinner { .. }
            | DrawError::MatchNotReady(_)
            | DrawError::UnsupportedFormat(_)
            | DrawError::Validation(_) => 400,
            DrawError::NotFound(_) => 404,
            DrawError::IncompleteStage { .. }
            | DrawError::KnockoutAlreadyStarted(_)
            | DrawError::GroupStageAlreadyStarted(_)
            | DrawError::AlreadyCompleted(_)
            | DrawError::SlotUnavailable(_) => 409,
            DrawError::CorruptBracket(_)
            | DrawError::Database(_)
            | DrawError::Internal(_) => 500,
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        let error = match self {
            DrawError::CorruptBracket(_) => "Bracket integrity error".to_string(),
            DrawError::Database(_) => "Database error".to_string(),
            DrawError::Internal(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        };

        ErrorResponse {
            error,
            code: self.status_code(),
            details: Some(self.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for DrawError {
    fn from(errors: validator::ValidationErrors) -> Self {
        DrawError::Validation(errors.to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
    pub details: Option<String>,
}
