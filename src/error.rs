use crate::api::{ErrorKind, ErrorResponse, PredictionId, UserPubKey};
use axum::http::StatusCode;
use axum::Json;
use log::debug;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("Prediction {0} does not exist")]
    InvalidPrediction(PredictionId),
    #[error("Prediction {0} is closed")]
    PredictionInactive(PredictionId),
    #[error("Prediction {0} is still active")]
    PredictionStillActive(PredictionId),
    #[error("Account {1} already predicted on prediction {0}")]
    AlreadyPredicted(PredictionId, UserPubKey),
    #[error("Input proof rejected: {0}")]
    InvalidProof(String),
    #[error("Decryption denied: {0}")]
    DecryptionDenied(String),
    #[error("Access denied: {0}")]
    Unauthorized(String),
    #[error("Decryption did not finish within {0} seconds")]
    DecryptTimeout(u64),
    #[error("Ciphertext engine failure: {0:#}")]
    Engine(anyhow::Error),
    #[error("Storage failure: {0:#}")]
    Storage(anyhow::Error),
}
impl PredictionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidPrediction(_) => ErrorKind::InvalidPrediction,
            Self::PredictionInactive(_) => ErrorKind::PredictionInactive,
            Self::PredictionStillActive(_) => ErrorKind::PredictionStillActive,
            Self::AlreadyPredicted(..) => ErrorKind::AlreadyPredicted,
            Self::InvalidProof(_) => ErrorKind::InvalidProof,
            Self::DecryptionDenied(_) => ErrorKind::DecryptionDenied,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::DecryptTimeout(_) => ErrorKind::DecryptTimeout,
            Self::Engine(_) | Self::Storage(_) => ErrorKind::Internal,
        }
    }
    pub fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::InvalidPrediction => StatusCode::NOT_FOUND,
            ErrorKind::PredictionInactive => StatusCode::CONFLICT,
            ErrorKind::PredictionStillActive => StatusCode::PRECONDITION_FAILED,
            ErrorKind::AlreadyPredicted | ErrorKind::DecryptionDenied => StatusCode::FORBIDDEN,
            ErrorKind::InvalidProof => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::DecryptTimeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub fn map_prediction_err(e: PredictionError) -> (StatusCode, Json<ErrorResponse>) {
    debug!("Error: {}", e);
    (
        e.status(),
        Json(ErrorResponse {
            kind: e.kind(),
            message: e.to_string(),
        }),
    )
}
pub fn map_any_err_and_code(e: anyhow::Error) -> (StatusCode, String) {
    debug!("Error: {:#}", e);
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e))
}
