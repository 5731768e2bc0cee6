use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::*;

#[derive(PartialEq, Debug, Serialize, Deserialize, Clone)]
pub struct ServiceInfo {
    pub domain: PermitDomain,
    pub max_permit_days: u32,
}

/// Error conditions a caller can tell apart.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone, Copy)]
pub enum ErrorKind {
    InvalidPrediction,
    PredictionInactive,
    PredictionStillActive,
    AlreadyPredicted,
    InvalidProof,
    DecryptionDenied,
    Unauthorized,
    DecryptTimeout,
    Internal,
}
#[derive(PartialEq, Debug, Serialize, Deserialize, Clone)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub message: String,
}

/// A non-success answer from the server, as seen by [`crate::client::Client`].
#[derive(PartialEq, Debug, Clone, Error)]
#[error("{status} {kind}: {message}")]
pub struct ApiError {
    pub status: u16,
    pub kind: ErrorKind,
    pub message: String,
}
