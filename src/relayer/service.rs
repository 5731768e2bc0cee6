//! HTTP surface of a [`CiphertextEngine`], the counterpart of [`super::RelayerEngine`].

use std::collections::HashMap;

use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use log::trace;

use crate::api::*;
use crate::engine::{ProofCheck, SharedEngine};
use crate::error::map_any_err_and_code;

type Response<T> = Result<Json<T>, (StatusCode, String)>;

/// Every engine operation, for an engine process the service reaches through a relayer.
pub fn router<S>(engine: SharedEngine) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/encrypt_one_hot", post(encrypt_one_hot))
        .route("/verify_input", post(verify_input))
        .route("/add", post(add))
        .route("/allow", post(allow))
        .route("/is_allowed", post(is_allowed))
        .route("/decrypt", post(decrypt))
        .with_state(engine)
}

/// Only vote encryption. Everything else stays behind the service's own checks.
pub fn encryption_router<S>(engine: SharedEngine) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/encrypt_one_hot", post(encrypt_one_hot))
        .with_state(engine)
}

async fn encrypt_one_hot(
    State(engine): State<SharedEngine>,
    Json(request): Json<EncryptOneHotRequest>,
) -> Response<EncryptedVote> {
    let vote = engine
        .encrypt_one_hot(request.outcome, &request.context)
        .await
        .map_err(map_any_err_and_code)?;
    trace!("Encrypted vote for prediction {}", request.context.prediction);
    Ok(Json(vote))
}
async fn verify_input(
    State(engine): State<SharedEngine>,
    Json(request): Json<VerifyInputRequest>,
) -> Response<ProofCheck> {
    let check = engine
        .verify_input(&request.vote, &request.context)
        .await
        .map_err(map_any_err_and_code)?;
    Ok(Json(check))
}
async fn add(
    State(engine): State<SharedEngine>,
    Json(request): Json<AddRequest>,
) -> Response<CipherHandle> {
    let sum = engine
        .add(&request.lhs, &request.rhs)
        .await
        .map_err(map_any_err_and_code)?;
    Ok(Json(sum))
}
async fn allow(
    State(engine): State<SharedEngine>,
    Json(request): Json<AllowRequest>,
) -> Response<()> {
    engine
        .allow(&request.handle, &request.account)
        .await
        .map_err(map_any_err_and_code)?;
    Ok(Json(()))
}
async fn is_allowed(
    State(engine): State<SharedEngine>,
    Json(request): Json<AllowRequest>,
) -> Response<bool> {
    let allowed = engine
        .is_allowed(&request.handle, &request.account)
        .await
        .map_err(map_any_err_and_code)?;
    Ok(Json(allowed))
}
async fn decrypt(
    State(engine): State<SharedEngine>,
    Json(request): Json<EngineDecryptRequest>,
) -> Response<HashMap<CipherHandle, u32>> {
    let plaintexts = engine
        .decrypt(&request.handles, &request.public_key)
        .await
        .map_err(map_any_err_and_code)?;
    Ok(Json(plaintexts))
}
