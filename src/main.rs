#![allow(dead_code)]
use crate::api::*;
use crate::config::Settings;
use crate::db::{MemoryDB, SQLite, DB};
use crate::engine::{SharedEngine, TestCiphertextEngine};
use crate::error::map_prediction_err;
use crate::pronostico::Pronostico;
use crate::relayer::RelayerEngine;
use anyhow::Result;
use axum::extract::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use axum_macros::debug_handler;
use clap::Parser;
use env_logger::{Builder, WriteStyle};
use log::{debug, error, info, LevelFilter};
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

mod api;
mod authorizer;
mod client;
mod config;
mod db;
mod engine;
mod error;
mod pronostico;
mod relayer;

type SharedState = Arc<RwLock<Pronostico>>;
type ErrorReply = (StatusCode, Json<ErrorResponse>);

#[debug_handler]
async fn create_prediction(
    State(state): State<SharedState>,
    Json(request): Json<PostRequest<CreatePredictionRequest>>,
) -> Result<(StatusCode, Json<PredictionId>), ErrorReply> {
    let mut backend = state.write().await;
    let creator = backend
        .check_access(&request.access)
        .await
        .map_err(map_prediction_err)?;
    let prediction = request.data;
    let id = backend
        .create_prediction(
            prediction.title.clone(),
            prediction.home_team,
            prediction.away_team,
            creator,
        )
        .await
        .map_err(map_prediction_err)?;
    debug!("Created Prediction {}: {}", id, prediction.title);
    Ok((StatusCode::CREATED, Json(id)))
}
#[debug_handler]
async fn submit_prediction(
    State(state): State<SharedState>,
    Json(request): Json<PostRequest<SubmitPredictionRequest>>,
) -> Result<(), ErrorReply> {
    let mut backend = state.write().await;
    let voter = backend
        .check_access(&request.access)
        .await
        .map_err(map_prediction_err)?;
    let (prediction, vote) = (request.data.prediction, request.data.vote);
    debug!("Submitting vote of {} on prediction {}", voter, prediction);
    backend
        .submit_prediction(prediction, vote, voter)
        .await
        .map_err(map_prediction_err)?;
    Ok(())
}
async fn close_prediction(
    State(state): State<SharedState>,
    Json(request): Json<PostRequest<PredictionRequest>>,
) -> Result<(), ErrorReply> {
    let mut backend = state.write().await;
    let closer = backend
        .check_access(&request.access)
        .await
        .map_err(map_prediction_err)?;
    backend
        .close_prediction(request.data.prediction, closer)
        .await
        .map_err(map_prediction_err)?;
    debug!("Closed prediction {}", request.data.prediction);
    Ok(())
}
async fn get_prediction(
    State(state): State<SharedState>,
    Json(request): Json<PredictionRequest>,
) -> Result<Json<Prediction>, ErrorReply> {
    let backend = state.read().await;
    let prediction = backend
        .get_prediction(request.prediction)
        .await
        .map_err(map_prediction_err)?;
    Ok(Json(prediction))
}
async fn get_prediction_count(
    State(state): State<SharedState>,
) -> Result<Json<u64>, ErrorReply> {
    let backend = state.read().await;
    let count = backend
        .get_prediction_count()
        .await
        .map_err(map_prediction_err)?;
    Ok(Json(count))
}
async fn has_predicted(
    State(state): State<SharedState>,
    Json(request): Json<HasPredictedRequest>,
) -> Result<Json<bool>, ErrorReply> {
    let backend = state.read().await;
    let voted = backend
        .has_predicted(request.prediction, &request.account)
        .await
        .map_err(map_prediction_err)?;
    Ok(Json(voted))
}
#[debug_handler]
async fn request_decrypt(
    State(state): State<SharedState>,
    Json(request): Json<DecryptRequest>,
) -> Result<Json<Tallies<u32>>, ErrorReply> {
    let backend = state.read().await;
    debug!(
        "Decryption of prediction {} requested by {}",
        request.prediction, request.account
    );
    let totals = backend
        .request_decrypt(&request)
        .await
        .map_err(map_prediction_err)?;
    Ok(Json(totals))
}
async fn get_service_info(State(state): State<SharedState>) -> Json<ServiceInfo> {
    let backend = state.read().await;
    Json(backend.service_info())
}
async fn get_login_challenge(
    State(state): State<SharedState>,
    Json(user): Json<UserPubKey>,
) -> Result<Json<String>, ErrorReply> {
    let mut backend = state.write().await;
    let challenge = backend
        .create_login_challenge(user)
        .await
        .map_err(map_prediction_err)?;
    Ok(Json(challenge))
}
async fn try_login(
    State(state): State<SharedState>,
    Json(request): Json<LoginRequest>,
) -> Result<(), ErrorReply> {
    let mut backend = state.write().await;
    backend
        .try_login(request.user, request.sig, request.challenge)
        .await
        .map_err(map_prediction_err)?;
    debug!("User {} logged in", request.user);
    Ok(())
}
async fn check_login(
    State(state): State<SharedState>,
    Json(request): Json<AccessRequest>,
) -> Result<(), ErrorReply> {
    let backend = state.read().await;
    backend
        .check_access(&request)
        .await
        .map_err(map_prediction_err)?;
    Ok(())
}

#[derive(Parser)]
struct Args {
    /// Configuration file, `pronostico.toml` is used if present
    #[arg(short, long)]
    config: Option<String>,
    #[arg(short, long)]
    port: Option<u16>,
    #[arg(short, long)]
    test: bool,
    #[arg(short, long)]
    db: Option<String>,
    /// URL of the ciphertext engine relayer
    #[arg(short, long)]
    relayer: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Args::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        settings.port = port;
    }
    if cli.test {
        settings.test = true;
    }
    if cli.db.is_some() {
        settings.db = cli.db;
    }
    if cli.relayer.is_some() {
        settings.relayer_url = cli.relayer;
    }
    Builder::default()
        .filter_level(LevelFilter::from_str(&settings.log_level).unwrap_or(LevelFilter::Debug))
        .write_style(WriteStyle::Always)
        .init();
    let (_port, handle) = run_server(settings).await?;
    handle.await?;
    Ok(())
}

async fn run_server(settings: Settings) -> Result<(u16, JoinHandle<()>)> {
    let db: Box<dyn DB + Send + Sync> = match &settings.db {
        Some(conn) => Box::new(SQLite::new(Some(conn.clone())).await?),
        None => Box::new(MemoryDB::default()),
    };
    let engine: SharedEngine = match &settings.relayer_url {
        Some(url) => Arc::new(Box::new(RelayerEngine::new(
            url.clone(),
            settings.relayer_timeout(),
        )?)),
        None => Arc::new(Box::new(TestCiphertextEngine::default())),
    };
    let state = Arc::new(RwLock::new(Pronostico::new(db, engine.clone(), &settings)));
    let mut app: Router<SharedState> = Router::new()
        .route("/create_prediction", post(create_prediction))
        .route("/submit_prediction", post(submit_prediction))
        .route("/close_prediction", post(close_prediction))
        .route("/get_prediction", post(get_prediction))
        .route("/get_prediction_count", get(get_prediction_count))
        .route("/has_predicted", post(has_predicted))
        .route("/request_decrypt", post(request_decrypt))
        .route("/get_service_info", get(get_service_info))
        .route("/get_login_challenge", post(get_login_challenge))
        .route("/try_login", post(try_login))
        .route("/check_login", post(check_login));
    if settings.relayer_url.is_none() {
        info!("No relayer configured, serving development vote encryption under /engine");
        app = app.nest("/engine", relayer::service::encryption_router(engine));
    }
    let app = app.with_state(state);

    let addr = SocketAddr::from_str(&format!("{}:{}", settings.host, settings.port))?;
    let server = axum::Server::try_bind(&addr)?.serve(app.into_make_service());
    let port = server.local_addr().port();
    info!("Listening on {}", server.local_addr());
    let handle = tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("Server stopped: {}", e);
        }
    });
    Ok((port, handle))
}
