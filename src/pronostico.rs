use crate::api::*;
use crate::authorizer::DecryptionAuthorizer;
use crate::config::{GrantPolicy, Settings};
use crate::db::DB;
use crate::engine::{ProofCheck, SharedEngine};
use crate::error::PredictionError;
use chrono::{Duration, Utc};
use log::{debug, info, trace};
use secp256k1::ecdsa::Signature;
use secp256k1::hashes::sha256::Hash;
use secp256k1::rand::distributions::Alphanumeric;
use secp256k1::rand::Rng;
use secp256k1::{rand, Message};
use std::sync::Arc;

type Result<T> = std::result::Result<T, PredictionError>;

/// Unwraps a state violation reported by storage, anything else is a storage failure.
fn storage(e: anyhow::Error) -> PredictionError {
    match e.downcast::<PredictionError>() {
        Ok(e) => e,
        Err(e) => PredictionError::Storage(e),
    }
}

pub struct Pronostico {
    db: Arc<Box<dyn DB + Send + Sync>>,
    engine: SharedEngine,
    authorizer: DecryptionAuthorizer,
    service: String,
    grant_policy: GrantPolicy,
    test: bool,
}
impl Pronostico {
    pub fn new(db: Box<dyn DB + Send + Sync>, engine: SharedEngine, settings: &Settings) -> Self {
        let authorizer = DecryptionAuthorizer::new(
            engine.clone(),
            settings.service_id.clone(),
            settings.max_permit_days,
            settings.decrypt_timeout(),
        );
        Self {
            db: Arc::new(db),
            engine,
            authorizer,
            service: settings.service_id.clone(),
            grant_policy: settings.grant_policy,
            test: settings.test,
        }
    }

    pub async fn create_prediction(
        &mut self,
        title: String,
        home_team: String,
        away_team: String,
        creator: UserPubKey,
    ) -> Result<PredictionId> {
        let id = self
            .db
            .add_prediction(title.clone(), home_team.clone(), away_team.clone(), creator)
            .await
            .map_err(storage)?;
        info!(
            "PredictionCreated {{ id: {}, creator: {}, title: {:?}, home_team: {:?}, away_team: {:?} }}",
            id, creator, title, home_team, away_team
        );
        Ok(id)
    }

    /// Adds an encrypted one-hot vote by `caller` to the tallies of `prediction`.
    pub async fn submit_prediction(
        &mut self,
        prediction: PredictionId,
        vote: EncryptedVote,
        caller: UserPubKey,
    ) -> Result<()> {
        let current = self.get_prediction(prediction).await?;
        if !current.is_active() {
            return Err(PredictionError::PredictionInactive(prediction));
        }
        if self
            .db
            .has_voted(prediction, &caller)
            .await
            .map_err(storage)?
        {
            return Err(PredictionError::AlreadyPredicted(prediction, caller));
        }
        let context = self.input_context(prediction, caller);
        if let ProofCheck::Invalid(reason) = self
            .engine
            .verify_input(&vote, &context)
            .await
            .map_err(PredictionError::Engine)?
        {
            debug!(
                "Rejected vote of {} on prediction {}: {}",
                caller, prediction, reason
            );
            return Err(PredictionError::InvalidProof(reason));
        }
        let tallies = Tallies {
            home: self.add(&current.tallies.home, &vote.handles.home).await?,
            away: self.add(&current.tallies.away, &vote.handles.away).await?,
            draw: self.add(&current.tallies.draw, &vote.handles.draw).await?,
        };
        self.db
            .record_vote(prediction, &caller, tallies)
            .await
            .map_err(storage)?;
        info!(
            "PredictionVoted {{ id: {}, voter: {} }}",
            prediction, caller
        );
        Ok(())
    }
    async fn add(&self, lhs: &CipherHandle, rhs: &CipherHandle) -> Result<CipherHandle> {
        self.engine
            .add(lhs, rhs)
            .await
            .map_err(PredictionError::Engine)
    }

    /// Ends voting. The closer, and the creator if so configured, may then decrypt the totals.
    ///
    /// The close is stored before any grant is made, so an engine failure while granting leaves
    /// a closed prediction nobody may decrypt yet, never an active one with grants.
    pub async fn close_prediction(
        &mut self,
        prediction: PredictionId,
        caller: UserPubKey,
    ) -> Result<()> {
        let current = self.get_prediction(prediction).await?;
        if !current.is_active() {
            return Err(PredictionError::PredictionInactive(prediction));
        }
        let tallies = Tallies {
            home: self.own_handle(current.tallies.home).await?,
            away: self.own_handle(current.tallies.away).await?,
            draw: self.own_handle(current.tallies.draw).await?,
        };
        self.db
            .close_prediction(prediction, tallies)
            .await
            .map_err(storage)?;
        info!(
            "PredictionClosed {{ id: {}, closer: {} }}",
            prediction, caller
        );
        self.authorizer.grant(prediction, &tallies, &caller).await?;
        if self.grant_policy == GrantPolicy::CloserAndCreator && current.creator != caller {
            self.authorizer
                .grant(prediction, &tallies, &current.creator)
                .await?;
        }
        Ok(())
    }
    /// Untouched tallies all share the zero handle, grants on it would reach every other
    /// prediction without votes.
    async fn own_handle(&self, handle: CipherHandle) -> Result<CipherHandle> {
        if handle.is_zero() {
            self.add(&CipherHandle::ZERO, &CipherHandle::ZERO).await
        } else {
            Ok(handle)
        }
    }

    pub async fn get_prediction_count(&self) -> Result<u64> {
        self.db.get_prediction_count().await.map_err(storage)
    }
    pub async fn get_prediction(&self, prediction: PredictionId) -> Result<Prediction> {
        self.db
            .get_prediction(prediction)
            .await
            .map_err(storage)?
            .ok_or(PredictionError::InvalidPrediction(prediction))
    }
    pub async fn has_predicted(
        &self,
        prediction: PredictionId,
        account: &UserPubKey,
    ) -> Result<bool> {
        self.get_prediction(prediction).await?;
        self.db
            .has_voted(prediction, account)
            .await
            .map_err(storage)
    }
    pub async fn request_decrypt(&self, request: &DecryptRequest) -> Result<Tallies<u32>> {
        let prediction = self.get_prediction(request.prediction).await?;
        self.authorizer.request_decrypt(&prediction, request).await
    }

    /// What a vote by `account` on `prediction` must be proven for.
    pub fn input_context(&self, prediction: PredictionId, account: UserPubKey) -> InputContext {
        InputContext {
            service: self.service.clone(),
            prediction,
            account,
        }
    }
    pub fn service_info(&self) -> ServiceInfo {
        ServiceInfo {
            domain: self.authorizer.domain().clone(),
            max_permit_days: self.authorizer.max_permit_days(),
        }
    }

    pub async fn create_login_challenge(&mut self, user: UserPubKey) -> Result<String> {
        let challenge: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(30)
            .map(char::from)
            .collect();
        trace!("Generated login challenge {}", challenge);
        self.db
            .create_session(user, challenge.clone())
            .await
            .map_err(storage)?;
        Ok(challenge)
    }
    pub async fn try_login(
        &mut self,
        user: UserPubKey,
        sig: Signature,
        challenge: String,
    ) -> Result<()> {
        sig.verify(
            &Message::from_hashed_data::<Hash>(challenge.as_bytes()),
            &user,
        )
        .map_err(|e| PredictionError::Unauthorized(format!("Invalid login signature: {}", e)))?;
        self.db
            .update_access_token(user, sig, challenge)
            .await
            .map_err(|e| PredictionError::Unauthorized(format!("{:#}", e)))?;
        Ok(())
    }
    /// Returns the authenticated account.
    pub async fn check_access(&self, access: &AccessRequest) -> Result<UserPubKey> {
        if self.test {
            return Ok(access.user);
        }
        let (db_sig, last_access) = self
            .db
            .get_last_access(access.user, access.challenge.clone())
            .await
            .map_err(|e| {
                debug!("No session for user {}: {:#}", access.user, e);
                PredictionError::Unauthorized(format!("No session for user {}", access.user))
            })?;
        if access.sig != db_sig {
            debug!(
                "User {} tried to access with invalid access token",
                access.user
            );
            return Err(PredictionError::Unauthorized(format!(
                "Access token for user {} is invalid",
                access.user
            )));
        }
        if last_access < Utc::now() - Duration::days(7) {
            debug!(
                "User {} tried to access after more than 7 days",
                access.user
            );
            return Err(PredictionError::Unauthorized(
                "Last access was more than 7 days ago".into(),
            ));
        }
        Ok(access.user)
    }
}
