//! Gatekeeper for revealing tallies.
//!
//! Plaintext totals only leave the ciphertext engine through [`DecryptionAuthorizer::request_decrypt`],
//! which requires the prediction to be closed, the requested handles to be its current tallies,
//! a valid signed permit, and an engine-side grant for the requesting account.

use crate::api::*;
use crate::engine::SharedEngine;
use crate::error::PredictionError;
use anyhow::{bail, Result};
use chrono::Utc;
use log::{debug, info};
use secp256k1::ecdsa::Signature;
use std::time::Duration;

/// Checks that `signature` is `account`'s signature over `permit` in `domain`.
pub trait PermitVerifier {
    fn verify(
        &self,
        permit: &DecryptPermit,
        domain: &PermitDomain,
        signature: &Signature,
        account: &UserPubKey,
    ) -> Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EcdsaPermitVerifier;
impl PermitVerifier for EcdsaPermitVerifier {
    fn verify(
        &self,
        permit: &DecryptPermit,
        domain: &PermitDomain,
        signature: &Signature,
        account: &UserPubKey,
    ) -> Result<()> {
        signature.verify(&permit.message(domain), account)?;
        Ok(())
    }
}

pub struct DecryptionAuthorizer {
    engine: SharedEngine,
    verifier: Box<dyn PermitVerifier + Send + Sync>,
    domain: PermitDomain,
    max_permit_days: u32,
    timeout: Duration,
}
impl DecryptionAuthorizer {
    pub fn new(
        engine: SharedEngine,
        service: impl Into<String>,
        max_permit_days: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            engine,
            verifier: Box::new(EcdsaPermitVerifier),
            domain: PermitDomain::new(service),
            max_permit_days,
            timeout,
        }
    }
    pub fn domain(&self) -> &PermitDomain {
        &self.domain
    }
    pub fn max_permit_days(&self) -> u32 {
        self.max_permit_days
    }

    /// Lets `account` decrypt each of `tallies`.
    pub(crate) async fn grant(
        &self,
        prediction: PredictionId,
        tallies: &Tallies<CipherHandle>,
        account: &UserPubKey,
    ) -> Result<(), PredictionError> {
        for handle in tallies.to_array() {
            if handle.is_zero() {
                return Err(PredictionError::Engine(anyhow::anyhow!(
                    "Refusing to grant the shared zero handle of prediction {}",
                    prediction
                )));
            }
            self.engine
                .allow(&handle, account)
                .await
                .map_err(PredictionError::Engine)?;
        }
        info!(
            "Granted decryption of prediction {} tallies to {}",
            prediction, account
        );
        Ok(())
    }

    fn check_permit(&self, request: &DecryptRequest) -> Result<()> {
        let permit = &request.permit;
        if !permit.services.contains(&self.domain.service) {
            bail!("Permit does not cover service {}", self.domain.service)
        }
        if permit.window.duration_days == 0 || permit.window.duration_days > self.max_permit_days
        {
            bail!(
                "Permit validity of {} days is outside 1..={}",
                permit.window.duration_days,
                self.max_permit_days
            )
        }
        if !permit.window.contains(Utc::now()) {
            match permit.window.end() {
                Some(end) => bail!(
                    "Permit is only valid from {} until {}",
                    permit.window.start,
                    end
                ),
                None => bail!(
                    "Permit validity from {} runs past the last representable date",
                    permit.window.start
                ),
            }
        }
        self.verifier
            .verify(permit, &self.domain, &request.signature, &request.account)
            .map_err(|e| anyhow::anyhow!("Invalid permit signature: {}", e))
    }

    /// Returns the plaintext totals of a closed prediction to a permitted requester.
    pub async fn request_decrypt(
        &self,
        prediction: &Prediction,
        request: &DecryptRequest,
    ) -> Result<Tallies<u32>, PredictionError> {
        if prediction.is_active() {
            return Err(PredictionError::PredictionStillActive(prediction.id));
        }
        if request.handles != prediction.tallies {
            return Err(PredictionError::DecryptionDenied(format!(
                "Handles are not the tallies of prediction {}",
                prediction.id
            )));
        }
        self.check_permit(request).map_err(|e| {
            debug!("Rejected permit of {}: {:#}", request.account, e);
            PredictionError::DecryptionDenied(format!("{:#}", e))
        })?;
        for handle in prediction.tallies.to_array() {
            let allowed = self
                .engine
                .is_allowed(&handle, &request.account)
                .await
                .map_err(PredictionError::Engine)?;
            if !allowed {
                return Err(PredictionError::DecryptionDenied(format!(
                    "Account {} may not decrypt prediction {}",
                    request.account, prediction.id
                )));
            }
        }
        let handles = prediction.tallies.to_array();
        let plaintexts = tokio::time::timeout(
            self.timeout,
            self.engine.decrypt(&handles, &request.permit.public_key),
        )
        .await
        .map_err(|_| PredictionError::DecryptTimeout(self.timeout.as_secs()))?
        .map_err(PredictionError::Engine)?;
        let mut totals = Tallies::<u32>::default();
        for (total, handle) in [
            (&mut totals.home, handles[0]),
            (&mut totals.away, handles[1]),
            (&mut totals.draw, handles[2]),
        ] {
            *total = *plaintexts.get(&handle).ok_or_else(|| {
                PredictionError::Engine(anyhow::anyhow!("Engine did not decrypt {}", handle))
            })?;
        }
        info!(
            "Revealed totals of prediction {} to {}",
            prediction.id, request.account
        );
        Ok(totals)
    }
}
