use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::client::RelayerClient;
use crate::api::*;
use crate::engine::{CiphertextEngine, ProofCheck};

/// [`CiphertextEngine`] served by a relayer over HTTP.
pub struct RelayerEngine {
    client: RelayerClient,
}
impl RelayerEngine {
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: RelayerClient::new(url, timeout)?,
        })
    }
}
#[async_trait]
impl CiphertextEngine for RelayerEngine {
    async fn encrypt_one_hot(
        &self,
        outcome: Outcome,
        context: &InputContext,
    ) -> Result<EncryptedVote> {
        let request = EncryptOneHotRequest {
            outcome,
            context: context.clone(),
        };
        self.client
            .post("/encrypt_one_hot", request)
            .await
            .context("Relayer couldn't encrypt vote")
    }
    async fn verify_input(
        &self,
        vote: &EncryptedVote,
        context: &InputContext,
    ) -> Result<ProofCheck> {
        let request = VerifyInputRequest {
            vote: vote.clone(),
            context: context.clone(),
        };
        self.client
            .post("/verify_input", request)
            .await
            .context("Relayer couldn't verify input proof")
    }
    async fn add(&self, lhs: &CipherHandle, rhs: &CipherHandle) -> Result<CipherHandle> {
        let request = AddRequest {
            lhs: *lhs,
            rhs: *rhs,
        };
        self.client
            .post("/add", request)
            .await
            .with_context(|| format!("Relayer couldn't add {} and {}", lhs, rhs))
    }
    async fn allow(&self, handle: &CipherHandle, account: &UserPubKey) -> Result<()> {
        let request = AllowRequest {
            handle: *handle,
            account: *account,
        };
        self.client
            .post("/allow", request)
            .await
            .with_context(|| format!("Relayer couldn't grant {} on {}", account, handle))
    }
    async fn is_allowed(&self, handle: &CipherHandle, account: &UserPubKey) -> Result<bool> {
        let request = AllowRequest {
            handle: *handle,
            account: *account,
        };
        self.client.post("/is_allowed", request).await
    }
    async fn decrypt(
        &self,
        handles: &[CipherHandle],
        public_key: &UserPubKey,
    ) -> Result<HashMap<CipherHandle, u32>> {
        let request = EngineDecryptRequest {
            handles: handles.to_vec(),
            public_key: *public_key,
        };
        self.client
            .post("/decrypt", request)
            .await
            .context("Relayer couldn't decrypt")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::{SharedEngine, TestCiphertextEngine};
    use crate::relayer::service;
    use axum::Router;
    use secp256k1::{generate_keypair, rand};
    use std::sync::Arc;

    async fn serve(engine: SharedEngine) -> String {
        let app: Router = service::router(engine);
        let server = axum::Server::bind(&"127.0.0.1:0".parse().unwrap())
            .serve(app.into_make_service());
        let url = format!("http://{}", server.local_addr());
        tokio::spawn(async move {
            server.await.unwrap();
        });
        url
    }

    #[tokio::test]
    async fn round_trip_through_relayer() {
        let url = serve(Arc::new(Box::new(TestCiphertextEngine::default()))).await;
        let engine = RelayerEngine::new(url, Duration::from_secs(5)).unwrap();
        let (_, account) = generate_keypair(&mut rand::thread_rng());
        let context = InputContext {
            service: "pronostico".into(),
            prediction: 0,
            account,
        };

        let vote = engine
            .encrypt_one_hot(Outcome::Away, &context)
            .await
            .unwrap();
        assert_eq!(
            engine.verify_input(&vote, &context).await.unwrap(),
            ProofCheck::Valid
        );
        let total = engine
            .add(&CipherHandle::ZERO, &vote.handles.away)
            .await
            .unwrap();
        assert!(!engine.is_allowed(&total, &account).await.unwrap());
        engine.allow(&total, &account).await.unwrap();
        assert!(engine.is_allowed(&total, &account).await.unwrap());

        let plain = engine
            .decrypt(&[total, vote.handles.home], &account)
            .await
            .unwrap();
        assert_eq!(plain[&total], 1);
        assert_eq!(plain[&vote.handles.home], 0);

        engine
            .decrypt(&[CipherHandle([9; 32])], &account)
            .await
            .unwrap_err();
    }
}
