use crate::api::{CipherHandle, EncryptedVote, InputContext, Outcome, Tallies, UserPubKey};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use secp256k1::rand::{self, Rng};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProofCheck {
    Valid,
    Invalid(String),
}

/// The homomorphic encryption capability the service is built on.
///
/// Implementations never hand plaintexts to the caller except through [`decrypt`], and the
/// caller is expected to have checked the requester's permit before calling it.
///
/// [`decrypt`]: CiphertextEngine::decrypt
#[async_trait]
pub trait CiphertextEngine {
    /// Encrypts a one-hot selection for `outcome` and proves it for `context`.
    async fn encrypt_one_hot(&self, outcome: Outcome, context: &InputContext)
        -> Result<EncryptedVote>;
    async fn verify_input(&self, vote: &EncryptedVote, context: &InputContext)
        -> Result<ProofCheck>;
    async fn add(&self, lhs: &CipherHandle, rhs: &CipherHandle) -> Result<CipherHandle>;
    async fn allow(&self, handle: &CipherHandle, account: &UserPubKey) -> Result<()>;
    async fn is_allowed(&self, handle: &CipherHandle, account: &UserPubKey) -> Result<bool>;
    /// Decrypts `handles` for the holder of `public_key`.
    async fn decrypt(
        &self,
        handles: &[CipherHandle],
        public_key: &UserPubKey,
    ) -> Result<HashMap<CipherHandle, u32>>;
}

pub type SharedEngine = Arc<Box<dyn CiphertextEngine + Send + Sync>>;

/// In-process stand-in for a real engine: plaintexts are kept in memory behind random handles.
#[derive(Debug, Default, Clone)]
pub struct TestCiphertextEngine {
    state: Arc<Mutex<EngineState>>,
}
#[derive(Debug, Default)]
struct EngineState {
    plaintexts: HashMap<CipherHandle, u32>,
    acl: HashMap<CipherHandle, HashSet<UserPubKey>>,
    proofs: HashMap<Vec<u8>, IssuedProof>,
}
#[derive(Debug)]
struct IssuedProof {
    context: InputContext,
    handles: Tallies<CipherHandle>,
    one_hot: bool,
    used: bool,
}
impl EngineState {
    fn plaintext(&self, handle: &CipherHandle) -> Result<u32> {
        if handle.is_zero() {
            return Ok(0);
        }
        self.plaintexts
            .get(handle)
            .copied()
            .ok_or_else(|| anyhow!("Unknown ciphertext handle {}", handle))
    }
    fn store(&mut self, value: u32) -> CipherHandle {
        loop {
            let handle = CipherHandle(rand::thread_rng().gen());
            if !handle.is_zero() && !self.plaintexts.contains_key(&handle) {
                self.plaintexts.insert(handle, value);
                return handle;
            }
        }
    }
}
impl TestCiphertextEngine {
    fn state(&self) -> Result<MutexGuard<'_, EngineState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("Ciphertext engine state is poisoned"))
    }
    /// Encrypts arbitrary values. The proof only passes verification if they are one-hot.
    pub fn encrypt_values(
        &self,
        values: Tallies<u32>,
        context: &InputContext,
    ) -> Result<EncryptedVote> {
        let mut state = self.state()?;
        let handles = values.map(|value| state.store(value));
        let proof = rand::thread_rng().gen::<[u8; 32]>().to_vec();
        state.proofs.insert(
            proof.clone(),
            IssuedProof {
                context: context.clone(),
                handles,
                one_hot: values.is_one_hot(),
                used: false,
            },
        );
        Ok(EncryptedVote { handles, proof })
    }
}
#[async_trait]
impl CiphertextEngine for TestCiphertextEngine {
    async fn encrypt_one_hot(
        &self,
        outcome: Outcome,
        context: &InputContext,
    ) -> Result<EncryptedVote> {
        self.encrypt_values(Tallies::one_hot(outcome), context)
    }
    async fn verify_input(
        &self,
        vote: &EncryptedVote,
        context: &InputContext,
    ) -> Result<ProofCheck> {
        let mut state = self.state()?;
        let Some(issued) = state.proofs.get_mut(&vote.proof) else {
            return Ok(ProofCheck::Invalid("Unknown input proof".into()));
        };
        if issued.used {
            return Ok(ProofCheck::Invalid("Input proof was already used".into()));
        }
        if issued.context != *context {
            return Ok(ProofCheck::Invalid(
                "Input proof was made for another context".into(),
            ));
        }
        if issued.handles != vote.handles {
            return Ok(ProofCheck::Invalid(
                "Input proof does not cover these ciphertexts".into(),
            ));
        }
        if !issued.one_hot {
            return Ok(ProofCheck::Invalid(
                "Ciphertexts do not encode a single selection".into(),
            ));
        }
        issued.used = true;
        Ok(ProofCheck::Valid)
    }
    async fn add(&self, lhs: &CipherHandle, rhs: &CipherHandle) -> Result<CipherHandle> {
        let mut state = self.state()?;
        let sum = state.plaintext(lhs)?.wrapping_add(state.plaintext(rhs)?);
        Ok(state.store(sum))
    }
    async fn allow(&self, handle: &CipherHandle, account: &UserPubKey) -> Result<()> {
        let mut state = self.state()?;
        state.plaintext(handle)?;
        state.acl.entry(*handle).or_default().insert(*account);
        Ok(())
    }
    async fn is_allowed(&self, handle: &CipherHandle, account: &UserPubKey) -> Result<bool> {
        let state = self.state()?;
        Ok(state
            .acl
            .get(handle)
            .map_or(false, |accounts| accounts.contains(account)))
    }
    async fn decrypt(
        &self,
        handles: &[CipherHandle],
        _public_key: &UserPubKey,
    ) -> Result<HashMap<CipherHandle, u32>> {
        let state = self.state()?;
        let mut plaintexts = HashMap::new();
        for handle in handles {
            plaintexts.insert(*handle, state.plaintext(handle)?);
        }
        Ok(plaintexts)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use secp256k1::generate_keypair;

    fn context(prediction: u64) -> InputContext {
        let (_, account) = generate_keypair(&mut rand::thread_rng());
        InputContext {
            service: "pronostico".into(),
            prediction,
            account,
        }
    }

    #[tokio::test]
    async fn adds_without_revealing() {
        let engine = TestCiphertextEngine::default();
        let (_, viewer) = generate_keypair(&mut rand::thread_rng());
        let ctx = context(0);
        let vote = engine.encrypt_one_hot(Outcome::Home, &ctx).await.unwrap();

        let once = engine
            .add(&CipherHandle::ZERO, &vote.handles.home)
            .await
            .unwrap();
        let twice = engine.add(&once, &vote.handles.home).await.unwrap();
        assert_ne!(once, vote.handles.home);
        assert_ne!(once, twice);

        let plain = engine
            .decrypt(&[CipherHandle::ZERO, once, twice], &viewer)
            .await
            .unwrap();
        assert_eq!(plain[&CipherHandle::ZERO], 0);
        assert_eq!(plain[&once], 1);
        assert_eq!(plain[&twice], 2);
    }

    #[tokio::test]
    async fn proofs_are_single_use_and_bound() {
        let engine = TestCiphertextEngine::default();
        let ctx = context(3);
        let vote = engine.encrypt_one_hot(Outcome::Draw, &ctx).await.unwrap();

        assert!(matches!(
            engine.verify_input(&vote, &context(3)).await.unwrap(),
            ProofCheck::Invalid(_)
        ));
        let mut swapped = vote.clone();
        swapped.handles.home = vote.handles.draw;
        swapped.handles.draw = vote.handles.home;
        assert!(matches!(
            engine.verify_input(&swapped, &ctx).await.unwrap(),
            ProofCheck::Invalid(_)
        ));
        assert_eq!(
            engine.verify_input(&vote, &ctx).await.unwrap(),
            ProofCheck::Valid
        );
        assert!(matches!(
            engine.verify_input(&vote, &ctx).await.unwrap(),
            ProofCheck::Invalid(_)
        ));
    }

    #[tokio::test]
    async fn rejects_non_one_hot_inputs() {
        let engine = TestCiphertextEngine::default();
        let ctx = context(0);
        let vote = engine
            .encrypt_values(
                Tallies {
                    home: 1,
                    away: 1,
                    draw: 0,
                },
                &ctx,
            )
            .unwrap();
        assert_eq!(
            engine.verify_input(&vote, &ctx).await.unwrap(),
            ProofCheck::Invalid("Ciphertexts do not encode a single selection".into())
        );
    }

    #[tokio::test]
    async fn access_list() {
        let engine = TestCiphertextEngine::default();
        let ctx = context(0);
        let (_, other) = generate_keypair(&mut rand::thread_rng());
        let vote = engine.encrypt_one_hot(Outcome::Away, &ctx).await.unwrap();

        assert!(!engine
            .is_allowed(&vote.handles.away, &ctx.account)
            .await
            .unwrap());
        engine.allow(&vote.handles.away, &ctx.account).await.unwrap();
        assert!(engine
            .is_allowed(&vote.handles.away, &ctx.account)
            .await
            .unwrap());
        assert!(!engine.is_allowed(&vote.handles.away, &other).await.unwrap());

        let unknown = CipherHandle([7; 32]);
        engine.allow(&unknown, &other).await.unwrap_err();
        engine.decrypt(&[unknown], &other).await.unwrap_err();
    }
}
