use secp256k1::ecdsa::Signature;
use serde::{Deserialize, Serialize};

use super::*;

// Requests
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AccessRequest {
    pub user: UserPubKey,
    pub challenge: String,
    pub sig: Signature,
}
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PostRequest<T> {
    pub access: AccessRequest,
    pub data: T,
}
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoginRequest {
    pub user: UserPubKey,
    pub challenge: String,
    pub sig: Signature,
}
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CreatePredictionRequest {
    pub title: String,
    pub home_team: String,
    pub away_team: String,
}
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SubmitPredictionRequest {
    pub prediction: PredictionId,
    pub vote: EncryptedVote,
}
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PredictionRequest {
    pub prediction: PredictionId,
}
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HasPredictedRequest {
    pub prediction: PredictionId,
    pub account: UserPubKey,
}
/// Everything needed to reveal the totals of a closed prediction.
///
/// `signature` is the account's signature over `permit`, see [`DecryptPermit::message`].
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DecryptRequest {
    pub prediction: PredictionId,
    pub handles: Tallies<CipherHandle>,
    pub account: UserPubKey,
    pub permit: DecryptPermit,
    pub signature: Signature,
}

// Ciphertext engine service
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EncryptOneHotRequest {
    pub outcome: Outcome,
    pub context: InputContext,
}
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct VerifyInputRequest {
    pub vote: EncryptedVote,
    pub context: InputContext,
}
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AddRequest {
    pub lhs: CipherHandle,
    pub rhs: CipherHandle,
}
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AllowRequest {
    pub handle: CipherHandle,
    pub account: UserPubKey,
}
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EngineDecryptRequest {
    pub handles: Vec<CipherHandle>,
    pub public_key: UserPubKey,
}
