use anyhow::{bail, Result};
use reqwest::{Response, StatusCode};
use secp256k1::{hashes::sha256::Hash, Message, SecretKey};
use serde::Serialize;

use crate::api::*;

/// Returns `response` if it carries `expected_code`, its error otherwise.
///
/// Error bodies in the service's JSON form become an [`ApiError`].
pub async fn bail_if_err(response: Response, expected_code: StatusCode) -> Result<Response> {
    if response.status() == expected_code {
        return Ok(response);
    }
    let status = response.status();
    let text = response.text().await?;
    match serde_json::from_str::<ErrorResponse>(&text) {
        Ok(error) => Err(ApiError {
            status: status.as_u16(),
            kind: error.kind,
            message: error.message,
        }
        .into()),
        Err(_) => bail!("{}: {}", status, text),
    }
}

#[derive(Debug, Clone)]
pub struct Client {
    url: String,
    client: reqwest::Client,
}
impl Client {
    pub fn new(url: String) -> Self {
        let client = reqwest::Client::new();
        Self { url, client }
    }
    pub fn url(&self) -> &str {
        &self.url
    }
    async fn post(
        &self,
        path: &'static str,
        request: impl Serialize,
        expected_code: StatusCode,
    ) -> Result<Response> {
        let response = self
            .client
            .post(self.url.clone() + path)
            .json(&request)
            .send()
            .await?;
        bail_if_err(response, expected_code).await
    }
    async fn get(&self, path: &'static str, expected_code: StatusCode) -> Result<Response> {
        let response = self.client.get(self.url.clone() + path).send().await?;
        bail_if_err(response, expected_code).await
    }

    pub async fn create_prediction(
        &self,
        request: CreatePredictionRequest,
        access: AccessRequest,
    ) -> Result<PredictionId> {
        let response = self
            .post(
                "/create_prediction",
                PostRequest {
                    data: request,
                    access,
                },
                StatusCode::CREATED,
            )
            .await?;
        Ok(response.json().await?)
    }
    pub async fn submit_prediction(
        &self,
        request: SubmitPredictionRequest,
        access: AccessRequest,
    ) -> Result<()> {
        self.post(
            "/submit_prediction",
            PostRequest {
                data: request,
                access,
            },
            StatusCode::OK,
        )
        .await?;
        Ok(())
    }
    pub async fn close_prediction(
        &self,
        prediction: PredictionId,
        access: AccessRequest,
    ) -> Result<()> {
        self.post(
            "/close_prediction",
            PostRequest {
                data: PredictionRequest { prediction },
                access,
            },
            StatusCode::OK,
        )
        .await?;
        Ok(())
    }
    pub async fn get_prediction(&self, prediction: PredictionId) -> Result<Prediction> {
        let response = self
            .post(
                "/get_prediction",
                PredictionRequest { prediction },
                StatusCode::OK,
            )
            .await?;
        Ok(response.json().await?)
    }
    pub async fn get_prediction_count(&self) -> Result<u64> {
        let response = self.get("/get_prediction_count", StatusCode::OK).await?;
        Ok(response.json().await?)
    }
    pub async fn has_predicted(
        &self,
        prediction: PredictionId,
        account: UserPubKey,
    ) -> Result<bool> {
        let response = self
            .post(
                "/has_predicted",
                HasPredictedRequest {
                    prediction,
                    account,
                },
                StatusCode::OK,
            )
            .await?;
        Ok(response.json().await?)
    }
    pub async fn request_decrypt(&self, request: DecryptRequest) -> Result<Tallies<u32>> {
        let response = self
            .post("/request_decrypt", request, StatusCode::OK)
            .await?;
        Ok(response.json().await?)
    }
    pub async fn get_service_info(&self) -> Result<ServiceInfo> {
        let response = self.get("/get_service_info", StatusCode::OK).await?;
        Ok(response.json().await?)
    }
    /// Encrypts a vote with the server's development engine.
    pub async fn encrypt_vote(
        &self,
        outcome: Outcome,
        context: InputContext,
    ) -> Result<EncryptedVote> {
        let response = self
            .post(
                "/engine/encrypt_one_hot",
                EncryptOneHotRequest { outcome, context },
                StatusCode::OK,
            )
            .await?;
        Ok(response.json().await?)
    }

    pub async fn create_login_challenge(&self, user: UserPubKey) -> Result<String> {
        let response = self
            .post("/get_login_challenge", user, StatusCode::OK)
            .await?;
        Ok(response.json().await?)
    }
    pub async fn try_login(&self, request: LoginRequest) -> Result<()> {
        self.post("/try_login", request, StatusCode::OK).await?;
        Ok(())
    }
    pub async fn check_login(&self, access: AccessRequest) -> Result<()> {
        self.post("/check_login", access, StatusCode::OK).await?;
        Ok(())
    }
    /// Runs the challenge handshake and returns the resulting access token.
    pub async fn login(&self, secret_key: &SecretKey) -> Result<AccessRequest> {
        let user = UserPubKey::from_secret_key_global(secret_key);
        let challenge = self.create_login_challenge(user).await?;
        let sig = secret_key.sign_ecdsa(Message::from_hashed_data::<Hash>(challenge.as_bytes()));
        self.try_login(LoginRequest {
            user,
            challenge: challenge.clone(),
            sig,
        })
        .await?;
        Ok(AccessRequest {
            user,
            challenge,
            sig,
        })
    }
}
