use std::time::Duration;

use anyhow::Result;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Serialize};

use crate::client::bail_if_err;

#[derive(Debug, Clone)]
pub struct RelayerClient {
    client: Client,
    pub url: String,
}

impl RelayerClient {
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
        })
    }
    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &'static str,
        request: impl Serialize,
    ) -> Result<T> {
        let response = self
            .client
            .post(self.url.clone() + path)
            .json(&request)
            .send()
            .await?;
        let response = bail_if_err(response, StatusCode::OK).await?;
        Ok(response.json::<T>().await?)
    }
}
