//! Client for the remote tunnel API.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

pub const DEFAULT_API_URL: &str = "https://api.stellarfrp.top";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct GetUserTunnelRequest<'a> {
    token: &'a str,
}

#[derive(Deserialize, Debug)]
struct GetUserTunnelResponse {
    #[serde(default)]
    tunnel: Option<BTreeMap<String, serde_json::Value>>,
}

/// Fetched tunnels by name. `None` marks an entry without a usable config
/// payload; it only matters if that tunnel is requested.
pub type FetchedTunnels = BTreeMap<String, Option<String>>;

pub struct TunnelApi {
    client: reqwest::Client,
    base_url: String,
}

impl TunnelApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Fetch every tunnel of the account behind `token`, as tunnel name to
    /// raw client config text.
    pub async fn fetch_tunnels(&self, token: &str) -> Result<FetchedTunnels, FetchError> {
        let url = format!("{}/GetUserTunnel", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&GetUserTunnelRequest { token })
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        decode_tunnels(&body)
    }
}

pub(crate) fn decode_tunnels(body: &[u8]) -> Result<FetchedTunnels, FetchError> {
    let response: GetUserTunnelResponse =
        serde_json::from_slice(body).map_err(FetchError::Malformed)?;
    let tunnels = response
        .tunnel
        .ok_or_else(|| FetchError::MissingField("tunnel".to_string()))?;

    Ok(tunnels
        .into_iter()
        .map(|(name, entry)| {
            let data = entry
                .get("data")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string);
            (name, data)
        })
        .collect())
}
