use anyhow::Context;
use async_trait::async_trait;
use ppda_core::IndicatorSource;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::SourceFetcher;

pub const SNIFA_URL: &str = "https://snifa.sma.gob.cl/api/datos";
pub const AIRECOO_URL: &str = "http://www.airecoo.mma.gob.cl/api/calidad-aire";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetcherConfig {
    pub source: IndicatorSource,
    pub url: String,
    /// Sent as `Authorization: Bearer <token>` when present.
    pub bearer_token: Option<String>,
    pub user_agent: Option<String>,
}

impl FetcherConfig {
    pub fn snifa(token: Option<String>) -> Self {
        Self {
            source: IndicatorSource::Snifa,
            url: SNIFA_URL.to_string(),
            bearer_token: token,
            user_agent: None,
        }
    }

    pub fn airecoo() -> Self {
        Self {
            source: IndicatorSource::Airecoo,
            url: AIRECOO_URL.to_string(),
            bearer_token: None,
            user_agent: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

/// Single `GET` against a fixed JSON endpoint.
#[derive(Debug, Clone)]
pub struct HttpSourceFetcher {
    client: reqwest::Client,
    config: FetcherConfig,
}

impl HttpSourceFetcher {
    pub fn new(config: FetcherConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder().gzip(true).brotli(true);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let client = builder.build().context("building reqwest client")?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    async fn try_fetch(&self) -> Result<JsonValue, String> {
        let mut request = self.client.get(&self.config.url);
        if let Some(token) = &self.config.bearer_token {
            request = request
                .header(AUTHORIZATION, format!("Bearer {token}"))
                .header(CONTENT_TYPE, "application/json");
        }

        let resp = request
            .send()
            .await
            .map_err(|err| format!("request failed: {err}"))?;
        let status = resp.status();
        if status != StatusCode::OK {
            return Err(format!("http status {}", status.as_u16()));
        }
        resp.json::<JsonValue>()
            .await
            .map_err(|err| format!("invalid JSON body: {err}"))
    }
}

#[async_trait]
impl SourceFetcher for HttpSourceFetcher {
    fn source(&self) -> IndicatorSource {
        self.config.source
    }

    async fn fetch(&self) -> Option<JsonValue> {
        let source = self.config.source;
        match self.try_fetch().await {
            Ok(payload) => {
                debug!(%source, url = %self.config.url, "upstream payload received");
                Some(payload)
            }
            Err(reason) => {
                warn!(%source, url = %self.config.url, %reason, "upstream fetch failed");
                None
            }
        }
    }
}
