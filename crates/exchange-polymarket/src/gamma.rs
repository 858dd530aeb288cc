//! Gamma API client for 15-minute Up/Down market discovery.
//!
//! Each window's market is found by slug: `{symbol}-updown-15m-{window_start}`,
//! where `window_start` is the Unix time of the window's first second.

use crate::models::{GammaEvent, UpDownMarket, WINDOW_SECS};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::Client;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Gamma API base URL.
pub const GAMMA_API_URL: &str = "https://gamma-api.polymarket.com";

/// Gamma API client for 15-minute market discovery.
#[derive(Clone)]
pub struct GammaClient {
    http: Client,
    base_url: String,
    rate_limiter: Arc<
        RateLimiter<
            governor::state::NotKeyed,
            governor::state::InMemoryState,
            governor::clock::DefaultClock,
        >,
    >,
}

impl GammaClient {
    /// Creates a client limited to 30 requests per minute.
    #[must_use]
    pub fn new() -> Self {
        Self::with_rate_limit(nonzero!(30u32))
    }

    #[must_use]
    pub fn with_rate_limit(requests_per_minute: NonZeroU32) -> Self {
        let quota = Quota::per_minute(requests_per_minute);

        Self {
            http: Client::new(),
            base_url: GAMMA_API_URL.to_string(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Sets a custom base URL (useful for testing).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Gamma API error {}: {}", status, text));
        }

        Ok(response.json::<T>().await?)
    }

    /// Start of the 15-minute window containing `time`, as Unix seconds.
    #[must_use]
    pub fn calculate_window_timestamp(time: DateTime<Utc>) -> i64 {
        time.timestamp().div_euclid(WINDOW_SECS) * WINDOW_SECS
    }

    /// Event slug for a symbol and window start.
    #[must_use]
    pub fn generate_event_slug(symbol: &str, window_timestamp: i64) -> String {
        format!("{}-updown-15m-{}", symbol.to_lowercase(), window_timestamp)
    }

    /// Fetches the event for a slug.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or no event has that slug.
    pub async fn get_event(&self, slug: &str) -> Result<GammaEvent> {
        let events: Vec<GammaEvent> = self.get(&format!("/events?slug={slug}")).await?;
        events
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No event found for slug: {}", slug))
    }

    /// Resolves the Up/Down market for `symbol` in the window containing `time`.
    ///
    /// # Errors
    ///
    /// Returns an error if the event is missing or carries no open market with
    /// both outcome tokens.
    pub async fn find_market(&self, symbol: &str, time: DateTime<Utc>) -> Result<UpDownMarket> {
        let window_timestamp = Self::calculate_window_timestamp(time);
        let slug = Self::generate_event_slug(symbol, window_timestamp);

        tracing::debug!(symbol, window_timestamp, slug = %slug, "Fetching 15-min market event");

        let event = self.get_event(&slug).await?;
        let (market, (up_token_id, down_token_id)) = event
            .markets
            .iter()
            .filter(|m| m.is_open())
            .find_map(|m| m.side_tokens().map(|tokens| (m, tokens)))
            .ok_or_else(|| anyhow!("No open Up/Down market in event {}", slug))?;

        let window_start = DateTime::from_timestamp(window_timestamp, 0)
            .ok_or_else(|| anyhow!("Window timestamp out of range: {}", window_timestamp))?;

        Ok(UpDownMarket {
            symbol: symbol.to_uppercase(),
            slug: event.slug.clone(),
            condition_id: market.condition_id.clone(),
            up_token_id,
            down_token_id,
            window_start,
        })
    }

    /// Resolves markets for several symbols concurrently. Failures are logged
    /// and skipped.
    pub async fn find_markets(&self, symbols: &[String], time: DateTime<Utc>) -> Vec<UpDownMarket> {
        let futures: Vec<_> = symbols
            .iter()
            .map(|symbol| async move {
                match self.find_market(symbol, time).await {
                    Ok(market) => {
                        tracing::info!(
                            symbol = %market.symbol,
                            slug = %market.slug,
                            up_token = %market.up_token_id,
                            down_token = %market.down_token_id,
                            "Discovered 15-min market"
                        );
                        Some(market)
                    }
                    Err(e) => {
                        tracing::warn!(symbol = %symbol, error = %e, "Failed to fetch 15-min market");
                        None
                    }
                }
            })
            .collect();

        futures_util::future::join_all(futures)
            .await
            .into_iter()
            .flatten()
            .collect()
    }
}

impl Default for GammaClient {
    fn default() -> Self {
        Self::new()
    }
}
