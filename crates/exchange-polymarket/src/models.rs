//! Gamma API models for 15-minute Up/Down market discovery.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::arbitrage::types::MarketSide;

/// Length of one Up/Down market window in seconds.
pub const WINDOW_SECS: i64 = 900;

/// Event returned by `GET /events?slug=...`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GammaEvent {
    pub slug: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub markets: Vec<GammaMarket>,
}

/// Market entry inside a [`GammaEvent`].
///
/// Gamma encodes `outcomes` and `clobTokenIds` as JSON arrays
/// serialized into strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GammaMarket {
    #[serde(rename = "conditionId", default)]
    pub condition_id: String,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(rename = "clobTokenIds", default)]
    pub clob_token_ids: Option<String>,
    #[serde(default)]
    pub outcomes: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub closed: Option<bool>,
    #[serde(rename = "endDate", default)]
    pub end_date: Option<DateTime<Utc>>,
}

fn parse_string_array(raw: Option<&str>) -> Vec<String> {
    raw.and_then(|s| serde_json::from_str::<Vec<String>>(s).ok())
        .unwrap_or_default()
}

impl GammaMarket {
    #[must_use]
    pub fn token_ids(&self) -> Vec<String> {
        parse_string_array(self.clob_token_ids.as_deref())
    }

    /// Outcome labels in token order. Up/Down markets list "Up" first when
    /// the field is absent.
    #[must_use]
    pub fn outcome_labels(&self) -> Vec<String> {
        let labels = parse_string_array(self.outcomes.as_deref());
        if labels.is_empty() {
            vec!["Up".to_string(), "Down".to_string()]
        } else {
            labels
        }
    }

    /// Pairs token ids with outcome labels and returns `(up_token, down_token)`.
    #[must_use]
    pub fn side_tokens(&self) -> Option<(String, String)> {
        let mut up = None;
        let mut down = None;
        for (token, label) in self.token_ids().into_iter().zip(self.outcome_labels()) {
            match MarketSide::from_outcome(&label) {
                Some(MarketSide::Up) => up = Some(token),
                Some(MarketSide::Down) => down = Some(token),
                None => {}
            }
        }
        Some((up?, down?))
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.active.unwrap_or(true) && !self.closed.unwrap_or(false)
    }
}

/// A resolved Up/Down market for one symbol and window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpDownMarket {
    /// Upper-case symbol, e.g. `BTC`.
    pub symbol: String,
    pub slug: String,
    pub condition_id: String,
    pub up_token_id: String,
    pub down_token_id: String,
    pub window_start: DateTime<Utc>,
}

impl UpDownMarket {
    #[must_use]
    pub fn window_end(&self) -> DateTime<Utc> {
        self.window_start + Duration::seconds(WINDOW_SECS)
    }

    #[must_use]
    pub fn token_id(&self, side: MarketSide) -> &str {
        match side {
            MarketSide::Up => &self.up_token_id,
            MarketSide::Down => &self.down_token_id,
        }
    }
}
