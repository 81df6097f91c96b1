//! Input items, clustered events and enrichment shapes shared by the engine.
//!
//! Serialized field names are camelCase so batches and snapshots stay
//! compatible with existing JSON producers/consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse category of a news source, used by convergence/triangulation rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Wire,
    Government,
    Intelligence,
    Mainstream,
    Market,
    Tech,
    Other,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Wire => "wire",
            SourceType::Government => "government",
            SourceType::Intelligence => "intelligence",
            SourceType::Mainstream => "mainstream",
            SourceType::Market => "market",
            SourceType::Tech => "tech",
            SourceType::Other => "other",
        }
    }

    /// Lenient parse; anything unknown maps to `Other`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "wire" => SourceType::Wire,
            "government" | "gov" => SourceType::Government,
            "intelligence" | "intel" => SourceType::Intelligence,
            "mainstream" => SourceType::Mainstream,
            "market" | "markets" => SourceType::Market,
            "tech" => SourceType::Tech,
            _ => SourceType::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// A single headline as delivered by ingestion. Immutable once ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsItem {
    pub source: String,
    pub title: String,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub is_alert: bool,
    /// Credibility rank, lower = more authoritative. Resolved via the source
    /// classifier when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<SourceType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl NewsItem {
    pub fn new(
        source: impl Into<String>,
        title: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            source: source.into(),
            title: title.into(),
            published_at,
            is_alert: false,
            tier: None,
            source_type: None,
            location: None,
            language: None,
            link: None,
        }
    }

    pub fn tier(mut self, tier: u8) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn source_type(mut self, t: SourceType) -> Self {
        self.source_type = Some(t);
        self
    }

    pub fn located(mut self, lat: f64, lon: f64) -> Self {
        self.location = Some(GeoPoint { lat, lon });
        self
    }

    pub fn link(mut self, url: impl Into<String>) -> Self {
        self.link = Some(url.into());
        self
    }

    pub fn alert(mut self) -> Self {
        self.is_alert = true;
        self
    }
}

/// One of the (up to three) most authoritative members of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopSource {
    pub source: String,
    pub tier: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl ThreatLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(ThreatLevel::Low),
            "medium" => Some(ThreatLevel::Medium),
            "high" => Some(ThreatLevel::High),
            "critical" => Some(ThreatLevel::Critical),
            _ => None,
        }
    }
}

/// Output of the threat classifier collaborator for one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatClassification {
    pub level: ThreatLevel,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<String>,
}

/// A cluster of near-duplicate headlines. Rebuilt from scratch every cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusteredEvent {
    pub id: String,
    pub primary_title: String,
    pub primary_source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_link: Option<String>,
    pub member_count: usize,
    pub top_sources: Vec<TopSource>,
    pub all_members: Vec<NewsItem>,
    pub first_seen: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub is_alert: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threat: Option<ThreatClassification>,
}

/// Prediction-market quote; `yes_price` is on a 0–100 scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionQuote {
    pub title: String,
    pub yes_price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

impl PredictionQuote {
    pub fn new(title: impl Into<String>, yes_price: f64) -> Self {
        Self {
            title: title.into(),
            yes_price,
            volume: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketQuote {
    pub symbol: String,
    pub name: String,
    pub display: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_percent: Option<f64>,
}

impl MarketQuote {
    pub fn new(symbol: impl Into<String>, name: impl Into<String>) -> Self {
        let symbol = symbol.into();
        Self {
            display: symbol.clone(),
            symbol,
            name: name.into(),
            price: None,
            change_percent: None,
        }
    }

    pub fn change(mut self, pct: f64) -> Self {
        self.change_percent = Some(pct);
        self
    }

    pub fn price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }
}
