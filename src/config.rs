// src/config.rs
//! Engine configuration: every threshold the clustering, velocity and signal
//! rules use, plus the keyword/source tables the default collaborators read.
//!
//! Loaded from TOML (`config/correlation.toml` or `$CORRELATION_CONFIG_PATH`).
//! Every section is optional; missing values fall back to the built-in seed.

use anyhow::Context;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::EngineError;

// --- env defaults & names ---
pub const DEFAULT_CONFIG_PATH: &str = "config/correlation.toml";
pub const ENV_CONFIG_PATH: &str = "CORRELATION_CONFIG_PATH";
pub const ENV_SIMILARITY_THRESHOLD: &str = "CORRELATION_SIMILARITY_THRESHOLD";
pub const ENV_SPIKE_MULTIPLIER: &str = "CORRELATION_SPIKE_MULTIPLIER";
pub const ENV_MIN_CONFIDENCE: &str = "CORRELATION_MIN_CONFIDENCE";

// --- clustering ---
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.5;
pub const DEFAULT_MAX_TOKENS: usize = crate::text::MAX_TOKENS_PER_TITLE;

// --- velocity ---
pub const DEFAULT_HISTORY_WINDOW_DAYS: i64 = 7;
pub const DEFAULT_HISTORY_CAP: usize = 1000;
pub const DEFAULT_SPIKE_FLOOR: f64 = 6.0;
pub const DEFAULT_SPIKE_MULTIPLIER: f64 = 3.0;

// --- signals ---
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.6;
pub const DEFAULT_PREDICTION_SHIFT: f64 = 5.0;
pub const DEFAULT_NEWS_VELOCITY_FLOOR: f64 = 3.0;
pub const DEFAULT_MARKET_MOVE: f64 = 3.0;
pub const DEFAULT_SILENT_NEWS_FLOOR: usize = 1;
pub const DEFAULT_ENERGY_RISE: f64 = 2.0;
pub const DEFAULT_CONVERGENCE_WINDOW_MINS: i64 = 60;
pub const DEFAULT_CONVERGENCE_MIN_MEMBERS: usize = 3;
pub const DEFAULT_CONVERGENCE_MIN_TYPES: usize = 3;
pub const DEFAULT_TRIANGULATION_CONFIDENCE: f64 = 0.9;
pub const PREDICTION_KEY_LEN: usize = 50;

// --- dedup ---
pub const DEFAULT_DEDUP_TTL_SECS: i64 = 30 * 60;
pub const DEFAULT_DEDUP_SWEEP_CAP: usize = 2_000;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    pub clustering: ClusteringConfig,
    pub velocity: VelocityConfig,
    pub signals: SignalConfig,
    pub dedup: DedupConfig,
    pub topics: TopicVocabulary,
    pub sources: SourceTableConfig,
    pub entities: EntityConfig,
    pub threats: ThreatConfig,
    pub energy: EnergyConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    pub similarity_threshold: f64,
    pub max_tokens: usize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VelocityConfig {
    pub history_window_days: i64,
    pub history_cap: usize,
    /// Absolute activity a topic must exceed before it can spike.
    pub spike_floor: f64,
    pub spike_multiplier: f64,
}

impl Default for VelocityConfig {
    fn default() -> Self {
        Self {
            history_window_days: DEFAULT_HISTORY_WINDOW_DAYS,
            history_cap: DEFAULT_HISTORY_CAP,
            spike_floor: DEFAULT_SPIKE_FLOOR,
            spike_multiplier: DEFAULT_SPIKE_MULTIPLIER,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub min_confidence: f64,
    /// Prediction price shift (0–100 points) between cycles.
    pub prediction_shift: f64,
    /// Topic activity below this counts as "news is quiet".
    pub news_velocity_floor: f64,
    /// Absolute market change (%) that counts as a move.
    pub market_move: f64,
    /// Silent divergence requires fewer related headlines than this.
    pub silent_news_floor: usize,
    pub convergence_window_mins: i64,
    pub convergence_min_members: usize,
    pub convergence_min_types: usize,
    pub triangulation_confidence: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            prediction_shift: DEFAULT_PREDICTION_SHIFT,
            news_velocity_floor: DEFAULT_NEWS_VELOCITY_FLOOR,
            market_move: DEFAULT_MARKET_MOVE,
            silent_news_floor: DEFAULT_SILENT_NEWS_FLOOR,
            convergence_window_mins: DEFAULT_CONVERGENCE_WINDOW_MINS,
            convergence_min_members: DEFAULT_CONVERGENCE_MIN_MEMBERS,
            convergence_min_types: DEFAULT_CONVERGENCE_MIN_TYPES,
            triangulation_confidence: DEFAULT_TRIANGULATION_CONFIDENCE,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub default_ttl_secs: i64,
    /// Per signal type overrides, keyed by the type's snake_case name.
    pub ttl_by_type: BTreeMap<String, i64>,
    pub sweep_cap: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        let ttl_by_type = [
            ("velocity_spike", 60 * 60),
            ("silent_divergence", 2 * 60 * 60),
            ("explained_market_move", 2 * 60 * 60),
            ("triangulation", 6 * 60 * 60),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        Self {
            default_ttl_secs: DEFAULT_DEDUP_TTL_SECS,
            ttl_by_type,
            sweep_cap: DEFAULT_DEDUP_SWEEP_CAP,
        }
    }
}

/// Keyword topics tracked for velocity, plus optional topic → symbol links.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TopicVocabulary {
    pub topics: Vec<String>,
    /// Topics listed here are never matched (muted without editing `topics`).
    pub suppressed: Vec<String>,
    pub symbol_links: BTreeMap<String, Vec<String>>,
}

impl Default for TopicVocabulary {
    fn default() -> Self {
        let topics = [
            "iran", "israel", "gaza", "ukraine", "russia", "china", "taiwan", "nato", "north korea",
            "tariffs", "sanctions", "oil", "opec", "natural gas", "fed", "inflation", "recession",
            "election", "nuclear", "missile", "drone", "cyberattack", "earthquake", "hurricane",
            "semiconductor",
        ];
        let links = [
            ("oil", vec!["CL=F", "BZ=F"]),
            ("opec", vec!["CL=F", "BZ=F"]),
            ("natural gas", vec!["NG=F"]),
            ("fed", vec!["^GSPC", "^TNX"]),
            ("tariffs", vec!["^GSPC"]),
            ("semiconductor", vec!["SOXX", "NVDA"]),
        ];
        Self {
            topics: topics.iter().map(|s| s.to_string()).collect(),
            suppressed: Vec::new(),
            symbol_links: links
                .into_iter()
                .map(|(t, syms)| (t.to_string(), syms.into_iter().map(String::from).collect()))
                .collect(),
        }
    }
}

impl TopicVocabulary {
    pub fn with_topics<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            topics: topics.into_iter().map(Into::into).collect(),
            suppressed: Vec::new(),
            symbol_links: BTreeMap::new(),
        }
    }

    /// Active topics, lowercased, suppressed ones removed, in declaration order.
    pub fn active_topics(&self) -> Vec<String> {
        let muted: Vec<String> = self.suppressed.iter().map(|s| s.trim().to_lowercase()).collect();
        let mut out: Vec<String> = Vec::with_capacity(self.topics.len());
        for t in &self.topics {
            let t = t.trim().to_lowercase();
            if t.is_empty() || muted.contains(&t) || out.contains(&t) {
                continue;
            }
            out.push(t);
        }
        out
    }
}

/// Tier and source-type tables for the default source classifier.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceTableConfig {
    pub default_tier: u8,
    pub default_type: String,
    pub tiers: BTreeMap<String, u8>,
    pub types: BTreeMap<String, String>,
    /// Alias → canonical name.
    pub aliases: BTreeMap<String, String>,
}

impl Default for SourceTableConfig {
    fn default() -> Self {
        let mut tiers = BTreeMap::new();
        let mut types = BTreeMap::new();
        for (name, tier, kind) in [
            ("reuters", 1, "wire"),
            ("associated press", 1, "wire"),
            ("afp", 1, "wire"),
            ("bloomberg", 2, "market"),
            ("financial times", 2, "market"),
            ("cnbc", 3, "market"),
            ("marketwatch", 3, "market"),
            ("white house", 1, "government"),
            ("state department", 1, "government"),
            ("pentagon", 1, "government"),
            ("un news", 2, "government"),
            ("bellingcat", 2, "intelligence"),
            ("isw", 2, "intelligence"),
            ("janes", 2, "intelligence"),
            ("bbc", 2, "mainstream"),
            ("guardian", 2, "mainstream"),
            ("new york times", 2, "mainstream"),
            ("cnn", 3, "mainstream"),
            ("al jazeera", 3, "mainstream"),
            ("techcrunch", 3, "tech"),
            ("ars technica", 3, "tech"),
            ("the verge", 3, "tech"),
        ] {
            tiers.insert(name.to_string(), tier);
            types.insert(name.to_string(), kind.to_string());
        }
        let aliases = [
            ("ap", "associated press"),
            ("ap news", "associated press"),
            ("agence france presse", "afp"),
            ("ft", "financial times"),
            ("nyt", "new york times"),
            ("nytimes", "new york times"),
            ("dod", "pentagon"),
            ("department of defense", "pentagon"),
            ("institute for the study of war", "isw"),
            ("bbc world", "bbc"),
        ]
        .into_iter()
        .map(|(a, c)| (a.to_string(), c.to_string()))
        .collect();
        Self {
            default_tier: 4,
            default_type: "other".to_string(),
            tiers,
            types,
            aliases,
        }
    }
}

/// Symbol → keywords used by the keyword entity linker.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EntityConfig {
    pub symbols: BTreeMap<String, Vec<String>>,
}

impl Default for EntityConfig {
    fn default() -> Self {
        let symbols = [
            ("CL=F", vec!["crude", "oil", "opec", "brent"]),
            ("BZ=F", vec!["brent", "crude", "opec"]),
            ("NG=F", vec!["natural gas", "lng", "gas pipeline"]),
            ("GC=F", vec!["gold"]),
            ("^GSPC", vec!["s&p 500", "wall street", "stocks"]),
            ("NVDA", vec!["nvidia"]),
            ("AAPL", vec!["apple", "iphone"]),
            ("TSLA", vec!["tesla"]),
            ("LMT", vec!["lockheed"]),
        ];
        Self {
            symbols: symbols
                .into_iter()
                .map(|(s, kws)| (s.to_string(), kws.into_iter().map(String::from).collect()))
                .collect(),
        }
    }
}

/// Keyword → threat level table for the keyword threat classifier.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThreatConfig {
    pub critical: Vec<String>,
    pub high: Vec<String>,
    pub medium: Vec<String>,
    pub low: Vec<String>,
}

impl Default for ThreatConfig {
    fn default() -> Self {
        let v = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            critical: v(&["nuclear strike", "invasion", "declares war", "coup", "mass casualty"]),
            high: v(&["missile", "airstrike", "explosion", "attack", "killed", "mobilization"]),
            medium: v(&["sanctions", "cyberattack", "protest", "blockade", "outage"]),
            low: v(&["tensions", "warning", "talks", "drill"]),
        }
    }
}

/// Energy symbols and the keyword sets behind the flow rules.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnergyConfig {
    pub symbols: Vec<String>,
    /// Rise (%) an energy symbol needs for a flow/price divergence.
    pub rise_threshold: f64,
    pub pipeline_keywords: Vec<String>,
    pub flow_drop_keywords: Vec<String>,
}

impl Default for EnergyConfig {
    fn default() -> Self {
        let v = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            symbols: v(&["CL=F", "BZ=F", "NG=F", "USO", "UNG"]),
            rise_threshold: DEFAULT_ENERGY_RISE,
            pipeline_keywords: v(&["pipeline", "nord stream", "druzhba", "transit", "lng terminal"]),
            flow_drop_keywords: v(&[
                "halt", "halted", "shut", "shutdown", "cut", "reduced", "reduction", "drop",
                "suspend", "suspended", "outage", "disruption", "disrupted", "curtail", "stopped",
            ]),
        }
    }
}

impl CorrelationConfig {
    /// Load using `$CORRELATION_CONFIG_PATH` or the default path, then apply
    /// env overrides. A missing file is not an error: the built-in seed is used.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        let mut cfg = if path.exists() {
            Self::from_path(&path)?
        } else {
            warn!(target: "correlation", path = %path.display(), "config not found, using built-in defaults");
            Self::default()
        };
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading correlation config from {}", path.display()))?;
        let cfg = Self::from_toml_str(&content)
            .with_context(|| format!("parsing correlation config {}", path.display()))?;
        info!(target: "correlation", path = %path.display(), "correlation config loaded");
        Ok(cfg)
    }

    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        let cfg: CorrelationConfig = toml::from_str(toml_str)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Override the most-tuned knobs from env (invalid values are ignored).
    pub fn apply_env_overrides(&mut self) {
        if let Some(t) = parse_unit_env(std::env::var(ENV_SIMILARITY_THRESHOLD).ok()) {
            self.clustering.similarity_threshold = t;
        }
        if let Some(c) = parse_unit_env(std::env::var(ENV_MIN_CONFIDENCE).ok()) {
            self.signals.min_confidence = c;
        }
        if let Some(m) = std::env::var(ENV_SPIKE_MULTIPLIER)
            .ok()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .filter(|m| m.is_finite() && *m >= 1.0)
        {
            self.velocity.spike_multiplier = m;
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let unit = |name: &str, v: f64| {
            if v.is_finite() && (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(EngineError::invalid(format!("{name} must be within 0..=1, got {v}")))
            }
        };
        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(EngineError::invalid(format!("{name} must be > 0, got {v}")))
            }
        };
        unit("clustering.similarity_threshold", self.clustering.similarity_threshold)?;
        unit("signals.min_confidence", self.signals.min_confidence)?;
        unit("signals.triangulation_confidence", self.signals.triangulation_confidence)?;
        positive("velocity.spike_floor", self.velocity.spike_floor)?;
        positive("signals.prediction_shift", self.signals.prediction_shift)?;
        positive("signals.news_velocity_floor", self.signals.news_velocity_floor)?;
        positive("signals.market_move", self.signals.market_move)?;
        positive("energy.rise_threshold", self.energy.rise_threshold)?;
        if !self.velocity.spike_multiplier.is_finite() || self.velocity.spike_multiplier < 1.0 {
            return Err(EngineError::invalid("velocity.spike_multiplier must be >= 1"));
        }
        if self.clustering.max_tokens == 0 {
            return Err(EngineError::invalid("clustering.max_tokens must be > 0"));
        }
        if self.velocity.history_window_days <= 0 || self.velocity.history_cap == 0 {
            return Err(EngineError::invalid("velocity history window and cap must be > 0"));
        }
        if self.dedup.default_ttl_secs < 0 {
            return Err(EngineError::invalid("dedup.default_ttl_secs must be >= 0"));
        }
        Ok(())
    }
}

// parse optional float env and require it within <0.0..=1.0>
fn parse_unit_env(raw: Option<String>) -> Option<f64> {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, 1.0))
}
