//! # Collaborators
//!
//! Narrow interfaces the engine calls as black boxes, plus table/keyword-driven
//! default implementations:
//!
//! - [`SourceClassifier`]: `tier_of` / `source_type_of` for a source name.
//! - [`EntityLinker`]: entity contexts over events, news lookup per symbol.
//! - [`ThreatClassifier`]: threat level for an event's members.
//!
//! Entity and threat collaborators are fallible; the engine contains their
//! failures to the detector that needed them.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::{EntityConfig, SourceTableConfig, ThreatConfig};
use crate::types::{ClusteredEvent, NewsItem, SourceType, ThreatClassification, ThreatLevel};

pub trait SourceClassifier: Send + Sync {
    fn tier_of(&self, source: &str) -> u8;
    fn source_type_of(&self, source: &str) -> SourceType;
}

/// Events mentioning one entity (a market symbol for the keyword linker).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityContext {
    pub entity_id: String,
    pub references: Vec<NewsReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsReference {
    pub event_id: String,
    pub title: String,
    pub source: String,
    pub matched: String,
}

pub trait EntityLinker: Send + Sync {
    fn extract_entities_from_clusters(&self, events: &[ClusteredEvent]) -> Result<Vec<EntityContext>>;
    fn find_news_for_symbol(&self, symbol: &str, contexts: &[EntityContext]) -> Result<Vec<NewsReference>>;
}

pub trait ThreatClassifier: Send + Sync {
    fn aggregate_threats_for_cluster(&self, members: &[NewsItem]) -> Result<Option<ThreatClassification>>;
}

/* ----------------------------
Source table
---------------------------- */

/// Config-driven source classifier.
/// Lookup order: alias → exact → substring → default.
#[derive(Debug, Clone)]
pub struct SourceTable {
    default_tier: u8,
    default_type: SourceType,
    tiers: BTreeMap<String, u8>,
    types: BTreeMap<String, SourceType>,
    aliases: BTreeMap<String, String>,
}

impl SourceTable {
    pub fn from_config(cfg: &SourceTableConfig) -> Self {
        Self {
            default_tier: cfg.default_tier,
            default_type: SourceType::parse(&cfg.default_type),
            tiers: cfg.tiers.iter().map(|(k, v)| (normalize(k), *v)).collect(),
            types: cfg
                .types
                .iter()
                .map(|(k, v)| (normalize(k), SourceType::parse(v)))
                .collect(),
            aliases: cfg
                .aliases
                .iter()
                .map(|(a, c)| (normalize(a), normalize(c)))
                .collect(),
        }
    }

    fn lookup<'a, T: Copy>(&self, table: &'a BTreeMap<String, T>, source: &str) -> Option<T> {
        let s = normalize(source);
        if let Some(canon) = self.aliases.get(&s) {
            if let Some(v) = table.get(canon) {
                return Some(*v);
            }
        }
        if let Some(v) = table.get(&s) {
            return Some(*v);
        }
        // Substring fallback, longest key first so "bbc world service" hits "bbc world" before "bbc".
        let mut best: Option<(&'a str, T)> = None;
        for (k, v) in table {
            if contains_word_seq(&s, k) && best.map_or(true, |(b, _)| k.len() > b.len()) {
                best = Some((k.as_str(), *v));
            }
        }
        best.map(|(_, v)| v)
    }
}

impl Default for SourceTable {
    fn default() -> Self {
        Self::from_config(&SourceTableConfig::default())
    }
}

impl SourceClassifier for SourceTable {
    fn tier_of(&self, source: &str) -> u8 {
        self.lookup(&self.tiers, source).unwrap_or(self.default_tier)
    }

    fn source_type_of(&self, source: &str) -> SourceType {
        self.lookup(&self.types, source).unwrap_or(self.default_type)
    }
}

/// Lowercase, replace punctuation/dashes with spaces, collapse whitespace.
fn normalize(s: &str) -> String {
    let lowered = s.trim().to_lowercase();
    let spaced: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '&' { c } else { ' ' })
        .collect();
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `needle` occurs in `hay` on word boundaries (both already normalized).
fn contains_word_seq(hay: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    let padded_hay = format!(" {hay} ");
    let padded_needle = format!(" {needle} ");
    padded_hay.contains(&padded_needle)
}

/* ----------------------------
Keyword entity linker
---------------------------- */

#[derive(Debug, Clone)]
pub struct KeywordEntityLinker {
    symbols: BTreeMap<String, Vec<String>>,
}

impl KeywordEntityLinker {
    pub fn from_config(cfg: &EntityConfig) -> Self {
        Self {
            symbols: cfg
                .symbols
                .iter()
                .map(|(s, kws)| {
                    (
                        s.clone(),
                        kws.iter()
                            .map(|k| normalize(k))
                            .filter(|k| !k.is_empty())
                            .collect(),
                    )
                })
                .collect(),
        }
    }
}

impl Default for KeywordEntityLinker {
    fn default() -> Self {
        Self::from_config(&EntityConfig::default())
    }
}

impl EntityLinker for KeywordEntityLinker {
    fn extract_entities_from_clusters(&self, events: &[ClusteredEvent]) -> Result<Vec<EntityContext>> {
        let titles: Vec<String> = events.iter().map(|e| normalize(&e.primary_title)).collect();
        let mut out = Vec::new();
        for (symbol, keywords) in &self.symbols {
            let mut refs = Vec::new();
            for (ev, title) in events.iter().zip(&titles) {
                if let Some(kw) = keywords.iter().find(|k| contains_word_seq(title, k)) {
                    refs.push(NewsReference {
                        event_id: ev.id.clone(),
                        title: ev.primary_title.clone(),
                        source: ev.primary_source.clone(),
                        matched: kw.clone(),
                    });
                }
            }
            if !refs.is_empty() {
                out.push(EntityContext {
                    entity_id: symbol.clone(),
                    references: refs,
                });
            }
        }
        Ok(out)
    }

    fn find_news_for_symbol(&self, symbol: &str, contexts: &[EntityContext]) -> Result<Vec<NewsReference>> {
        Ok(contexts
            .iter()
            .filter(|c| c.entity_id.eq_ignore_ascii_case(symbol))
            .flat_map(|c| c.references.iter().cloned())
            .collect())
    }
}

/* ----------------------------
Keyword threat classifier
---------------------------- */

#[derive(Debug, Clone)]
pub struct KeywordThreatClassifier {
    // Ordered most severe first.
    levels: Vec<(ThreatLevel, Vec<String>)>,
}

impl KeywordThreatClassifier {
    pub fn from_config(cfg: &ThreatConfig) -> Self {
        let norm = |xs: &[String]| -> Vec<String> {
            xs.iter().map(|s| normalize(s)).filter(|s| !s.is_empty()).collect()
        };
        Self {
            levels: vec![
                (ThreatLevel::Critical, norm(&cfg.critical)),
                (ThreatLevel::High, norm(&cfg.high)),
                (ThreatLevel::Medium, norm(&cfg.medium)),
                (ThreatLevel::Low, norm(&cfg.low)),
            ],
        }
    }
}

impl Default for KeywordThreatClassifier {
    fn default() -> Self {
        Self::from_config(&ThreatConfig::default())
    }
}

impl ThreatClassifier for KeywordThreatClassifier {
    fn aggregate_threats_for_cluster(&self, members: &[NewsItem]) -> Result<Option<ThreatClassification>> {
        let titles: Vec<String> = members.iter().map(|m| normalize(&m.title)).collect();
        for (level, keywords) in &self.levels {
            let evidence: Vec<String> = keywords
                .iter()
                .filter(|k| titles.iter().any(|t| contains_word_seq(t, k)))
                .cloned()
                .collect();
            if !evidence.is_empty() {
                return Ok(Some(ThreatClassification {
                    level: *level,
                    evidence,
                }));
            }
        }
        Ok(None)
    }
}
