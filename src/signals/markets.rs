//! Market-side rules: predictions and tickers checked against news coverage.

use metrics::counter;
use tracing::warn;

use super::news::any_flow_drop;
use super::{Candidate, CorrelationSignal, DetectorContext, SignalData, SignalType};
use crate::collaborators::NewsReference;
use crate::snapshot::prediction_key;
use crate::text::{contains_lower, contains_phrase, tokenize, word_line};
use crate::types::MarketQuote;

/// Company-form and instrument words that say nothing about the subject.
const GENERIC_NAME_WORDS: &[&str] = &[
    "inc", "corp", "corporation", "ltd", "plc", "company", "holdings", "group", "index",
    "futures", "etf", "fund", "trust", "class", "shares",
];

/// A prediction market repriced while news on its topics stayed quiet.
pub fn prediction_leads_news(ctx: &DetectorContext<'_>) -> Vec<CorrelationSignal> {
    let cfg = &ctx.config.signals;
    let topics = ctx.config.topics.active_topics();
    let mut out = Vec::new();
    for p in ctx.predictions {
        let key = prediction_key(&p.title);
        let Some(&previous) = ctx.previous.prediction_value.get(&key) else {
            continue;
        };
        let shift = p.yes_price - previous;
        if shift.abs() < cfg.prediction_shift {
            continue;
        }
        let title_lower = p.title.to_lowercase();
        let related: Vec<String> = topics
            .iter()
            .filter(|t| contains_lower(&title_lower, t))
            .cloned()
            .collect();
        let news_activity = related
            .iter()
            .filter_map(|t| ctx.activity.get(t))
            .fold(0.0_f64, |a, &b| a.max(b));
        if news_activity >= cfg.news_velocity_floor {
            continue;
        }
        let direction = if shift > 0.0 { "up" } else { "down" };
        ctx.emit(
            &mut out,
            Candidate {
                kind: SignalType::PredictionLeadsNews,
                subject: key.clone(),
                magnitude: shift,
                title: format!("Prediction market moving ahead of news: {key}"),
                description: format!(
                    "Odds {direction} {:.1} pts ({previous:.0} -> {:.0}) with news activity {news_activity:.1}",
                    shift.abs(),
                    p.yes_price
                ),
                confidence: (0.6 + shift.abs() / 50.0).min(0.9),
                data: SignalData::PredictionLeadsNews {
                    market: p.title.clone(),
                    previous_price: previous,
                    current_price: p.yes_price,
                    shift,
                    related_topics: related,
                    news_activity,
                },
            },
        );
    }
    out
}

/// Entity-linked references for `symbol`; `None` when the linker is unavailable
/// this cycle or fails for this symbol.
fn entity_news(ctx: &DetectorContext<'_>, symbol: &str) -> Option<Vec<NewsReference>> {
    let contexts = ctx.entities?;
    match ctx.entity_linker.find_news_for_symbol(symbol, contexts) {
        Ok(refs) => Some(refs),
        Err(e) => {
            warn!(target: "correlation", symbol, error = ?e, "entity lookup failed");
            counter!("correlation_collaborator_errors_total", "collaborator" => "entity").increment(1);
            None
        }
    }
}

/// Terms a headline would use for this quote: significant name words, plus the
/// ticker itself when it is a plain word.
fn quote_terms(q: &MarketQuote) -> Vec<String> {
    let mut terms: Vec<String> = tokenize(&q.name)
        .into_iter()
        .filter(|w| !GENERIC_NAME_WORDS.contains(&w.as_str()))
        .collect();
    let sym = q.symbol.trim();
    if sym.len() >= 2 && sym.chars().all(|c| c.is_ascii_alphanumeric()) {
        terms.push(sym.to_ascii_lowercase());
    }
    terms.sort();
    terms.dedup();
    terms
}

/// Events whose primary title mentions the quote by name or ticker.
fn keyword_news(ctx: &DetectorContext<'_>, q: &MarketQuote) -> usize {
    let terms = quote_terms(q);
    if terms.is_empty() {
        return 0;
    }
    ctx.events
        .iter()
        .filter(|ev| {
            let line = word_line(&ev.primary_title);
            terms.iter().any(|t| contains_phrase(&line, t))
        })
        .count()
}

fn moved(q: &MarketQuote, threshold: f64) -> Option<f64> {
    q.change_percent.filter(|c| c.abs() >= threshold)
}

/// A large move with entity-linked coverage.
pub fn explained_market_move(ctx: &DetectorContext<'_>) -> Vec<CorrelationSignal> {
    let cfg = &ctx.config.signals;
    let mut out = Vec::new();
    for q in ctx.markets {
        let Some(change) = moved(q, cfg.market_move) else {
            continue;
        };
        let Some(refs) = entity_news(ctx, &q.symbol) else {
            continue;
        };
        if refs.is_empty() {
            continue;
        }
        let count = refs.len();
        let headlines: Vec<String> = refs.iter().take(3).map(|r| r.title.clone()).collect();
        ctx.emit(
            &mut out,
            Candidate {
                kind: SignalType::ExplainedMarketMove,
                subject: q.symbol.clone(),
                magnitude: change,
                title: format!("{} {:+.1}% with coverage", q.display, change),
                description: format!("{} moved {change:+.2}% alongside {count} related event(s)", q.name),
                confidence: (0.55 + 0.05 * count.min(5) as f64 + change.abs() / 40.0).min(0.95),
                data: SignalData::ExplainedMarketMove {
                    symbol: q.symbol.clone(),
                    market_change: change,
                    related_news: count,
                    headlines,
                },
            },
        );
    }
    out
}

/// A large move nobody is writing about. Any entity-linked coverage makes
/// the move explained, so the floor only counts keyword matches.
pub fn silent_divergence(ctx: &DetectorContext<'_>) -> Vec<CorrelationSignal> {
    let cfg = &ctx.config.signals;
    let mut out = Vec::new();
    for q in ctx.markets {
        let Some(change) = moved(q, cfg.market_move) else {
            continue;
        };
        let Some(refs) = entity_news(ctx, &q.symbol) else {
            continue;
        };
        if !refs.is_empty() {
            continue;
        }
        let related = keyword_news(ctx, q);
        if related >= cfg.silent_news_floor {
            continue;
        }
        ctx.emit(
            &mut out,
            Candidate {
                kind: SignalType::SilentDivergence,
                subject: q.symbol.clone(),
                magnitude: change,
                title: format!("Silent move: {} {:+.1}%", q.display, change),
                description: format!("{} moved {change:+.2}% with no related news", q.name),
                confidence: (0.55 + change.abs() / 20.0).min(0.9),
                data: SignalData::SilentDivergence {
                    symbol: q.symbol.clone(),
                    market_change: change,
                    related_news: related,
                },
            },
        );
    }
    out
}

/// An energy price rising with no supply story behind it.
pub fn flow_price_divergence(ctx: &DetectorContext<'_>) -> Vec<CorrelationSignal> {
    let energy = &ctx.config.energy;
    if any_flow_drop(ctx) {
        return Vec::new();
    }
    let mut out = Vec::new();
    for q in ctx.markets {
        if !energy.symbols.iter().any(|s| s.eq_ignore_ascii_case(&q.symbol)) {
            continue;
        }
        let Some(change) = q.change_percent.filter(|c| *c >= energy.rise_threshold) else {
            continue;
        };
        let Some(refs) = entity_news(ctx, &q.symbol) else {
            continue;
        };
        if !refs.is_empty() || keyword_news(ctx, q) > 0 {
            continue;
        }
        ctx.emit(
            &mut out,
            Candidate {
                kind: SignalType::FlowPriceDivergence,
                subject: q.symbol.clone(),
                magnitude: change,
                title: format!("{} up {:.1}% without a flow story", q.display, change),
                description: format!("{} rose {change:.2}% with no pipeline disruption or related news", q.name),
                confidence: (0.6 + change / 20.0).min(0.85),
                data: SignalData::FlowPriceDivergence {
                    symbol: q.symbol.clone(),
                    market_change: change,
                },
            },
        );
    }
    out
}

/// A hot topic whose linked markets have not reacted yet.
pub fn news_leads_markets(ctx: &DetectorContext<'_>) -> Vec<CorrelationSignal> {
    let cfg = &ctx.config.signals;
    let hot = 2.0 * cfg.news_velocity_floor;
    let calm = cfg.market_move / 2.0;
    let mut out = Vec::new();
    for (topic, symbols) in &ctx.config.topics.symbol_links {
        let topic = topic.trim().to_lowercase();
        let Some(&activity) = ctx.activity.get(&topic) else {
            continue;
        };
        if activity <= hot {
            continue;
        }
        for symbol in symbols {
            let Some(q) = ctx.markets.iter().find(|m| m.symbol.eq_ignore_ascii_case(symbol)) else {
                continue;
            };
            let Some(change) = q.change_percent.filter(|c| c.abs() < calm) else {
                continue;
            };
            ctx.emit(
                &mut out,
                Candidate {
                    kind: SignalType::NewsLeadsMarkets,
                    subject: format!("{topic}/{}", q.symbol),
                    magnitude: activity,
                    title: format!("News ahead of markets: {topic} vs {}", q.display),
                    description: format!(
                        "Topic activity {activity:.1} while {} moved only {change:+.2}%",
                        q.name
                    ),
                    confidence: (0.55 + activity / 40.0).min(0.85),
                    data: SignalData::NewsLeadsMarkets {
                        topic: topic.clone(),
                        activity,
                        symbol: q.symbol.clone(),
                        market_change: change,
                    },
                },
            );
        }
    }
    out
}
