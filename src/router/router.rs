//! Confidence-weighted provider selection with fallback.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

use super::context::{classify, ContextType};
use super::metrics::ProviderMetrics;
use super::{RouterError, RouterResult};
use crate::config::{Configuration, ProviderConfig};
use crate::provider::Message;

/// Latency (seconds) at which the latency factor reaches zero.
const LATENCY_CEILING_SECS: f64 = 30.0;

/// Confidence given to providers that have never been called.
const UNTESTED_CONFIDENCE: f64 = 0.8;

/// Confidence reported when selection falls back to the best provider overall.
pub const BEST_AVAILABLE_CONFIDENCE: f64 = 0.5;

/// Fallbacks only need this share of the rule's threshold.
const FALLBACK_THRESHOLD_FACTOR: f64 = 0.8;

/// Routing rule for one context type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingRule {
    pub context_type: ContextType,
    pub primary: String,
    pub fallbacks: Vec<String>,
    pub confidence_threshold: f64,
    pub max_retries: u32,
}

/// Outcome of a selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection {
    pub provider: String,
    pub model: String,
    pub confidence: f64,
    pub context_type: ContextType,
}

/// Snapshot of one provider for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStats {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub metrics: ProviderMetrics,
}

struct ProviderEntry {
    config: ProviderConfig,
    enabled: AtomicBool,
    metrics: Mutex<ProviderMetrics>,
}

impl ProviderEntry {
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn metrics(&self) -> ProviderMetrics {
        self.metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Static provider/context affinity.
fn context_weight(context: ContextType, provider: &str) -> f64 {
    match (context, provider) {
        (ContextType::CodeGeneration, "anthropic_claude_sonnet") => 1.2,
        (ContextType::CodeGeneration, "openai_gpt4") => 1.0,
        (ContextType::CodeGeneration, "openai_gpt4_turbo") => 0.9,
        (ContextType::DataAnalysis, "openai_gpt4") => 1.2,
        (ContextType::DataAnalysis, "anthropic_claude_sonnet") => 1.0,
        (ContextType::DataAnalysis, "openai_gpt4_turbo") => 1.1,
        (ContextType::CreativeWriting, "anthropic_claude_sonnet") => 1.3,
        (ContextType::CreativeWriting, "openai_gpt4_turbo") => 1.0,
        (ContextType::CreativeWriting, "openai_gpt4") => 0.9,
        _ => 1.0,
    }
}

/// `min(1, (success*0.4 + uptime*0.3 + latency*0.3) * weight)`, 0.8 when untested.
fn confidence(metrics: &ProviderMetrics, weight: f64) -> f64 {
    if metrics.is_untested() {
        return UNTESTED_CONFIDENCE;
    }

    let success = metrics.success_rate();
    let uptime = metrics.uptime_percentage / 100.0;
    let latency_secs = metrics.avg_latency_ms / 1000.0;
    let latency = (1.0 - latency_secs / LATENCY_CEILING_SECS).clamp(0.0, 1.0);

    ((success * 0.4 + uptime * 0.3 + latency * 0.3) * weight).min(1.0)
}

/// Picks a provider per turn and tracks how each one performs.
///
/// Providers keep configuration order; metrics sit behind one mutex per
/// provider, so recording an outcome never blocks other providers.
pub struct ProviderRouter {
    providers: Vec<ProviderEntry>,
    index: HashMap<String, usize>,
    rules: HashMap<ContextType, RoutingRule>,
}

impl std::fmt::Debug for ProviderRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRouter")
            .field("providers", &self.index.keys().collect::<Vec<_>>())
            .field("rules", &self.rules)
            .finish()
    }
}

impl ProviderRouter {
    /// Build a router from provider configs and routing rules.
    pub fn new(providers: Vec<ProviderConfig>, rules: Vec<RoutingRule>) -> RouterResult<Self> {
        let mut index = HashMap::new();
        let mut entries = Vec::with_capacity(providers.len());
        for config in providers {
            if index.contains_key(&config.id) {
                return Err(RouterError::DuplicateProvider(config.id));
            }
            index.insert(config.id.clone(), entries.len());
            entries.push(ProviderEntry {
                enabled: AtomicBool::new(config.enabled),
                metrics: Mutex::new(ProviderMetrics::default()),
                config,
            });
        }

        let mut rule_map = HashMap::new();
        for rule in rules {
            for id in std::iter::once(&rule.primary).chain(rule.fallbacks.iter()) {
                if !index.contains_key(id) {
                    return Err(RouterError::UnknownProvider(id.clone()));
                }
            }
            rule_map.insert(rule.context_type, rule);
        }

        Ok(Self {
            providers: entries,
            index,
            rules: rule_map,
        })
    }

    /// Build a router from the `[[providers]]` and `[routing.*]` sections.
    pub fn from_config(config: &Configuration) -> RouterResult<Self> {
        let mut rules = Vec::with_capacity(config.routing.len());
        for (key, rule) in &config.routing {
            rules.push(RoutingRule {
                context_type: key.parse()?,
                primary: rule.primary.clone(),
                fallbacks: rule.fallbacks.clone(),
                confidence_threshold: rule.confidence_threshold,
                max_retries: rule.max_retries,
            });
        }
        Self::new(config.providers.clone(), rules)
    }

    fn entry(&self, id: &str) -> Option<&ProviderEntry> {
        self.index.get(id).map(|&i| &self.providers[i])
    }

    /// Classify a message. See [`classify`].
    pub fn classify(&self, message: &str, history: &[Message]) -> ContextType {
        classify(message, history)
    }

    /// Enabled, and either never called or above 50% uptime.
    pub fn is_available(&self, id: &str) -> bool {
        self.entry(id).is_some_and(|entry| {
            if !entry.is_enabled() {
                return false;
            }
            let metrics = entry.metrics();
            metrics.is_untested() || metrics.uptime_percentage > 50.0
        })
    }

    /// Confidence in `id` for `context`. Unknown providers score 0.
    pub fn confidence(&self, id: &str, context: ContextType) -> f64 {
        match self.entry(id) {
            Some(entry) => confidence(&entry.metrics(), context_weight(context, id)),
            None => 0.0,
        }
    }

    fn selection(&self, entry: &ProviderEntry, confidence: f64, context: ContextType) -> Selection {
        Selection {
            provider: entry.config.id.clone(),
            model: entry.config.model.clone(),
            confidence,
            context_type: context,
        }
    }

    /// Choose a provider for `context`.
    ///
    /// Tries the rule's primary, then its fallbacks at a reduced threshold, then
    /// the best-scoring enabled provider with confidence
    /// [`BEST_AVAILABLE_CONFIDENCE`]. Contexts without a rule use the general
    /// rule.
    pub fn select(&self, context: ContextType, workspace_id: &str) -> RouterResult<Selection> {
        let rule = self
            .rules
            .get(&context)
            .or_else(|| self.rules.get(&ContextType::General));

        if let Some(rule) = rule {
            if let Some(entry) = self.entry(&rule.primary) {
                if self.is_available(&rule.primary) {
                    let c = self.confidence(&rule.primary, context);
                    if c >= rule.confidence_threshold {
                        tracing::info!(
                            workspace_id,
                            "Selected primary provider {} for {} (confidence {:.2})",
                            rule.primary,
                            context,
                            c
                        );
                        return Ok(self.selection(entry, c, context));
                    }
                }
            }

            let reduced = rule.confidence_threshold * FALLBACK_THRESHOLD_FACTOR;
            for fallback in &rule.fallbacks {
                let Some(entry) = self.entry(fallback) else {
                    continue;
                };
                if !self.is_available(fallback) {
                    continue;
                }
                let c = self.confidence(fallback, context);
                if c >= reduced {
                    tracing::info!(
                        workspace_id,
                        "Selected fallback provider {} for {} (confidence {:.2})",
                        fallback,
                        context,
                        c
                    );
                    return Ok(self.selection(entry, c, context));
                }
            }
        }

        let entry = self.best_available().ok_or(RouterError::NoProviderEnabled)?;
        tracing::warn!(
            workspace_id,
            "No rule provider qualified for {}, using best available {}",
            context,
            entry.config.id
        );
        Ok(self.selection(entry, BEST_AVAILABLE_CONFIDENCE, context))
    }

    /// Highest `success_rate * uptime` among enabled providers, first wins ties.
    /// Untested providers score the neutral default.
    fn best_available(&self) -> Option<&ProviderEntry> {
        let mut best: Option<(&ProviderEntry, f64)> = None;
        for entry in self.providers.iter().filter(|e| e.is_enabled()) {
            let metrics = entry.metrics();
            let score = if metrics.is_untested() {
                UNTESTED_CONFIDENCE
            } else {
                metrics.success_rate() * metrics.uptime_percentage / 100.0
            };
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((entry, score));
            }
        }
        best.map(|(entry, _)| entry)
    }

    /// Classify `message` and select a provider for it.
    pub fn route(
        &self,
        message: &str,
        history: &[Message],
        workspace_id: &str,
    ) -> RouterResult<Selection> {
        self.select(self.classify(message, history), workspace_id)
    }

    /// Record the outcome of one call. Unknown ids are ignored.
    pub fn record_outcome(&self, id: &str, success: bool, latency_ms: u64, tokens: u32) {
        let Some(entry) = self.entry(id) else {
            tracing::warn!("Outcome reported for unknown provider {}", id);
            return;
        };
        entry
            .metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(success, latency_ms, tokens, entry.config.cost_per_token);
    }

    /// Enable or disable a provider. Returns false for unknown ids.
    pub fn set_enabled(&self, id: &str, enabled: bool) -> bool {
        match self.entry(id) {
            Some(entry) => {
                entry.enabled.store(enabled, Ordering::Relaxed);
                tracing::info!("Provider {} enabled={}", id, enabled);
                true
            }
            None => false,
        }
    }

    pub fn metrics(&self, id: &str) -> Option<ProviderMetrics> {
        self.entry(id).map(ProviderEntry::metrics)
    }

    pub fn rule(&self, context: ContextType) -> Option<&RoutingRule> {
        self.rules.get(&context)
    }

    /// Config and metrics of every provider, in configuration order.
    pub fn performance_stats(&self) -> Vec<ProviderStats> {
        self.providers
            .iter()
            .map(|entry| ProviderStats {
                id: entry.config.id.clone(),
                name: entry.config.name.clone(),
                enabled: entry.is_enabled(),
                metrics: entry.metrics(),
            })
            .collect()
    }
}
