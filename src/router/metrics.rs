//! Rolling performance metrics per provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Running totals for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Mean wall-clock latency over all requests
    pub avg_latency_ms: f64,
    /// Mean token usage over successful requests that reported tokens
    pub avg_tokens_per_request: f64,
    /// Successful requests that reported a token count
    #[serde(default)]
    pub token_reports: u64,
    pub total_cost: f64,
    /// Percentage of successful requests, 100 until the first call
    pub uptime_percentage: f64,
    pub last_used: Option<DateTime<Utc>>,
}

impl Default for ProviderMetrics {
    fn default() -> Self {
        Self {
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            avg_latency_ms: 0.0,
            avg_tokens_per_request: 0.0,
            token_reports: 0,
            total_cost: 0.0,
            uptime_percentage: 100.0,
            last_used: None,
        }
    }
}

impl ProviderMetrics {
    pub fn is_untested(&self) -> bool {
        self.total_requests == 0
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.successful_requests as f64 / self.total_requests as f64
    }

    /// Fold one call outcome into the running totals.
    pub fn record(&mut self, success: bool, latency_ms: u64, tokens: u32, cost_per_token: f64) {
        self.total_requests += 1;
        if success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }

        let n = self.total_requests as f64;
        self.avg_latency_ms = (self.avg_latency_ms * (n - 1.0) + latency_ms as f64) / n;

        if success && tokens > 0 {
            self.token_reports += 1;
            let r = self.token_reports as f64;
            self.avg_tokens_per_request =
                (self.avg_tokens_per_request * (r - 1.0) + tokens as f64) / r;
            self.total_cost += tokens as f64 * cost_per_token;
        }

        self.uptime_percentage =
            100.0 * self.successful_requests as f64 / self.total_requests as f64;
        self.last_used = Some(Utc::now());
    }
}
