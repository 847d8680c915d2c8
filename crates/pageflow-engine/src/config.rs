//! Engine configuration
//!
//! Every tunable with its default. Deserializes from partial JSON (missing
//! fields keep their defaults) and is validated once at construction.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::metrics::MetricThresholds;
use crate::resource::Priority;
use crate::scheduler::ScheduleParams;
use crate::strategy::StrategyMode;

/// Upper bound for every millisecond setting (one day)
pub const MAX_INTERVAL_MS: f64 = 86_400_000.0;

/// 1x1 transparent GIF shown in place of deferred images
pub const DEFAULT_PLACEHOLDER: &str =
    "data:image/gif;base64,R0lGODlhAQABAIAAAAAAAP///yH5BAEAAAAALAAAAAABAAEAAAIBRAA7";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Preloads in flight (Balanced / DataSaving)
    pub preload_limit: usize,
    /// Preloads in flight in Optimal mode
    pub optimal_preload_limit: usize,
    /// Prefetches in flight (Balanced)
    pub prefetch_batch: usize,
    /// Prefetches in flight in Optimal mode
    pub optimal_prefetch_batch: usize,
    /// Delay after the page load signal before prefetching starts
    pub prefetch_delay_ms: f64,
    /// Viewport margin for lazy loading
    pub lazy_margin_px: f64,
    /// Lazy margin while saving data
    pub data_saving_margin_px: f64,
    /// Minimum visible fraction that triggers a lazy load
    pub lazy_min_ratio: f64,
    pub strategy_tick_ms: f64,
    pub report_interval_ms: f64,
    /// Capability probe budget at initialization
    pub probe_timeout_ms: f64,
    /// Memory cache entries when no background cache is usable
    pub memory_cache_capacity: usize,
    /// Elements classified per idle slice for large mutation batches
    pub classify_chunk_size: usize,
    /// Same-origin pages hinted in Optimal mode
    pub speculative_prefetch_limit: usize,
    pub placeholder_src: String,
    pub thresholds: MetricThresholds,
    /// CLS session: max gap between shifts
    pub cls_session_gap_ms: f64,
    /// CLS session: max total age
    pub cls_session_max_ms: f64,
    /// Retained alerts per log
    pub alert_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            preload_limit: 5,
            optimal_preload_limit: 8,
            prefetch_batch: 3,
            optimal_prefetch_batch: 10,
            prefetch_delay_ms: 2000.0,
            lazy_margin_px: 50.0,
            data_saving_margin_px: 200.0,
            lazy_min_ratio: 0.01,
            strategy_tick_ms: 30_000.0,
            report_interval_ms: 30_000.0,
            probe_timeout_ms: 1000.0,
            memory_cache_capacity: 50,
            classify_chunk_size: 50,
            speculative_prefetch_limit: 3,
            placeholder_src: DEFAULT_PLACEHOLDER.to_string(),
            thresholds: MetricThresholds::default(),
            cls_session_gap_ms: 1000.0,
            cls_session_max_ms: 5000.0,
            alert_capacity: 50,
        }
    }
}

impl EngineConfig {
    /// Parse and validate
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_count("preload_limit", self.preload_limit)?;
        check_count("optimal_preload_limit", self.optimal_preload_limit)?;
        check_count("prefetch_batch", self.prefetch_batch)?;
        check_count("optimal_prefetch_batch", self.optimal_prefetch_batch)?;
        check_count("memory_cache_capacity", self.memory_cache_capacity)?;
        check_count("classify_chunk_size", self.classify_chunk_size)?;
        check_count("alert_capacity", self.alert_capacity)?;

        check_non_negative("prefetch_delay_ms", self.prefetch_delay_ms)?;
        check_non_negative("lazy_margin_px", self.lazy_margin_px)?;
        check_non_negative("data_saving_margin_px", self.data_saving_margin_px)?;
        check_positive("strategy_tick_ms", self.strategy_tick_ms)?;
        check_positive("report_interval_ms", self.report_interval_ms)?;
        check_positive("probe_timeout_ms", self.probe_timeout_ms)?;
        check_positive("cls_session_gap_ms", self.cls_session_gap_ms)?;
        check_positive("cls_session_max_ms", self.cls_session_max_ms)?;
        for (field, value) in [
            ("prefetch_delay_ms", self.prefetch_delay_ms),
            ("strategy_tick_ms", self.strategy_tick_ms),
            ("report_interval_ms", self.report_interval_ms),
            ("probe_timeout_ms", self.probe_timeout_ms),
            ("cls_session_gap_ms", self.cls_session_gap_ms),
            ("cls_session_max_ms", self.cls_session_max_ms),
        ] {
            check_interval(field, value)?;
        }

        if !(self.lazy_min_ratio > 0.0 && self.lazy_min_ratio <= 1.0) {
            return Err(ConfigError::OutOfRange {
                field: "lazy_min_ratio",
                value: self.lazy_min_ratio.to_string(),
                expected: "0 < ratio <= 1",
            });
        }
        if self.cls_session_gap_ms > self.cls_session_max_ms {
            return Err(ConfigError::OutOfRange {
                field: "cls_session_gap_ms",
                value: self.cls_session_gap_ms.to_string(),
                expected: "<= cls_session_max_ms",
            });
        }
        if self.placeholder_src.trim().is_empty() {
            return Err(ConfigError::OutOfRange {
                field: "placeholder_src",
                value: "\"\"".into(),
                expected: "a non-empty URL",
            });
        }
        self.thresholds.validate()
    }

    /// Scheduler parameters for a strategy mode
    pub fn schedule_params(&self, mode: StrategyMode) -> ScheduleParams {
        match mode {
            StrategyMode::DataSaving => ScheduleParams {
                preload_limit: self.preload_limit,
                preload_min_priority: Priority::High,
                prefetch_enabled: false,
                prefetch_batch: self.prefetch_batch,
                lazy_margin_px: self.data_saving_margin_px,
            },
            StrategyMode::Balanced => ScheduleParams {
                preload_limit: self.preload_limit,
                preload_min_priority: Priority::Medium,
                prefetch_enabled: true,
                prefetch_batch: self.prefetch_batch,
                lazy_margin_px: self.lazy_margin_px,
            },
            StrategyMode::Optimal => ScheduleParams {
                preload_limit: self.optimal_preload_limit,
                preload_min_priority: Priority::Medium,
                prefetch_enabled: true,
                prefetch_batch: self.optimal_prefetch_batch,
                lazy_margin_px: self.lazy_margin_px,
            },
        }
    }
}

fn check_count(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::OutOfRange {
            field,
            value: value.to_string(),
            expected: ">= 1",
        });
    }
    Ok(())
}

pub(crate) fn check_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(value.is_finite() && value > 0.0) {
        return Err(ConfigError::OutOfRange {
            field,
            value: value.to_string(),
            expected: "a finite value > 0",
        });
    }
    Ok(())
}

fn check_interval(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > MAX_INTERVAL_MS {
        return Err(ConfigError::OutOfRange {
            field,
            value: value.to_string(),
            expected: "at most one day (86400000 ms)",
        });
    }
    Ok(())
}

fn check_non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(value.is_finite() && value >= 0.0) {
        return Err(ConfigError::OutOfRange {
            field,
            value: value.to_string(),
            expected: "a finite value >= 0",
        });
    }
    Ok(())
}
