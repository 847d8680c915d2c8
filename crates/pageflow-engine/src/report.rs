//! Performance report

use pageflow_net::CacheStats;
use serde::Serialize;

use crate::metrics::{Metric, MetricThresholds, MetricsSnapshot};
use crate::registry::Registry;
use crate::resource::LoadState;
use crate::strategy::StrategyMode;

/// Requests needed before a low hit ratio is worth mentioning
const MIN_REQUESTS_FOR_CACHE_ADVICE: u64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub resource_count: usize,
    pub cache_hit_ratio: f64,
    pub average_load_time_ms: f64,
    pub core_web_vitals: MetricsSnapshot,
    pub recommendations: Vec<String>,
    pub strategy_mode: StrategyMode,
    pub failed_count: usize,
    pub alert_count: u64,
    pub generated_at_ms: f64,
}

/// Everything a report is derived from
pub struct ReportInputs<'a> {
    pub registry: &'a Registry,
    pub cache: CacheStats,
    pub vitals: MetricsSnapshot,
    pub thresholds: &'a MetricThresholds,
    pub mode: StrategyMode,
    pub alert_count: u64,
    pub now_ms: f64,
}

impl Report {
    pub fn build(inputs: ReportInputs<'_>) -> Self {
        let registry = inputs.registry;

        let durations: Vec<f64> = registry
            .iter()
            .filter(|r| r.state == LoadState::Loaded)
            .filter_map(|r| r.load_duration_ms)
            .collect();
        let average_load_time_ms = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<f64>() / durations.len() as f64
        };
        let failed_count = registry.iter().filter(|r| r.state.is_failed()).count();

        let mut report = Self {
            resource_count: registry.len(),
            cache_hit_ratio: inputs.cache.hit_ratio(),
            average_load_time_ms,
            core_web_vitals: inputs.vitals,
            recommendations: Vec::new(),
            strategy_mode: inputs.mode,
            failed_count,
            alert_count: inputs.alert_count,
            generated_at_ms: inputs.now_ms,
        };
        report.recommendations = recommendations(&report, &inputs.cache, inputs.thresholds);
        report
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn recommendations(report: &Report, cache: &CacheStats, thresholds: &MetricThresholds) -> Vec<String> {
    let vitals = &report.core_web_vitals;
    let over = |metric: Metric| {
        vitals
            .value(metric)
            .filter(|&v| v > thresholds.get(metric))
    };

    let mut advice = Vec::new();
    if let Some(lcp) = over(Metric::Lcp) {
        advice.push(format!(
            "Largest contentful paint took {:.0} ms; mark the hero resource with fetchpriority=\"high\"",
            lcp
        ));
    }
    if let Some(fcp) = over(Metric::Fcp) {
        advice.push(format!(
            "First contentful paint took {:.0} ms; reduce render-blocking stylesheets and scripts",
            fcp
        ));
    }
    if let Some(cls) = over(Metric::Cls) {
        advice.push(format!(
            "Layout shift score is {:.3}; reserve space for images and embeds",
            cls
        ));
    }
    if let Some(fid) = over(Metric::Fid) {
        advice.push(format!("First input waited {:.0} ms; break up long-running scripts", fid));
    }
    if let Some(ttfb) = over(Metric::Ttfb) {
        advice.push(format!("Server responded after {:.0} ms; cache documents closer to users", ttfb));
    }
    if cache.hits + cache.misses >= MIN_REQUESTS_FOR_CACHE_ADVICE && report.cache_hit_ratio < 0.5 {
        advice.push(format!(
            "Cache hit ratio is {:.0}%; serve static assets with long-lived cache headers",
            report.cache_hit_ratio * 100.0
        ));
    }
    if report.failed_count > 0 {
        advice.push(format!("{} resources failed to load; check their URLs", report.failed_count));
    }
    if report.strategy_mode == StrategyMode::DataSaving {
        advice.push("Running in data-saving mode; keep critical assets small".to_string());
    }
    advice
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::ResourceRef;
    use crate::registry::Classification;
    use pageflow_net::ResourceType;

    fn inputs<'a>(registry: &'a Registry, thresholds: &'a MetricThresholds) -> ReportInputs<'a> {
        ReportInputs {
            registry,
            cache: CacheStats::default(),
            vitals: MetricsSnapshot::default(),
            thresholds,
            mode: StrategyMode::Balanced,
            alert_count: 0,
            now_ms: 100.0,
        }
    }

    #[test]
    fn test_counts_and_average() {
        let mut registry = Registry::with_base("https://a.test/").unwrap();
        for (name, duration, state) in [
            ("a.js", Some(100.0), LoadState::Loaded),
            ("b.js", Some(300.0), LoadState::Loaded),
            ("c.js", None, LoadState::Failed),
            ("d.js", Some(0.0), LoadState::Cached),
        ] {
            let id = registry
                .register(ResourceRef::new(name, ResourceType::Script), 0.0, Classification::default)
                .unwrap()
                .id();
            let resource = registry.get_mut(id).unwrap();
            resource.load_duration_ms = duration;
            resource.state = state;
        }

        let thresholds = MetricThresholds::default();
        let report = Report::build(inputs(&registry, &thresholds));
        assert_eq!(report.resource_count, 4);
        assert_eq!(report.failed_count, 1);
        assert_eq!(report.average_load_time_ms, 200.0);
        assert_eq!(report.recommendations.len(), 1);
    }

    #[test]
    fn test_json_shape() {
        let registry = Registry::new();
        let thresholds = MetricThresholds::default();
        let mut inputs = inputs(&registry, &thresholds);
        inputs.vitals.lcp = Some(5000.0);
        inputs.mode = StrategyMode::DataSaving;

        let report = Report::build(inputs);
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        for key in [
            "resourceCount",
            "cacheHitRatio",
            "averageLoadTimeMs",
            "coreWebVitals",
            "recommendations",
            "strategyMode",
            "failedCount",
            "alertCount",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["strategyMode"], "data-saving");
        assert_eq!(json["coreWebVitals"]["lcp"], 5000.0);
        assert_eq!(json["coreWebVitals"]["fcp"], serde_json::Value::Null);
        assert_eq!(report.recommendations.len(), 2);
    }
}
