//! Metrics Collector
//!
//! Turns host performance entries into Core Web Vitals. FCP, LCP, FID and
//! TTFB keep their first observation; CLS is the largest session window.
//! Threshold breaches go into a capped alert log and out to subscribers.

use std::collections::{HashSet, VecDeque};

use pageflow_dom::{Notification, Subscribable, SubscriptionToken, Subscriptions};
use serde::{Deserialize, Serialize};

use crate::alert::AlertLog;
use crate::config::check_positive;
use crate::error::ConfigError;

/// Sessions retained for inspection
const SESSION_HISTORY: usize = 16;

/// Core Web Vital
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Fcp,
    Lcp,
    Cls,
    Fid,
    Ttfb,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fcp => "fcp",
            Self::Lcp => "lcp",
            Self::Cls => "cls",
            Self::Fid => "fid",
            Self::Ttfb => "ttfb",
        }
    }
}

/// Host performance entry
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "entryType", rename_all = "kebab-case")]
pub enum PerformanceEntry {
    #[serde(rename_all = "camelCase")]
    Paint { name: String, start_time: f64 },
    #[serde(rename_all = "camelCase")]
    LargestContentfulPaint { start_time: f64 },
    #[serde(rename_all = "camelCase")]
    LayoutShift {
        value: f64,
        start_time: f64,
        #[serde(default)]
        had_recent_input: bool,
    },
    #[serde(rename_all = "camelCase")]
    FirstInput { start_time: f64, processing_start: f64 },
    #[serde(rename_all = "camelCase")]
    Navigation { response_start: f64 },
}

/// Alert thresholds (ms, CLS unitless)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricThresholds {
    pub fcp: f64,
    pub lcp: f64,
    pub cls: f64,
    pub fid: f64,
    pub ttfb: f64,
}

impl Default for MetricThresholds {
    fn default() -> Self {
        Self {
            fcp: 3000.0,
            lcp: 4000.0,
            cls: 0.25,
            fid: 300.0,
            ttfb: 1800.0,
        }
    }
}

impl MetricThresholds {
    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Fcp => self.fcp,
            Metric::Lcp => self.lcp,
            Metric::Cls => self.cls,
            Metric::Fid => self.fid,
            Metric::Ttfb => self.ttfb,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_positive("thresholds.fcp", self.fcp)?;
        check_positive("thresholds.lcp", self.lcp)?;
        check_positive("thresholds.cls", self.cls)?;
        check_positive("thresholds.fid", self.fid)?;
        check_positive("thresholds.ttfb", self.ttfb)
    }
}

/// Point-in-time vitals
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub fcp: Option<f64>,
    pub lcp: Option<f64>,
    pub cls: f64,
    pub fid: Option<f64>,
    pub ttfb: Option<f64>,
    pub captured_at: f64,
}

impl MetricsSnapshot {
    pub fn value(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Fcp => self.fcp,
            Metric::Lcp => self.lcp,
            Metric::Cls => Some(self.cls),
            Metric::Fid => self.fid,
            Metric::Ttfb => self.ttfb,
        }
    }
}

/// Threshold breach
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricAlert {
    pub metric: Metric,
    pub value: f64,
    pub threshold: f64,
    pub at_ms: f64,
}

/// Layout shifts grouped into one window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClsSession {
    pub start_ms: f64,
    pub last_ms: f64,
    pub value: f64,
    pub shifts: u32,
}

#[derive(Debug)]
pub struct MetricsCollector {
    thresholds: MetricThresholds,
    session_gap_ms: f64,
    session_max_ms: f64,
    fcp: Option<f64>,
    lcp: Option<f64>,
    fid: Option<f64>,
    ttfb: Option<f64>,
    current_session: Option<ClsSession>,
    sessions: VecDeque<ClsSession>,
    cls: f64,
    alerts: AlertLog<MetricAlert>,
    /// Metrics that have alerted once already
    breached: HashSet<Metric>,
    subscribers: Subscriptions<()>,
    pending: Vec<Notification<MetricAlert>>,
}

impl MetricsCollector {
    pub fn new(thresholds: MetricThresholds, session_gap_ms: f64, session_max_ms: f64, alert_capacity: usize) -> Self {
        Self {
            thresholds,
            session_gap_ms,
            session_max_ms,
            fcp: None,
            lcp: None,
            fid: None,
            ttfb: None,
            current_session: None,
            sessions: VecDeque::with_capacity(SESSION_HISTORY),
            cls: 0.0,
            alerts: AlertLog::new(alert_capacity),
            breached: HashSet::new(),
            subscribers: Subscriptions::new(),
            pending: Vec::new(),
        }
    }

    /// Record an entry; returns the alert it raised, if any
    pub fn record(&mut self, entry: &PerformanceEntry, now_ms: f64) -> Option<MetricAlert> {
        match *entry {
            PerformanceEntry::Paint { ref name, start_time } => {
                if name == "first-contentful-paint" && self.fcp.is_none() {
                    self.fcp = Some(start_time);
                    return self.check(Metric::Fcp, start_time, now_ms);
                }
                None
            }
            PerformanceEntry::LargestContentfulPaint { start_time } => {
                if self.lcp.is_none() {
                    self.lcp = Some(start_time);
                    return self.check(Metric::Lcp, start_time, now_ms);
                }
                None
            }
            PerformanceEntry::FirstInput { start_time, processing_start } => {
                if self.fid.is_none() {
                    let delay = (processing_start - start_time).max(0.0);
                    self.fid = Some(delay);
                    return self.check(Metric::Fid, delay, now_ms);
                }
                None
            }
            PerformanceEntry::Navigation { response_start } => {
                if self.ttfb.is_none() {
                    self.ttfb = Some(response_start);
                    return self.check(Metric::Ttfb, response_start, now_ms);
                }
                None
            }
            PerformanceEntry::LayoutShift { value, start_time, had_recent_input } => {
                if had_recent_input {
                    return None;
                }
                self.record_shift(value, start_time);
                self.check(Metric::Cls, self.cls, now_ms)
            }
        }
    }

    fn record_shift(&mut self, value: f64, time_ms: f64) {
        let joins = self.current_session.is_some_and(|s| {
            time_ms - s.last_ms < self.session_gap_ms && time_ms - s.start_ms < self.session_max_ms
        });

        match self.current_session.as_mut() {
            Some(session) if joins => {
                session.last_ms = time_ms;
                session.value += value;
                session.shifts += 1;
            }
            _ => {
                if let Some(closed) = self.current_session.take() {
                    self.push_session(closed);
                }
                self.current_session = Some(ClsSession {
                    start_ms: time_ms,
                    last_ms: time_ms,
                    value,
                    shifts: 1,
                });
            }
        }

        if let Some(session) = self.current_session {
            self.cls = self.cls.max(session.value);
        }
    }

    fn push_session(&mut self, session: ClsSession) {
        if self.sessions.len() == SESSION_HISTORY {
            self.sessions.pop_front();
        }
        self.sessions.push_back(session);
    }

    fn check(&mut self, metric: Metric, value: f64, now_ms: f64) -> Option<MetricAlert> {
        let threshold = self.thresholds.get(metric);
        if value <= threshold || !self.breached.insert(metric) {
            return None;
        }

        let alert = MetricAlert {
            metric,
            value,
            threshold,
            at_ms: now_ms,
        };
        tracing::warn!("{} = {:.3} exceeds threshold {}", metric.as_str(), value, threshold);
        self.alerts.push(alert);
        for (token, _) in self.subscribers.iter() {
            self.pending.push(Notification { token, event: alert });
        }
        Some(alert)
    }

    pub fn snapshot(&self, now_ms: f64) -> MetricsSnapshot {
        MetricsSnapshot {
            fcp: self.fcp,
            lcp: self.lcp,
            cls: self.cls,
            fid: self.fid,
            ttfb: self.ttfb,
            captured_at: now_ms,
        }
    }

    /// Metrics whose latest value exceeds the threshold
    pub fn active_alerts(&self) -> Vec<Metric> {
        let snapshot = self.snapshot(0.0);
        [Metric::Fcp, Metric::Lcp, Metric::Cls, Metric::Fid, Metric::Ttfb]
            .into_iter()
            .filter(|&m| snapshot.value(m).is_some_and(|v| v > self.thresholds.get(m)))
            .collect()
    }

    pub fn has_active_alert(&self) -> bool {
        !self.active_alerts().is_empty()
    }

    pub fn cls(&self) -> f64 {
        self.cls
    }

    /// Closed sessions (most recent retained) followed by the open one
    pub fn sessions(&self) -> Vec<ClsSession> {
        self.sessions.iter().copied().chain(self.current_session).collect()
    }

    pub fn alerts(&self) -> Vec<MetricAlert> {
        self.alerts.entries()
    }

    pub fn alert_total(&self) -> u64 {
        self.alerts.total()
    }

    pub fn thresholds(&self) -> &MetricThresholds {
        &self.thresholds
    }
}

impl Subscribable<MetricAlert> for MetricsCollector {
    type Interest = ();

    fn subscribe(&mut self, _interest: ()) -> SubscriptionToken {
        self.subscribers.insert(())
    }

    fn unsubscribe(&mut self, token: SubscriptionToken) -> bool {
        self.pending.retain(|n| n.token != token);
        self.subscribers.remove(token).is_some()
    }

    fn take_notifications(&mut self) -> Vec<Notification<MetricAlert>> {
        std::mem::take(&mut self.pending)
    }
}
