//! Adaptive Strategy Controller
//!
//! Picks the operating mode from connection class and vitals:
//! slow network or poor LCP/CLS → DataSaving, fast with no active alert →
//! Optimal, Balanced otherwise.

use std::collections::VecDeque;

use pageflow_net::ConnectionClass;
use serde::Serialize;

use crate::metrics::{MetricThresholds, MetricsSnapshot};

const TRANSITION_HISTORY: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyMode {
    DataSaving,
    #[default]
    Balanced,
    Optimal,
}

impl StrategyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataSaving => "data-saving",
            Self::Balanced => "balanced",
            Self::Optimal => "optimal",
        }
    }
}

impl std::fmt::Display for StrategyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a decision is based on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrategyInputs {
    pub connection: ConnectionClass,
    pub metrics: MetricsSnapshot,
    /// Any metric currently over its threshold
    pub active_alert: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub from: StrategyMode,
    pub to: StrategyMode,
    pub at_ms: f64,
}

/// Mode for the given inputs
pub fn decide(inputs: &StrategyInputs, thresholds: &MetricThresholds) -> StrategyMode {
    let poor_lcp = inputs.metrics.lcp.is_some_and(|lcp| lcp > thresholds.lcp);
    let poor_cls = inputs.metrics.cls > thresholds.cls;

    if inputs.connection == ConnectionClass::Slow || poor_lcp || poor_cls {
        StrategyMode::DataSaving
    } else if !inputs.active_alert {
        StrategyMode::Optimal
    } else {
        StrategyMode::Balanced
    }
}

#[derive(Debug)]
pub struct StrategyController {
    mode: StrategyMode,
    thresholds: MetricThresholds,
    transitions: u64,
    evaluations: u64,
    history: VecDeque<Transition>,
}

impl StrategyController {
    pub fn new(thresholds: MetricThresholds) -> Self {
        Self {
            mode: StrategyMode::default(),
            thresholds,
            transitions: 0,
            evaluations: 0,
            history: VecDeque::with_capacity(TRANSITION_HISTORY),
        }
    }

    pub fn mode(&self) -> StrategyMode {
        self.mode
    }

    /// Re-evaluate; returns the transition when the mode changed
    pub fn evaluate(&mut self, inputs: &StrategyInputs, now_ms: f64) -> Option<Transition> {
        self.evaluations += 1;
        let next = decide(inputs, &self.thresholds);
        if next == self.mode {
            return None;
        }

        let transition = Transition {
            from: self.mode,
            to: next,
            at_ms: now_ms,
        };
        self.mode = next;
        self.transitions += 1;
        if self.history.len() == TRANSITION_HISTORY {
            self.history.pop_front();
        }
        self.history.push_back(transition);

        tracing::info!(
            "Strategy {} -> {} (connection {:?}, lcp {:?}, cls {:.3})",
            transition.from,
            transition.to,
            inputs.connection,
            inputs.metrics.lcp,
            inputs.metrics.cls
        );
        Some(transition)
    }

    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    pub fn history(&self) -> Vec<Transition> {
        self.history.iter().copied().collect()
    }
}
