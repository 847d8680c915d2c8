//! Network Condition Monitor
//!
//! Samples connection quality and classifies it as slow or fast.
//! Subscribers only hear about classification changes, not every sample.

use pageflow_dom::{Notification, Subscribable, SubscriptionToken, Subscriptions};
use serde::{Deserialize, Serialize};

/// Downlink below this is treated as a slow connection
pub const SLOW_DOWNLINK_MBPS: f64 = 0.5;

/// Effective connection type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EffectiveType {
    #[serde(rename = "slow-2g")]
    Slow2G,
    #[serde(rename = "2g")]
    TwoG,
    #[serde(rename = "3g")]
    ThreeG,
    #[default]
    #[serde(rename = "4g")]
    FourG,
}

impl EffectiveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Slow2G => "slow-2g",
            Self::TwoG => "2g",
            Self::ThreeG => "3g",
            Self::FourG => "4g",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "slow-2g" => Some(Self::Slow2G),
            "2g" => Some(Self::TwoG),
            "3g" => Some(Self::ThreeG),
            "4g" => Some(Self::FourG),
            _ => None,
        }
    }

    /// Estimate effective type from RTT and downlink
    pub fn estimate(rtt_ms: u32, downlink_mbps: f64) -> Self {
        if rtt_ms >= 2000 || downlink_mbps < 0.05 {
            Self::Slow2G
        } else if rtt_ms >= 1400 || downlink_mbps < 0.07 {
            Self::TwoG
        } else if rtt_ms >= 270 || downlink_mbps < 1.5 {
            Self::ThreeG
        } else {
            Self::FourG
        }
    }
}

/// Point-in-time connection sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkProfile {
    pub effective_type: EffectiveType,
    pub downlink_mbps: f64,
    pub rtt_ms: u32,
    pub save_data: bool,
}

impl Default for NetworkProfile {
    fn default() -> Self {
        Self {
            effective_type: EffectiveType::FourG,
            downlink_mbps: 10.0,
            rtt_ms: 50,
            save_data: false,
        }
    }
}

impl NetworkProfile {
    /// Profile for a host that only reports raw measurements
    pub fn from_measurements(downlink_mbps: f64, rtt_ms: u32, save_data: bool) -> Self {
        Self {
            effective_type: EffectiveType::estimate(rtt_ms, downlink_mbps),
            downlink_mbps,
            rtt_ms,
            save_data,
        }
    }

    pub fn with_effective_type(mut self, effective_type: EffectiveType) -> Self {
        self.effective_type = effective_type;
        self
    }

    pub fn classify(&self) -> ConnectionClass {
        let slow_type = matches!(self.effective_type, EffectiveType::Slow2G | EffectiveType::TwoG);
        if slow_type || self.downlink_mbps < SLOW_DOWNLINK_MBPS || self.save_data {
            ConnectionClass::Slow
        } else {
            ConnectionClass::Fast
        }
    }
}

/// Connection classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionClass {
    Slow,
    Fast,
}

/// Emitted when the classification flips
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkChange {
    pub from: ConnectionClass,
    pub to: ConnectionClass,
    pub profile: NetworkProfile,
}

/// Network condition monitor
#[derive(Debug)]
pub struct NetworkMonitor {
    profile: NetworkProfile,
    class: ConnectionClass,
    samples: u64,
    subscribers: Subscriptions<()>,
    pending: Vec<Notification<NetworkChange>>,
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(NetworkProfile::default())
    }
}

impl NetworkMonitor {
    /// Start from the startup sample
    pub fn new(initial: NetworkProfile) -> Self {
        Self {
            profile: initial,
            class: initial.classify(),
            samples: 1,
            subscribers: Subscriptions::new(),
            pending: Vec::new(),
        }
    }

    pub fn profile(&self) -> NetworkProfile {
        self.profile
    }

    pub fn class(&self) -> ConnectionClass {
        self.class
    }

    pub fn is_slow(&self) -> bool {
        self.class == ConnectionClass::Slow
    }

    pub fn sample_count(&self) -> u64 {
        self.samples
    }

    /// Record a new sample; returns the change if the classification flipped
    pub fn sample(&mut self, profile: NetworkProfile) -> Option<NetworkChange> {
        self.samples += 1;
        self.profile = profile;

        let class = profile.classify();
        if class == self.class {
            return None;
        }

        let change = NetworkChange {
            from: self.class,
            to: class,
            profile,
        };
        self.class = class;
        tracing::info!(
            "Connection reclassified {:?} -> {:?} ({}, {:.2} Mbps, save-data {})",
            change.from,
            change.to,
            profile.effective_type.as_str(),
            profile.downlink_mbps,
            profile.save_data
        );

        for (token, _) in self.subscribers.iter() {
            self.pending.push(Notification { token, event: change });
        }
        Some(change)
    }
}

impl Subscribable<NetworkChange> for NetworkMonitor {
    type Interest = ();

    fn subscribe(&mut self, _interest: ()) -> SubscriptionToken {
        self.subscribers.insert(())
    }

    fn unsubscribe(&mut self, token: SubscriptionToken) -> bool {
        self.pending.retain(|n| n.token != token);
        self.subscribers.remove(token).is_some()
    }

    fn take_notifications(&mut self) -> Vec<Notification<NetworkChange>> {
        std::mem::take(&mut self.pending)
    }
}
