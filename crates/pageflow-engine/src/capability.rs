//! Host capability resolution
//!
//! Probed once at startup. Without visibility and timing instrumentation
//! the engine falls back to loading everything immediately.

use std::time::{Duration, Instant};

/// Instrumentation the host offers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostFeatures {
    pub intersection_observer: bool,
    pub performance_timing: bool,
    /// Optional: without it the default 4g profile is assumed
    pub network_information: bool,
}

impl HostFeatures {
    pub fn full() -> Self {
        Self {
            intersection_observer: true,
            performance_timing: true,
            network_information: true,
        }
    }

    pub fn none() -> Self {
        Self {
            intersection_observer: false,
            performance_timing: false,
            network_information: false,
        }
    }

    fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.intersection_observer {
            missing.push("intersection observation");
        }
        if !self.performance_timing {
            missing.push("performance timing");
        }
        missing
    }
}

/// Host feature detection
pub trait CapabilityProbe {
    fn probe(&mut self) -> Result<HostFeatures, String>;
}

/// Probe answering with a fixed feature set
#[derive(Debug, Clone, Copy)]
pub struct StaticProbe(pub HostFeatures);

impl StaticProbe {
    pub fn full() -> Self {
        Self(HostFeatures::full())
    }
}

impl CapabilityProbe for StaticProbe {
    fn probe(&mut self) -> Result<HostFeatures, String> {
        Ok(self.0)
    }
}

/// Resolved capability set
#[derive(Debug, Clone, PartialEq)]
pub enum Capabilities {
    Supported(HostFeatures),
    Unsupported { reason: String },
}

impl Capabilities {
    /// Run the probe; answers slower than `timeout` count as unsupported
    pub fn resolve(probe: &mut dyn CapabilityProbe, timeout: Duration) -> Self {
        let started = Instant::now();
        let result = probe.probe();
        let elapsed = started.elapsed();

        let capabilities = match result {
            _ if elapsed > timeout => Self::Unsupported {
                reason: format!("capability probe took {:?} (limit {:?})", elapsed, timeout),
            },
            Err(e) => Self::Unsupported {
                reason: format!("capability probe failed: {}", e),
            },
            Ok(features) => {
                let missing = features.missing();
                if missing.is_empty() {
                    Self::Supported(features)
                } else {
                    Self::Unsupported {
                        reason: format!("host lacks {}", missing.join(" and ")),
                    }
                }
            }
        };

        match &capabilities {
            Self::Supported(_) => tracing::debug!("Host capabilities supported"),
            Self::Unsupported { reason } => {
                tracing::warn!("{}; loading all resources immediately", reason)
            }
        }
        capabilities
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, Self::Supported(_))
    }

    pub fn has_network_information(&self) -> bool {
        matches!(self, Self::Supported(f) if f.network_information)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingProbe;

    impl CapabilityProbe for FailingProbe {
        fn probe(&mut self) -> Result<HostFeatures, String> {
            Err("sandboxed frame".into())
        }
    }

    struct SlowProbe;

    impl CapabilityProbe for SlowProbe {
        fn probe(&mut self) -> Result<HostFeatures, String> {
            std::thread::sleep(Duration::from_millis(30));
            Ok(HostFeatures::full())
        }
    }

    const LIMIT: Duration = Duration::from_millis(1000);

    #[test]
    fn test_full_support() {
        let caps = Capabilities::resolve(&mut StaticProbe::full(), LIMIT);
        assert!(caps.is_supported());
        assert!(caps.has_network_information());
    }

    #[test]
    fn test_missing_instrumentation() {
        let features = HostFeatures {
            performance_timing: false,
            ..HostFeatures::full()
        };
        let caps = Capabilities::resolve(&mut StaticProbe(features), LIMIT);
        assert!(matches!(caps, Capabilities::Unsupported { ref reason } if reason.contains("performance timing")));
    }

    #[test]
    fn test_probe_failure_and_timeout() {
        assert!(!Capabilities::resolve(&mut FailingProbe, LIMIT).is_supported());
        assert!(!Capabilities::resolve(&mut SlowProbe, Duration::from_millis(1)).is_supported());
    }

    #[test]
    fn test_network_information_optional() {
        let features = HostFeatures {
            network_information: false,
            ..HostFeatures::full()
        };
        let caps = Capabilities::resolve(&mut StaticProbe(features), LIMIT);
        assert!(caps.is_supported());
        assert!(!caps.has_network_information());
    }
}
