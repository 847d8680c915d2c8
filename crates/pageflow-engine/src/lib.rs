//! pageflow Engine
//!
//! Adaptive resource loading for a host page: discovers referenced
//! resources, classifies them by importance, and schedules preloads,
//! prefetches and visibility-triggered loads under a strategy chosen from
//! network conditions and Core Web Vitals.

pub mod alert;
pub mod capability;
pub mod classifier;
pub mod config;
pub mod discovery;
pub mod driver;
pub mod engine;
pub mod error;
pub mod hints;
pub mod metrics;
pub mod queue;
pub mod registry;
pub mod report;
pub mod resource;
pub mod scheduler;
pub mod strategy;
pub mod visibility;

pub use capability::{Capabilities, CapabilityProbe, HostFeatures, StaticProbe};
pub use config::EngineConfig;
pub use driver::{Driver, HostEvent};
pub use engine::{Engine, EngineDeps};
pub use error::{EngineAlert, EngineError, ErrorKind};
pub use metrics::{Metric, MetricThresholds, MetricsSnapshot, PerformanceEntry};
pub use report::Report;
pub use resource::{LoadState, Priority, Resource, ResourceId};
pub use scheduler::QueueKind;
pub use strategy::{StrategyMode, Transition};
pub use visibility::IntersectionSignal;

pub use pageflow_dom as dom;
pub use pageflow_net as net;
