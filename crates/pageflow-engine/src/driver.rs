//! Event loop driver
//!
//! Owns the document and feeds host events to the engine. Edits the engine
//! queues are applied to the document after every step, and the mutations
//! they cause are fed straight back.

use std::time::{Duration, Instant};

use pageflow_dom::{Document, DomRect};
use pageflow_net::NetworkProfile;
use smol::channel::{Receiver, RecvError, Sender};
use smol::{Timer, future};

use crate::engine::Engine;
use crate::metrics::PerformanceEntry;
use crate::report::Report;
use crate::visibility::IntersectionSignal;

/// Edit/mutation round trips per step before giving up
const MAX_EDIT_ROUNDS: usize = 4;

/// A page change made by the host
pub type DomChange = Box<dyn FnOnce(&mut Document) + Send>;

/// Input from the host page
pub enum HostEvent {
    Ready { network: Option<NetworkProfile> },
    /// Host script changed the document
    Mutate(DomChange),
    Scroll { y: f64 },
    Resize(DomRect),
    Intersections(Vec<IntersectionSignal>),
    Network(NetworkProfile),
    PageVisibility { visible: bool },
    Performance(PerformanceEntry),
    PageLoaded,
    LoadComplete { url: String, byte_size: u64, duration_ms: f64 },
    LoadFailed { url: String, reason: String },
    Idle,
    Unload,
}

impl HostEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::Mutate(_) => "mutate",
            Self::Scroll { .. } => "scroll",
            Self::Resize(_) => "resize",
            Self::Intersections(_) => "intersections",
            Self::Network(_) => "network",
            Self::PageVisibility { .. } => "page-visibility",
            Self::Performance(_) => "performance",
            Self::PageLoaded => "page-loaded",
            Self::LoadComplete { .. } => "load-complete",
            Self::LoadFailed { .. } => "load-failed",
            Self::Idle => "idle",
            Self::Unload => "unload",
        }
    }

    pub fn mutate(change: impl FnOnce(&mut Document) + Send + 'static) -> Self {
        Self::Mutate(Box::new(change))
    }
}

pub struct Driver {
    engine: Engine,
    document: Document,
    origin: Instant,
}

impl Driver {
    pub fn new(engine: Engine, document: Document) -> Self {
        Self {
            engine,
            document,
            origin: Instant::now(),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn into_parts(self) -> (Engine, Document) {
        (self.engine, self.document)
    }

    /// Milliseconds since the driver was created
    pub fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }

    /// Route one event; returns the final report once the page unloads
    pub fn dispatch(&mut self, event: HostEvent, now: f64) -> Option<Report> {
        tracing::trace!("Host event {} at {:.1} ms", event.name(), now);
        match event {
            HostEvent::Ready { network } => self.engine.start(&mut self.document, network, now),
            HostEvent::Mutate(change) => {
                change(&mut self.document);
                self.engine.on_dom_mutations(&mut self.document, now);
            }
            HostEvent::Scroll { y } => {
                self.document.scroll_to(y);
                self.engine.on_viewport_change(&self.document, now);
            }
            HostEvent::Resize(viewport) => {
                self.document.set_viewport(viewport);
                self.engine.on_viewport_change(&self.document, now);
            }
            HostEvent::Intersections(signals) => self.engine.on_intersections(&signals, now),
            HostEvent::Network(profile) => self.engine.on_network_change(profile, now),
            HostEvent::PageVisibility { visible } => self.engine.on_page_visibility(visible, now),
            HostEvent::Performance(entry) => self.engine.on_performance_entry(&entry, now),
            HostEvent::PageLoaded => self.engine.on_page_load(now),
            HostEvent::LoadComplete {
                url,
                byte_size,
                duration_ms,
            } => self.engine.on_load_complete(&url, byte_size, duration_ms, now),
            HostEvent::LoadFailed { url, reason } => self.engine.on_load_failed(&url, &reason, now),
            HostEvent::Idle => self.engine.on_idle(&self.document, now),
            HostEvent::Unload => {
                self.apply_edits(now);
                return Some(self.engine.unload(&mut self.document, now));
            }
        }
        self.apply_edits(now);
        None
    }

    /// Run timers that are due
    pub fn advance(&mut self, now: f64) {
        self.engine.advance(&self.document, now);
        self.apply_edits(now);
    }

    fn apply_edits(&mut self, now: f64) {
        for _ in 0..MAX_EDIT_ROUNDS {
            let edits = self.engine.take_edits();
            if edits.is_empty() {
                return;
            }
            let applied = self.document.apply_all(edits);
            tracing::trace!("Applied {} page edits", applied);
            self.engine.on_dom_mutations(&mut self.document, now);
        }
        tracing::warn!("Page edits still pending after {} rounds", MAX_EDIT_ROUNDS);
    }

    /// Drive the engine until `Unload` arrives or the event channel closes.
    /// Periodic reports and the final one are sent on `reports`.
    pub async fn run(mut self, events: Receiver<HostEvent>, reports: Sender<Report>) -> (Engine, Report) {
        loop {
            let wait = self
                .engine
                .next_deadline()
                .and_then(|deadline| {
                    Duration::try_from_secs_f64((deadline - self.now_ms()).max(0.0) / 1000.0).ok()
                });

            let received = async { Some(events.recv().await) };
            let timer = async {
                match wait {
                    Some(wait) => {
                        Timer::after(wait).await;
                        None::<Result<HostEvent, RecvError>>
                    }
                    None => future::pending().await,
                }
            };

            let finished = match future::or(received, timer).await {
                Some(Ok(event)) => self.dispatch(event, self.now_ms()),
                Some(Err(_)) => {
                    tracing::debug!("Host event channel closed");
                    let now = self.now_ms();
                    Some(self.engine.unload(&mut self.document, now))
                }
                None => {
                    self.advance(self.now_ms());
                    None
                }
            };

            for report in self.engine.take_reports() {
                if reports.send(report).await.is_err() {
                    tracing::debug!("Report receiver dropped");
                }
            }

            if let Some(report) = finished {
                if reports.send(report.clone()).await.is_err() {
                    tracing::debug!("Report receiver dropped");
                }
                return (self.engine, report);
            }
        }
    }
}
