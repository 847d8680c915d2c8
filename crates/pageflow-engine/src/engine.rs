//! Engine facade
//!
//! Owns every component and routes host input between them. Each entry
//! point takes the host timestamp in milliseconds. Changes to the page are
//! never made directly: they are queued as `PageEdit`s for the host.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use pageflow_dom::{
    Document, DomTree, MutationInterest, MutationType, NodeId, PageEdit, Subscribable, SubscriptionToken,
};
use pageflow_net::{
    BackgroundCache, CacheCoordinator, CacheOutcome, CachePolicy, CacheStats, ConnectionClass, FetchMode,
    FetchRequest, Fetcher, NetworkMonitor, NetworkProfile, PolicyManifest, ResourceType,
};
use url::Url;

use crate::alert::AlertLog;
use crate::capability::{Capabilities, CapabilityProbe, StaticProbe};
use crate::classifier;
use crate::config::EngineConfig;
use crate::discovery::{self, ResourceRef, WATCHED_ATTRIBUTES};
use crate::error::{EngineAlert, EngineError, ErrorKind, LoadError};
use crate::hints;
use crate::metrics::{MetricAlert, MetricsCollector, MetricsSnapshot, PerformanceEntry};
use crate::registry::{Detached, Registered, Registry};
use crate::report::{Report, ReportInputs};
use crate::resource::{CacheStatus, LoadState, Resource, ResourceId};
use crate::scheduler::{Admission, FailureOutcome, Lane, LoadOrder, QueueKind, Scheduler};
use crate::strategy::{StrategyController, StrategyInputs, StrategyMode, Transition};
use crate::visibility::{IntersectionSignal, VisibilityDetector, VisibilityInterest};

/// Collaborators supplied by the host
pub struct EngineDeps {
    pub fetcher: Box<dyn Fetcher>,
    pub background_cache: Option<Box<dyn BackgroundCache>>,
    pub probe: Box<dyn CapabilityProbe>,
}

impl EngineDeps {
    /// Fully capable host without a background cache
    pub fn new(fetcher: impl Fetcher + 'static) -> Self {
        Self {
            fetcher: Box::new(fetcher),
            background_cache: None,
            probe: Box::new(StaticProbe::full()),
        }
    }

    pub fn with_background_cache(mut self, cache: impl BackgroundCache + 'static) -> Self {
        self.background_cache = Some(Box::new(cache));
        self
    }

    pub fn with_probe(mut self, probe: impl CapabilityProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Created,
    Running,
    Unloaded,
}

#[derive(Debug, Default)]
struct Timers {
    /// Latest host timestamp seen
    clock_ms: f64,
    load_event_at: Option<f64>,
    last_tick_ms: f64,
    last_report_ms: f64,
}

pub struct Engine {
    config: EngineConfig,
    capabilities: Capabilities,
    registry: Registry,
    scheduler: Scheduler,
    detector: VisibilityDetector,
    monitor: NetworkMonitor,
    metrics: MetricsCollector,
    strategy: StrategyController,
    cache: CacheCoordinator,
    fetcher: Box<dyn Fetcher>,
    alerts: AlertLog<EngineAlert>,
    edits: Vec<PageEdit>,
    reports: Vec<Report>,

    phase: Phase,
    page_url: Option<Url>,
    fold_line: f64,
    page_hidden: bool,

    mutation_token: Option<SubscriptionToken>,
    network_token: SubscriptionToken,
    metrics_token: SubscriptionToken,
    /// Visibility subscriptions: token → (resource, element)
    watches: HashMap<SubscriptionToken, (ResourceId, NodeId)>,
    /// Reverse index of `watches`
    watched_nodes: HashMap<NodeId, SubscriptionToken>,
    /// Elements showing a placeholder until their resource's load is issued
    deferred: HashSet<NodeId>,

    pending_discovery: VecDeque<NodeId>,
    pending_set: HashSet<NodeId>,
    timers: Timers,
    strategy_dirty: bool,
    /// Lazy margin changed since the last visibility check
    viewport_dirty: bool,
    manifest_revision: Option<u64>,
    speculated: bool,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("phase", &self.phase)
            .field("mode", &self.strategy.mode())
            .field("resources", &self.registry.len())
            .field("cache", &self.cache)
            .finish()
    }
}

impl Engine {
    /// Validate the configuration and resolve host capabilities
    pub fn new(config: EngineConfig, deps: EngineDeps) -> Result<Self, EngineError> {
        config.validate()?;

        let EngineDeps {
            fetcher,
            background_cache,
            mut probe,
        } = deps;

        let timeout = Duration::try_from_secs_f64(config.probe_timeout_ms / 1000.0).unwrap_or(Duration::MAX);
        let capabilities = Capabilities::resolve(probe.as_mut(), timeout);

        let mut alerts = AlertLog::new(config.alert_capacity);
        if let Capabilities::Unsupported { reason } = &capabilities {
            alerts.push(EngineAlert::new(ErrorKind::CapabilityUnsupported, reason.clone(), 0.0));
        }

        let mode = StrategyMode::default();
        let scheduler = Scheduler::new(config.schedule_params(mode), !capabilities.is_supported());
        let detector = VisibilityDetector::new(config.lazy_margin_px, config.lazy_min_ratio);

        let mut monitor = NetworkMonitor::new(NetworkProfile::default());
        let network_token = monitor.subscribe(());
        let mut metrics = MetricsCollector::new(
            config.thresholds,
            config.cls_session_gap_ms,
            config.cls_session_max_ms,
            config.alert_capacity,
        );
        let metrics_token = metrics.subscribe(());

        let cache = CacheCoordinator::new(background_cache, config.memory_cache_capacity);
        let strategy = StrategyController::new(config.thresholds);

        let mut engine = Self {
            config,
            capabilities,
            registry: Registry::new(),
            scheduler,
            detector,
            monitor,
            metrics,
            strategy,
            cache,
            fetcher,
            alerts,
            edits: Vec::new(),
            reports: Vec::new(),
            phase: Phase::Created,
            page_url: None,
            fold_line: 0.0,
            page_hidden: false,
            mutation_token: None,
            network_token,
            metrics_token,
            watches: HashMap::new(),
            watched_nodes: HashMap::new(),
            deferred: HashSet::new(),
            pending_discovery: VecDeque::new(),
            pending_set: HashSet::new(),
            timers: Timers::default(),
            strategy_dirty: false,
            viewport_dirty: false,
            manifest_revision: None,
            speculated: false,
        };
        engine.absorb_cache_faults(0.0);
        Ok(engine)
    }

    // ========================================================================
    // Host input
    // ========================================================================

    /// Page is ready: discover the whole tree and issue the first preloads
    pub fn start(&mut self, doc: &mut Document, network: Option<NetworkProfile>, now: f64) {
        if self.phase != Phase::Created {
            tracing::warn!("Engine already started");
            return;
        }
        self.phase = Phase::Running;
        self.timers = Timers {
            clock_ms: now,
            load_event_at: None,
            last_tick_ms: now,
            last_report_ms: now,
        };

        if let Err(err) = self.registry.set_base(doc.url()) {
            tracing::warn!("{}; only absolute references will resolve", err);
            self.record_alert(ErrorKind::Discovery, err.to_string(), now);
        }
        self.page_url = self.registry.base().cloned();
        self.fold_line = doc.viewport().bottom();
        self.mutation_token = Some(
            doc.tree_mut()
                .subscribe(MutationInterest::structure_and(WATCHED_ATTRIBUTES)),
        );

        // Without network information the default 4g profile stands
        if self.capabilities.has_network_information() {
            self.monitor.sample(network.unwrap_or_default());
        }
        self.drain_network_changes();
        self.evaluate_strategy(now);

        let nodes: Vec<NodeId> = doc.tree().descendants(NodeId::ROOT).collect();
        let fresh = self.discover_nodes(doc.tree(), &nodes, now);
        self.scheduler.start();
        self.admit(fresh, now);
        self.emit_preconnect_hints();

        self.observe_viewport(doc, now);
        self.pump(now);
        self.sync_manifest(now);

        tracing::info!(
            "Engine started: {} resources, mode {}, {} preloads issued",
            self.registry.len(),
            self.strategy.mode(),
            self.scheduler.in_flight_on(Lane::Preload)
        );
    }

    /// Process the structural changes recorded since the last call
    pub fn on_dom_mutations(&mut self, doc: &mut Document, now: f64) {
        self.tick_clock(now);
        let Some(token) = self.mutation_token.filter(|_| self.phase == Phase::Running) else {
            return;
        };
        let records: Vec<_> = doc
            .tree_mut()
            .take_notifications()
            .into_iter()
            .filter(|n| n.token == token)
            .map(|n| n.event)
            .collect();
        if records.is_empty() {
            return;
        }

        let tree = doc.tree();
        for record in &records {
            for &removed in &record.removed_nodes {
                let subtree: Vec<NodeId> = tree.descendants(removed).collect();
                for node in subtree {
                    self.detach_element(node);
                }
            }
            for &added in &record.added_nodes {
                for node in tree.descendants(added) {
                    self.queue_discovery(node);
                }
            }
            if record.mutation_type == MutationType::Attributes {
                self.queue_discovery(record.target);
            }
        }
        tracing::debug!(
            "{} mutation records, {} elements pending discovery",
            records.len(),
            self.pending_discovery.len()
        );

        self.discover_chunk(doc, now);
        self.pump(now);
    }

    /// Idle slice: continue chunked discovery
    pub fn on_idle(&mut self, doc: &Document, now: f64) {
        self.tick_clock(now);
        if self.phase != Phase::Running {
            return;
        }
        self.discover_chunk(doc, now);
        self.pump(now);
    }

    /// Viewport scrolled or resized
    pub fn on_viewport_change(&mut self, doc: &Document, now: f64) {
        self.tick_clock(now);
        if self.phase != Phase::Running {
            return;
        }
        self.observe_viewport(doc, now);
        self.pump(now);
    }

    /// Intersection entries computed by the host
    pub fn on_intersections(&mut self, signals: &[IntersectionSignal], now: f64) {
        self.tick_clock(now);
        if self.phase != Phase::Running {
            return;
        }
        for signal in signals {
            let Some(id) = self.registry.find_node(signal.node) else {
                tracing::debug!("Stale visibility signal for {:?}", signal.node);
                continue;
            };
            if self.detector.qualifies(signal.ratio) {
                self.reveal_lazy(id, now);
            }
        }
        self.pump(now);
    }

    pub fn on_network_change(&mut self, profile: NetworkProfile, now: f64) {
        self.tick_clock(now);
        if self.phase != Phase::Running {
            return;
        }
        if !self.capabilities.has_network_information() {
            tracing::debug!("Ignoring network sample: host has no network information");
            return;
        }
        self.monitor.sample(profile);
        self.drain_network_changes();
        self.evaluate_strategy(now);
        self.pump(now);
    }

    pub fn on_page_visibility(&mut self, visible: bool, now: f64) {
        self.tick_clock(now);
        if self.phase != Phase::Running {
            return;
        }
        self.page_hidden = !visible;
        self.scheduler.set_suspended(!visible);
        self.evaluate_strategy(now);
        self.pump(now);
    }

    pub fn on_performance_entry(&mut self, entry: &PerformanceEntry, now: f64) {
        self.tick_clock(now);
        if self.phase != Phase::Running {
            return;
        }
        self.metrics.record(entry, now);
        if !self.drain_metric_alerts().is_empty() {
            // Picked up by the next advance
            self.strategy_dirty = true;
        }
    }

    /// The page's own load event fired
    pub fn on_page_load(&mut self, now: f64) {
        self.tick_clock(now);
        if self.phase == Phase::Running && self.timers.load_event_at.is_none() {
            self.timers.load_event_at = Some(now);
        }
    }

    pub fn on_load_complete(&mut self, url: &str, byte_size: u64, duration_ms: f64, now: f64) {
        self.tick_clock(now);
        let Some(id) = self.registry.find_url(url) else {
            tracing::debug!("Completion for untracked {}", url);
            return;
        };
        let Some(resource) = self.registry.get_mut(id) else {
            return;
        };

        if resource.state.is_in_flight() {
            self.scheduler.complete(resource, byte_size, duration_ms);
        } else if resource.state == LoadState::Cached {
            // Revalidation finished
            resource.byte_size = Some(byte_size);
        } else {
            tracing::debug!("Ignoring completion for {} in state {:?}", resource.url, resource.state);
            return;
        }

        let (url, resource_type) = (resource.url.clone(), resource.resource_type);
        self.cache.complete(&url, resource_type, byte_size, now);
        self.absorb_cache_faults(now);
        self.pump(now);
    }

    pub fn on_load_failed(&mut self, url: &str, reason: &str, now: f64) {
        self.tick_clock(now);
        let Some(id) = self.registry.find_url(url) else {
            tracing::debug!("Failure for untracked {}", url);
            return;
        };
        let Some(resource) = self.registry.get(id) else {
            return;
        };
        if !resource.state.is_in_flight() {
            if resource.state == LoadState::Cached {
                tracing::warn!("Revalidation of {} failed: {}", resource.url, reason);
            }
            return;
        }

        let url = resource.url.clone();
        if CachePolicy::for_type(resource.resource_type) == CachePolicy::NetworkFirst {
            if let Some(cached) = self.cache.fallback(&url) {
                self.settle_from_cache(id, cached.byte_size, false);
                self.pump(now);
                return;
            }
        }

        self.fail_load(
            id,
            LoadError::Network {
                url,
                reason: reason.to_string(),
            },
            now,
        );
        self.pump(now);
    }

    /// Register a reference that has no element (host-initiated)
    pub fn register_reference(&mut self, reference: &str, resource_type: ResourceType, now: f64) -> Option<ResourceId> {
        self.tick_clock(now);
        if self.phase != Phase::Running {
            return None;
        }
        match self
            .registry
            .register(ResourceRef::new(reference, resource_type), now, Default::default)
        {
            Ok(Registered::New(id)) => {
                self.admit(vec![id], now);
                self.pump(now);
                Some(id)
            }
            Ok(Registered::Existing(id)) => Some(id),
            Err(err) => {
                tracing::warn!("Skipping reference: {}", err);
                self.record_alert(ErrorKind::Discovery, err.to_string(), now);
                None
            }
        }
    }

    /// Load a queued resource now; no-op when already in flight or settled
    pub fn request_load(&mut self, id: ResourceId, now: f64) -> bool {
        self.tick_clock(now);
        let Some(resource) = self.registry.get_mut(id) else {
            return false;
        };
        let Some(order) = self.scheduler.expedite(resource) else {
            return false;
        };
        self.unwatch_resource(id);
        self.dispatch(order, now);
        true
    }

    /// Timers: prefetch window, strategy tick, manifest sync, reports
    pub fn advance(&mut self, doc: &Document, now: f64) {
        self.tick_clock(now);
        if self.phase != Phase::Running {
            return;
        }

        if !self.pending_discovery.is_empty() {
            self.discover_chunk(doc, now);
        }

        let window_due = self
            .timers
            .load_event_at
            .is_some_and(|at| now >= at + self.config.prefetch_delay_ms);
        if window_due && !self.scheduler.prefetch_open() {
            self.scheduler.open_prefetch_window();
        }

        if self.strategy_dirty || now - self.timers.last_tick_ms >= self.config.strategy_tick_ms {
            self.timers.last_tick_ms = now;
            self.strategy_dirty = false;
            self.evaluate_strategy(now);
        }
        if self.viewport_dirty {
            self.observe_viewport(doc, now);
        }

        if self.scheduler.prefetch_open() && self.strategy.mode() == StrategyMode::Optimal && !self.speculated {
            self.speculate(doc);
        }

        self.pump(now);
        self.sync_manifest(now);

        if now - self.timers.last_report_ms >= self.config.report_interval_ms {
            self.timers.last_report_ms = now;
            let report = self.report(now);
            self.reports.push(report);
        }
    }

    /// When `advance` next has work to do
    pub fn next_deadline(&self) -> Option<f64> {
        if self.phase != Phase::Running {
            return None;
        }
        if !self.pending_discovery.is_empty() || self.strategy_dirty || self.viewport_dirty {
            return Some(self.timers.clock_ms);
        }

        let mut deadline = (self.timers.last_tick_ms + self.config.strategy_tick_ms)
            .min(self.timers.last_report_ms + self.config.report_interval_ms);
        if let Some(at) = self.timers.load_event_at {
            if !self.scheduler.prefetch_open() {
                deadline = deadline.min(at + self.config.prefetch_delay_ms);
            }
        }
        Some(deadline)
    }

    /// Tear down all subscriptions; returns the final report
    pub fn unload(&mut self, doc: &mut Document, now: f64) -> Report {
        self.tick_clock(now);
        let report = self.report(now);
        if self.phase == Phase::Unloaded {
            return report;
        }

        if let Some(token) = self.mutation_token.take() {
            doc.tree_mut().unsubscribe(token);
        }
        for token in self.watches.keys() {
            self.detector.unsubscribe(*token);
        }
        self.watches.clear();
        self.watched_nodes.clear();
        self.detector.disconnect();
        self.monitor.unsubscribe(self.network_token);
        self.metrics.unsubscribe(self.metrics_token);

        self.scheduler.clear();
        self.registry.clear();
        self.deferred.clear();
        self.pending_discovery.clear();
        self.pending_set.clear();
        self.phase = Phase::Unloaded;

        tracing::info!(
            "Engine unloaded: {} resources tracked, {} failed, cache hit ratio {:.2}",
            report.resource_count,
            report.failed_count,
            report.cache_hit_ratio
        );
        report
    }

    // ========================================================================
    // Output and inspection
    // ========================================================================

    /// Page edits queued since the last call
    pub fn take_edits(&mut self) -> Vec<PageEdit> {
        std::mem::take(&mut self.edits)
    }

    /// Periodic reports produced since the last call
    pub fn take_reports(&mut self) -> Vec<Report> {
        std::mem::take(&mut self.reports)
    }

    pub fn report(&self, now: f64) -> Report {
        Report::build(ReportInputs {
            registry: &self.registry,
            cache: self.cache.stats(),
            vitals: self.metrics.snapshot(now),
            thresholds: &self.config.thresholds,
            mode: self.strategy.mode(),
            alert_count: self.alerts.total() + self.metrics.alert_total(),
            now_ms: now,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn mode(&self) -> StrategyMode {
        self.strategy.mode()
    }

    pub fn strategy_transitions(&self) -> u64 {
        self.strategy.transitions()
    }

    /// Most recent transitions, oldest first
    pub fn strategy_history(&self) -> Vec<Transition> {
        self.strategy.history()
    }

    pub fn connection(&self) -> ConnectionClass {
        self.monitor.class()
    }

    pub fn resource(&self, id: ResourceId) -> Option<&Resource> {
        self.registry.get(id)
    }

    pub fn resource_by_url(&self, url: &str) -> Option<&Resource> {
        self.registry.find_url(url).and_then(|id| self.registry.get(id))
    }

    pub fn snapshot(&self) -> Vec<Resource> {
        self.registry.snapshot()
    }

    pub fn live_count(&self) -> usize {
        self.registry.len()
    }

    /// Queue contents in dequeue order
    pub fn queued(&self, kind: QueueKind) -> Vec<ResourceId> {
        self.scheduler.queued(kind)
    }

    pub fn queue_of(&self, id: ResourceId) -> Option<QueueKind> {
        self.scheduler.queue_of(id)
    }

    pub fn in_flight(&self) -> usize {
        self.scheduler.in_flight()
    }

    pub fn pending_discovery(&self) -> usize {
        self.pending_discovery.len()
    }

    pub fn observed_elements(&self) -> usize {
        self.detector.observed()
    }

    pub fn alerts(&self) -> Vec<EngineAlert> {
        self.alerts.entries()
    }

    pub fn metric_alerts(&self) -> Vec<MetricAlert> {
        self.metrics.alerts()
    }

    pub fn metrics_snapshot(&self, now: f64) -> MetricsSnapshot {
        self.metrics.snapshot(now)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn cache(&self) -> &CacheCoordinator {
        &self.cache
    }

    pub fn is_page_hidden(&self) -> bool {
        self.page_hidden
    }

    // ========================================================================
    // Discovery
    // ========================================================================

    fn queue_discovery(&mut self, node: NodeId) {
        if self.pending_set.insert(node) {
            self.pending_discovery.push_back(node);
        }
    }

    fn discover_chunk(&mut self, doc: &Document, now: f64) {
        let take = self.config.classify_chunk_size.min(self.pending_discovery.len());
        if take == 0 {
            return;
        }
        let nodes: Vec<NodeId> = self.pending_discovery.drain(..take).collect();
        for node in &nodes {
            self.pending_set.remove(node);
        }

        let fresh = self.discover_nodes(doc.tree(), &nodes, now);
        if !fresh.is_empty() {
            self.admit(fresh, now);
            self.observe_viewport(doc, now);
        }
    }

    /// Returns newly registered resources
    fn discover_nodes(&mut self, tree: &DomTree, nodes: &[NodeId], now: f64) -> Vec<ResourceId> {
        nodes
            .iter()
            .filter(|&&node| tree.is_connected(node))
            .filter_map(|&node| self.discover_node(tree, node, now))
            .collect()
    }

    fn discover_node(&mut self, tree: &DomTree, node: NodeId, now: f64) -> Option<ResourceId> {
        let current = self.registry.find_node(node);
        let Some(reference) = discovery::extract_reference(tree, node) else {
            // Reference removed from a tracked element
            if current.is_some() {
                self.detach_element(node);
            }
            return None;
        };

        if let Some(id) = current {
            let unchanged = match (self.registry.get(id), self.registry.normalize(&reference.reference)) {
                (Some(resource), Ok(url)) => resource.url == url.as_str(),
                _ => false,
            };
            if unchanged {
                return None;
            }
            self.detach_element(node);
        }

        let resource_type = reference.resource_type;
        let fold_line = self.fold_line;
        let mut classification_error = None;
        let registered = self.registry.register(reference, now, || {
            let (classification, err) = classifier::classify_or_default(tree, node, resource_type, fold_line);
            classification_error = err;
            classification
        });
        if let Some(err) = classification_error {
            self.record_alert(ErrorKind::Classification, err.to_string(), now);
        }

        match registered {
            Ok(Registered::New(id)) => {
                self.prepare_element(tree, id, node);
                Some(id)
            }
            Ok(Registered::Existing(id)) => {
                self.prepare_element(tree, id, node);
                if self.registry.get(id).is_some_and(|r| r.state == LoadState::LazyPending) {
                    self.watch(id, node);
                }
                None
            }
            Err(err) => {
                tracing::warn!("Skipping reference: {}", err);
                self.record_alert(ErrorKind::Discovery, err.to_string(), now);
                None
            }
        }
    }

    /// Placeholder handling for a media element backing `id`
    fn prepare_element(&mut self, tree: &DomTree, id: ResourceId, node: NodeId) {
        let (Some(resource), Some(element)) = (self.registry.get(id), tree.element(node)) else {
            return;
        };
        if !matches!(resource.resource_type, ResourceType::Image | ResourceType::Video) {
            return;
        }

        let lazy = match resource.state {
            LoadState::Discovered => !self.scheduler.is_immediate() && resource.defers_to_visibility(),
            LoadState::LazyPending => true,
            _ => false,
        };
        let src = element.get_attribute("src");
        let placeholder_shown = src.is_none_or(|s| s.trim_start().starts_with("data:"));

        if lazy && !placeholder_shown {
            if let Some(src) = src {
                if !element.has_attribute("data-src") {
                    self.edits.push(PageEdit::set(node, "data-src", src));
                }
            }
            match resource.resource_type {
                ResourceType::Video => self.edits.push(PageEdit::RemoveAttribute {
                    node,
                    name: "src".to_string(),
                }),
                _ => self
                    .edits
                    .push(PageEdit::set(node, "src", &self.config.placeholder_src)),
            }
        }

        let loaded = resource.state.is_in_flight() || matches!(resource.state, LoadState::Loaded | LoadState::Cached);
        if placeholder_shown && loaded {
            self.edits.push(PageEdit::set(node, "src", &resource.url));
        } else if lazy || placeholder_shown {
            self.deferred.insert(node);
        }
    }

    fn detach_element(&mut self, node: NodeId) {
        self.deferred.remove(&node);
        self.unwatch_node(node);
        if let Some(Detached::Removed(id)) = self.registry.detach(node) {
            self.scheduler.cancel(id);
        }
    }

    // ========================================================================
    // Scheduling
    // ========================================================================

    fn admit(&mut self, ids: Vec<ResourceId>, now: f64) {
        if ids.is_empty() {
            return;
        }
        for admission in self.scheduler.admit_batch(&mut self.registry, &ids) {
            match admission {
                Admission::Queued(id, QueueKind::Lazy) => self.watch_resource(id),
                Admission::Immediate(order) => self.dispatch(order, now),
                Admission::Queued(..) | Admission::Ignored(_) => {}
            }
        }
    }

    /// Issue everything the scheduler allows; cache hits free slots immediately
    fn pump(&mut self, now: f64) {
        loop {
            let orders = self.scheduler.pump(&mut self.registry);
            if orders.is_empty() {
                break;
            }
            for order in orders {
                self.dispatch(order, now);
            }
        }
    }

    fn dispatch(&mut self, order: LoadOrder, now: f64) {
        let mode = match order.lane {
            Lane::Prefetch => FetchMode::Prefetch,
            _ => FetchMode::Normal,
        };
        let request = FetchRequest::new(&order.url, order.resource_type, mode);
        let outcome = self.cache.request(&request, self.fetcher.as_mut());
        self.absorb_cache_faults(now);

        match outcome {
            Ok(CacheOutcome::Fetching) => {
                if let Some(resource) = self.registry.get_mut(order.id) {
                    resource.cache_status = CacheStatus::Miss;
                }
                tracing::debug!("Loading {} via {:?}", order.url, order.lane);
                self.reveal(order.id);
            }
            Ok(CacheOutcome::Served(cached)) => self.settle_from_cache(order.id, cached.byte_size, false),
            Ok(CacheOutcome::ServedRevalidating(cached)) => {
                self.settle_from_cache(order.id, cached.byte_size, true)
            }
            Err(source) => {
                let err = LoadError::NotStarted {
                    url: order.url.clone(),
                    source,
                };
                self.fail_load(order.id, err, now);
            }
        }
    }

    fn settle_from_cache(&mut self, id: ResourceId, byte_size: u64, revalidating: bool) {
        if let Some(resource) = self.registry.get_mut(id) {
            self.scheduler.served_from_cache(resource, byte_size, revalidating);
        }
        self.reveal(id);
    }

    fn fail_load(&mut self, id: ResourceId, err: LoadError, now: f64) {
        let Some(resource) = self.registry.get_mut(id) else {
            return;
        };
        let outcome = self.scheduler.fail(resource);
        let elements = resource.elements.clone();

        tracing::warn!("{}", err);
        self.record_alert(ErrorKind::Load, err.to_string(), now);

        if outcome == FailureOutcome::LazyError {
            for node in elements {
                self.deferred.remove(&node);
                self.edits
                    .push(PageEdit::set(node, "src", &self.config.placeholder_src));
            }
        }
        self.unwatch_resource(id);
    }

    /// Point deferred elements at the real source
    fn reveal(&mut self, id: ResourceId) {
        let Some(resource) = self.registry.get(id) else {
            return;
        };
        for &node in &resource.elements {
            if self.deferred.remove(&node) {
                self.edits.push(PageEdit::set(node, "src", &resource.url));
            }
        }
    }

    fn reveal_lazy(&mut self, id: ResourceId, now: f64) {
        let Some(resource) = self.registry.get_mut(id) else {
            return;
        };
        if let Some(order) = self.scheduler.on_visible(resource) {
            self.unwatch_resource(id);
            self.dispatch(order, now);
        }
    }

    // ========================================================================
    // Visibility
    // ========================================================================

    fn watch_resource(&mut self, id: ResourceId) {
        let Some(resource) = self.registry.get(id) else {
            return;
        };
        let elements = resource.elements.clone();
        for node in elements {
            self.watch(id, node);
        }
    }

    fn watch(&mut self, id: ResourceId, node: NodeId) {
        if self.watched_nodes.contains_key(&node) {
            return;
        }
        let token = self.detector.subscribe(VisibilityInterest { node });
        self.watches.insert(token, (id, node));
        self.watched_nodes.insert(node, token);
    }

    /// Watches always track the resource's current elements
    fn unwatch_resource(&mut self, id: ResourceId) {
        let Some(resource) = self.registry.get(id) else {
            return;
        };
        let elements = resource.elements.clone();
        for node in elements {
            self.unwatch_node(node);
        }
    }

    fn unwatch_node(&mut self, node: NodeId) {
        if let Some(token) = self.watched_nodes.remove(&node) {
            self.watches.remove(&token);
            self.detector.unsubscribe(token);
        }
    }

    fn observe_viewport(&mut self, doc: &Document, now: f64) {
        self.viewport_dirty = false;
        if !self.capabilities.is_supported() || self.watches.is_empty() {
            return;
        }
        self.detector.check(doc.viewport(), doc.tree(), now);
        for note in self.detector.take_notifications() {
            // Resource may have loaded earlier in this batch
            let Some(&(id, _)) = self.watches.get(&note.token) else {
                continue;
            };
            if self.detector.qualifies(note.event.ratio) {
                self.reveal_lazy(id, now);
            }
        }
    }

    // ========================================================================
    // Strategy
    // ========================================================================

    fn evaluate_strategy(&mut self, now: f64) {
        let inputs = StrategyInputs {
            connection: self.monitor.class(),
            metrics: self.metrics.snapshot(now),
            active_alert: self.metrics.has_active_alert(),
        };
        if let Some(transition) = self.strategy.evaluate(&inputs, now) {
            let params = self.config.schedule_params(transition.to);
            self.scheduler.reconfigure(params);
            if self.detector.margin() != params.lazy_margin_px {
                self.detector.set_margin(params.lazy_margin_px);
                self.viewport_dirty = true;
            }
        }
    }

    fn drain_network_changes(&mut self) {
        for note in self.monitor.take_notifications() {
            if note.token == self.network_token {
                tracing::debug!("Connection {:?} -> {:?}", note.event.from, note.event.to);
            }
        }
    }

    fn drain_metric_alerts(&mut self) -> Vec<MetricAlert> {
        let token = self.metrics_token;
        self.metrics
            .take_notifications()
            .into_iter()
            .filter(|n| n.token == token)
            .map(|n| n.event)
            .collect()
    }

    fn emit_preconnect_hints(&mut self) {
        let Some(page) = &self.page_url else {
            return;
        };
        let candidates: Vec<&str> = self
            .registry
            .iter()
            .filter(|r| self.scheduler.queue_of(r.id) == Some(QueueKind::Preload) || r.state.is_in_flight())
            .map(|r| r.url.as_str())
            .collect();
        let hints = hints::preconnect_hints(page, candidates);
        self.edits.extend(hints.into_iter().map(PageEdit::InsertHint));
    }

    fn speculate(&mut self, doc: &Document) {
        self.speculated = true;
        let Some(page) = &self.page_url else {
            return;
        };
        let hints = hints::speculative_prefetch(doc.tree(), page, self.config.speculative_prefetch_limit);
        tracing::debug!("Speculative prefetch of {} pages", hints.len());
        self.edits.extend(hints.into_iter().map(PageEdit::InsertHint));
    }

    // ========================================================================
    // Cache and alerts
    // ========================================================================

    fn sync_manifest(&mut self, now: f64) {
        let revision = self.registry.revision();
        if self.manifest_revision == Some(revision) {
            return;
        }
        let mut manifest = PolicyManifest::new(now);
        for resource in self.registry.iter() {
            manifest.push(&resource.url, resource.resource_type);
        }
        self.cache.sync_manifest(&manifest);
        self.manifest_revision = Some(revision);
        self.absorb_cache_faults(now);
    }

    fn absorb_cache_faults(&mut self, now: f64) {
        for fault in self.cache.take_faults() {
            self.record_alert(ErrorKind::from(&fault), fault.to_string(), now);
        }
    }

    fn record_alert(&mut self, kind: ErrorKind, message: String, now: f64) {
        self.alerts.push(EngineAlert::new(kind, message, now));
    }

    fn tick_clock(&mut self, now: f64) {
        if now > self.timers.clock_ms {
            self.timers.clock_ms = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pageflow_dom::DomRect;
    use pageflow_net::{EffectiveType, RecordingFetcher};

    use crate::capability::HostFeatures;
    use crate::resource::Priority;

    const PAGE: &str = "https://a.test/";

    fn page() -> Document {
        Document::new(PAGE, DomRect::from_xywh(0.0, 0.0, 800.0, 600.0))
    }

    fn at(y: f64) -> Option<DomRect> {
        Some(DomRect::from_xywh(0.0, y, 100.0, 100.0))
    }

    fn engine(fetcher: &RecordingFetcher) -> Engine {
        Engine::new(EngineConfig::default(), EngineDeps::new(fetcher.clone())).unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = EngineConfig {
            prefetch_batch: 0,
            ..EngineConfig::default()
        };
        let err = Engine::new(config, EngineDeps::new(RecordingFetcher::new())).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_start_preloads_and_defers() {
        let fetcher = RecordingFetcher::new();
        let mut engine = engine(&fetcher);
        let mut doc = page();
        let body = doc.body();
        let head = doc.head();
        doc.append_element(head, "link", &[("rel", "stylesheet"), ("href", "site.css")], None);
        doc.append_element(body, "img", &[("src", "hero.jpg")], at(0.0));
        let below = doc.append_element(body, "img", &[("src", "footer.jpg")], at(2000.0));

        engine.start(&mut doc, None, 0.0);

        assert_eq!(fetcher.urls(), vec!["https://a.test/hero.jpg", "https://a.test/site.css"]);
        let footer = engine.resource_by_url("https://a.test/footer.jpg").unwrap();
        assert_eq!(footer.priority, Priority::Lazy);
        assert_eq!(footer.state, LoadState::LazyPending);

        // Footer image shows a placeholder until visible
        let edits = engine.take_edits();
        assert!(edits.contains(&PageEdit::set(below, "data-src", "footer.jpg")));
        assert!(edits.contains(&PageEdit::set(below, "src", crate::config::DEFAULT_PLACEHOLDER)));
    }

    #[test]
    fn test_scroll_triggers_lazy_load() {
        let fetcher = RecordingFetcher::new();
        let mut engine = engine(&fetcher);
        let mut doc = page();
        let body = doc.body();
        let img = doc.append_element(body, "img", &[("data-src", "late.jpg")], at(2000.0));

        engine.start(&mut doc, None, 0.0);
        doc.apply_all(engine.take_edits());
        engine.on_dom_mutations(&mut doc, 1.0);
        assert!(fetcher.is_empty());

        doc.scroll_to(1500.0);
        engine.on_viewport_change(&doc, 2.0);
        assert_eq!(fetcher.urls(), vec!["https://a.test/late.jpg"]);

        let edits = engine.take_edits();
        assert_eq!(edits, vec![PageEdit::set(img, "src", "https://a.test/late.jpg")]);
        assert_eq!(engine.observed_elements(), 0);
    }

    #[test]
    fn test_slow_start_uses_data_saving() {
        let fetcher = RecordingFetcher::new();
        let mut engine = engine(&fetcher);
        let mut doc = page();
        let body = doc.body();
        doc.append_element(body, "script", &[("src", "app.js")], None);

        let slow = NetworkProfile::default().with_effective_type(EffectiveType::TwoG);
        engine.start(&mut doc, Some(slow), 0.0);

        assert_eq!(engine.mode(), StrategyMode::DataSaving);
        // Medium script is not preload-eligible and prefetch is off
        assert!(fetcher.is_empty());
        assert_eq!(engine.queued(QueueKind::Prefetch).len(), 1);
    }

    #[test]
    fn test_unsupported_host_loads_everything() {
        let fetcher = RecordingFetcher::new();
        let deps = EngineDeps::new(fetcher.clone()).with_probe(StaticProbe(HostFeatures::none()));
        let mut engine = Engine::new(EngineConfig::default(), deps).unwrap();
        let mut doc = page();
        let body = doc.body();
        doc.append_element(body, "img", &[("src", "far.jpg"), ("loading", "lazy")], at(5000.0));

        engine.start(&mut doc, None, 0.0);
        assert_eq!(fetcher.urls(), vec!["https://a.test/far.jpg"]);
        assert!(engine
            .alerts()
            .iter()
            .any(|a| a.kind == ErrorKind::CapabilityUnsupported));
    }

    #[test]
    fn test_refused_fetch_marks_failed() {
        let fetcher = RecordingFetcher::new();
        fetcher.refuse("https://a.test/broken.js");
        let mut engine = engine(&fetcher);
        let mut doc = page();
        let body = doc.body();
        doc.append_element(body, "script", &[("src", "broken.js")], at(0.0));

        engine.start(&mut doc, None, 0.0);
        let resource = engine.resource_by_url("https://a.test/broken.js").unwrap();
        assert_eq!(resource.state, LoadState::Failed);
        assert_eq!(engine.report(1.0).failed_count, 1);
    }

    #[test]
    fn test_next_deadline_tracks_timers() {
        let fetcher = RecordingFetcher::new();
        let mut engine = engine(&fetcher);
        let mut doc = page();
        assert_eq!(engine.next_deadline(), None);

        engine.start(&mut doc, None, 100.0);
        assert_eq!(engine.next_deadline(), Some(30_100.0));

        engine.on_page_load(500.0);
        assert_eq!(engine.next_deadline(), Some(2500.0));

        engine.advance(&doc, 2500.0);
        assert_eq!(engine.next_deadline(), Some(30_100.0));
    }
}
