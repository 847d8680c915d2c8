//! Scheduler
//!
//! Owns the Preload, Prefetch and Lazy queues and decides when each
//! resource is handed to the network. Preload strictly precedes Prefetch;
//! Lazy entries only leave their queue on a visibility signal.

use std::collections::HashMap;

use pageflow_net::ResourceType;

use crate::queue::ResourceQueue;
use crate::registry::Registry;
use crate::resource::{CacheStatus, LoadState, Priority, Resource, ResourceId};

/// Queue a pending resource sits in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    Preload,
    Prefetch,
    Lazy,
}

/// Path a load was issued on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lane {
    Preload,
    Prefetch,
    /// Visibility-triggered
    Lazy,
    /// Capability fallback or explicit request
    Immediate,
}

/// Mode-dependent scheduling knobs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleParams {
    pub preload_limit: usize,
    /// Lowest priority admitted to Preload
    pub preload_min_priority: Priority,
    pub prefetch_enabled: bool,
    pub prefetch_batch: usize,
    pub lazy_margin_px: f64,
}

/// A load to issue
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOrder {
    pub id: ResourceId,
    pub url: String,
    pub resource_type: ResourceType,
    pub lane: Lane,
}

impl LoadOrder {
    fn new(resource: &Resource, lane: Lane) -> Self {
        Self {
            id: resource.id,
            url: resource.url.clone(),
            resource_type: resource.resource_type,
            lane,
        }
    }
}

/// Admission outcome
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    Queued(ResourceId, QueueKind),
    /// Loaded without queueing (capability fallback)
    Immediate(LoadOrder),
    /// Already queued, in flight or settled
    Ignored(ResourceId),
}

/// How a failed load ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    Failed,
    /// Lazy image: keep the placeholder
    LazyError,
}

#[derive(Debug)]
pub struct Scheduler {
    preload: ResourceQueue,
    prefetch: ResourceQueue,
    lazy: ResourceQueue,
    /// Which queue each pending resource is in (at most one)
    membership: HashMap<ResourceId, QueueKind>,
    in_flight: HashMap<ResourceId, Lane>,
    params: ScheduleParams,
    /// Bypass queues entirely
    immediate: bool,
    started: bool,
    prefetch_open: bool,
    suspended: bool,
}

impl Scheduler {
    pub fn new(params: ScheduleParams, immediate: bool) -> Self {
        Self {
            preload: ResourceQueue::new(),
            prefetch: ResourceQueue::new(),
            lazy: ResourceQueue::new(),
            membership: HashMap::new(),
            in_flight: HashMap::new(),
            params,
            immediate,
            started: false,
            prefetch_open: false,
            suspended: false,
        }
    }

    pub fn params(&self) -> ScheduleParams {
        self.params
    }

    pub fn is_immediate(&self) -> bool {
        self.immediate
    }

    /// Allow preloads to be issued
    pub fn start(&mut self) {
        self.started = true;
    }

    /// The load-complete signal plus its delay has passed
    pub fn open_prefetch_window(&mut self) {
        if !self.prefetch_open {
            tracing::debug!("Prefetch window open ({} queued)", self.prefetch.len());
        }
        self.prefetch_open = true;
    }

    pub fn prefetch_open(&self) -> bool {
        self.prefetch_open
    }

    /// Hidden pages do not prefetch
    pub fn set_suspended(&mut self, suspended: bool) {
        self.suspended = suspended;
    }

    /// Queue a newly discovered resource
    pub fn admit(&mut self, resource: &mut Resource) -> Admission {
        if resource.state != LoadState::Discovered || self.membership.contains_key(&resource.id) {
            return Admission::Ignored(resource.id);
        }

        if self.immediate {
            resource.state = LoadState::Loading;
            self.in_flight.insert(resource.id, Lane::Immediate);
            return Admission::Immediate(LoadOrder::new(resource, Lane::Immediate));
        }

        let kind = if resource.defers_to_visibility() {
            QueueKind::Lazy
        } else if resource.priority >= self.params.preload_min_priority {
            QueueKind::Preload
        } else {
            QueueKind::Prefetch
        };

        self.queue_mut(kind).push(resource.id, resource.priority);
        self.membership.insert(resource.id, kind);
        resource.state = match kind {
            QueueKind::Lazy => LoadState::LazyPending,
            QueueKind::Preload | QueueKind::Prefetch => LoadState::Queued,
        };
        Admission::Queued(resource.id, kind)
    }

    /// Admit a discovery batch highest priority first, so Critical entries
    /// reach Preload before anything lands in Prefetch or Lazy
    pub fn admit_batch(&mut self, registry: &mut Registry, ids: &[ResourceId]) -> Vec<Admission> {
        let mut ordered: Vec<(Priority, ResourceId)> = ids
            .iter()
            .filter_map(|&id| registry.get(id).map(|r| (r.priority, id)))
            .collect();
        ordered.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        ordered
            .into_iter()
            .filter_map(|(_, id)| registry.get_mut(id).map(|resource| self.admit(resource)))
            .collect()
    }

    /// Issue whatever the current limits allow
    pub fn pump(&mut self, registry: &mut Registry) -> Vec<LoadOrder> {
        let mut orders = Vec::new();
        if !self.started || self.immediate {
            return orders;
        }

        while self.in_flight_on(Lane::Preload) < self.params.preload_limit {
            let Some(order) = self.dequeue(QueueKind::Preload, registry) else {
                break;
            };
            orders.push(order);
        }

        if self.prefetch_allowed() {
            while self.in_flight_on(Lane::Prefetch) < self.params.prefetch_batch {
                let Some(order) = self.dequeue(QueueKind::Prefetch, registry) else {
                    break;
                };
                orders.push(order);
            }
        }
        orders
    }

    fn prefetch_allowed(&self) -> bool {
        self.preload.is_empty() && self.prefetch_open && self.params.prefetch_enabled && !self.suspended
    }

    fn dequeue(&mut self, kind: QueueKind, registry: &mut Registry) -> Option<LoadOrder> {
        loop {
            let (id, _) = self.queue_mut(kind).pop()?;
            self.membership.remove(&id);
            // Unregistered without cancellation; nothing to load
            let Some(resource) = registry.get_mut(id) else {
                continue;
            };
            let (state, lane) = match kind {
                QueueKind::Preload => (LoadState::Preloading, Lane::Preload),
                QueueKind::Prefetch => (LoadState::Prefetching, Lane::Prefetch),
                QueueKind::Lazy => (LoadState::Loading, Lane::Lazy),
            };
            resource.state = state;
            self.in_flight.insert(id, lane);
            return Some(LoadOrder::new(resource, lane));
        }
    }

    /// Visibility signal for a lazy resource; only the first one counts
    pub fn on_visible(&mut self, resource: &mut Resource) -> Option<LoadOrder> {
        if self.membership.get(&resource.id) != Some(&QueueKind::Lazy) {
            return None;
        }
        self.lazy.cancel(resource.id);
        self.membership.remove(&resource.id);
        resource.state = LoadState::Loading;
        self.in_flight.insert(resource.id, Lane::Lazy);
        tracing::debug!("Lazy load of {} triggered", resource.url);
        Some(LoadOrder::new(resource, Lane::Lazy))
    }

    /// Pull a pending resource out of its queue and load it now
    pub fn expedite(&mut self, resource: &mut Resource) -> Option<LoadOrder> {
        let kind = self.membership.remove(&resource.id)?;
        self.queue_mut(kind).cancel(resource.id);
        resource.state = LoadState::Loading;
        self.in_flight.insert(resource.id, Lane::Immediate);
        Some(LoadOrder::new(resource, Lane::Immediate))
    }

    /// Network load finished
    pub fn complete(&mut self, resource: &mut Resource, byte_size: u64, duration_ms: f64) {
        self.in_flight.remove(&resource.id);
        resource.state = LoadState::Loaded;
        resource.byte_size = Some(byte_size);
        resource.load_duration_ms = Some(duration_ms);
        if resource.cache_status == CacheStatus::Unknown {
            resource.cache_status = CacheStatus::Miss;
        }
    }

    /// Load satisfied from cache
    pub fn served_from_cache(&mut self, resource: &mut Resource, byte_size: u64, revalidating: bool) {
        self.in_flight.remove(&resource.id);
        resource.state = LoadState::Cached;
        resource.byte_size = Some(byte_size);
        resource.load_duration_ms = Some(0.0);
        resource.cache_status = if revalidating {
            CacheStatus::Revalidated
        } else {
            CacheStatus::Hit
        };
    }

    /// Load failed; no retry
    pub fn fail(&mut self, resource: &mut Resource) -> FailureOutcome {
        let lane = self.in_flight.remove(&resource.id);
        if lane == Some(Lane::Lazy) && resource.resource_type == ResourceType::Image {
            resource.state = LoadState::LazyError;
            FailureOutcome::LazyError
        } else {
            resource.state = LoadState::Failed;
            FailureOutcome::Failed
        }
    }

    /// Drop every trace of a resource
    pub fn cancel(&mut self, id: ResourceId) -> bool {
        let queued = match self.membership.remove(&id) {
            Some(kind) => self.queue_mut(kind).cancel(id),
            None => false,
        };
        let in_flight = self.in_flight.remove(&id).is_some();
        queued || in_flight
    }

    /// Apply new mode parameters, moving entries whose Preload eligibility changed
    pub fn reconfigure(&mut self, params: ScheduleParams) {
        let min = params.preload_min_priority;
        self.params = params;

        let demoted = self.preload.drain_where(|p| p < min);
        for &(id, priority) in &demoted {
            self.prefetch.push(id, priority);
            self.membership.insert(id, QueueKind::Prefetch);
        }
        let promoted = self.prefetch.drain_where(|p| p >= min);
        for &(id, priority) in &promoted {
            self.preload.push(id, priority);
            self.membership.insert(id, QueueKind::Preload);
        }

        tracing::debug!(
            "Scheduler reconfigured: preload >= {} (limit {}), prefetch {} (batch {}), {} demoted, {} promoted",
            min.as_str(),
            params.preload_limit,
            if params.prefetch_enabled { "on" } else { "off" },
            params.prefetch_batch,
            demoted.len(),
            promoted.len()
        );
    }

    pub fn queue_of(&self, id: ResourceId) -> Option<QueueKind> {
        self.membership.get(&id).copied()
    }

    /// Queue contents in dequeue order
    pub fn queued(&self, kind: QueueKind) -> Vec<ResourceId> {
        self.queue(kind).entries().into_iter().map(|(id, _)| id).collect()
    }

    pub fn queue_len(&self, kind: QueueKind) -> usize {
        self.queue(kind).len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn in_flight_on(&self, lane: Lane) -> usize {
        self.in_flight.values().filter(|&&l| l == lane).count()
    }

    pub fn lane_of(&self, id: ResourceId) -> Option<Lane> {
        self.in_flight.get(&id).copied()
    }

    pub fn clear(&mut self) {
        self.preload.clear();
        self.prefetch.clear();
        self.lazy.clear();
        self.membership.clear();
        self.in_flight.clear();
    }

    fn queue(&self, kind: QueueKind) -> &ResourceQueue {
        match kind {
            QueueKind::Preload => &self.preload,
            QueueKind::Prefetch => &self.prefetch,
            QueueKind::Lazy => &self.lazy,
        }
    }

    fn queue_mut(&mut self, kind: QueueKind) -> &mut ResourceQueue {
        match kind {
            QueueKind::Preload => &mut self.preload,
            QueueKind::Prefetch => &mut self.prefetch,
            QueueKind::Lazy => &mut self.lazy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::discovery::ResourceRef;
    use crate::registry::Classification;
    use crate::strategy::StrategyMode;

    fn params(mode: StrategyMode) -> ScheduleParams {
        EngineConfig::default().schedule_params(mode)
    }

    fn add(registry: &mut Registry, name: &str, resource_type: ResourceType, priority: Priority) -> ResourceId {
        registry
            .register(ResourceRef::new(name, resource_type), 0.0, || Classification::new(priority))
            .unwrap()
            .id()
    }

    fn setup(entries: &[(&str, ResourceType, Priority)]) -> (Registry, Vec<ResourceId>) {
        let mut registry = Registry::with_base("https://a.test/").unwrap();
        let ids = entries
            .iter()
            .map(|&(name, t, p)| add(&mut registry, name, t, p))
            .collect();
        (registry, ids)
    }

    #[test]
    fn test_batch_admits_critical_first() {
        let (mut registry, ids) = setup(&[
            ("lazy.png", ResourceType::Image, Priority::Lazy),
            ("low.js", ResourceType::Script, Priority::Low),
            ("crit.css", ResourceType::Stylesheet, Priority::Critical),
            ("med.js", ResourceType::Script, Priority::Medium),
            ("crit.js", ResourceType::Script, Priority::Critical),
        ]);
        let mut scheduler = Scheduler::new(params(StrategyMode::DataSaving), false);

        let admissions = scheduler.admit_batch(&mut registry, &ids);
        let kinds: Vec<_> = admissions
            .iter()
            .map(|a| match a {
                Admission::Queued(_, kind) => *kind,
                other => panic!("unexpected {:?}", other),
            })
            .collect();

        let first_other = kinds.iter().position(|k| *k != QueueKind::Preload).unwrap();
        assert_eq!(first_other, 2);
        assert_eq!(scheduler.queued(QueueKind::Preload), vec![ids[2], ids[4]]);
        assert_eq!(scheduler.queued(QueueKind::Prefetch), vec![ids[3]]);
        assert_eq!(scheduler.queued(QueueKind::Lazy), vec![ids[1], ids[0]]);
    }

    #[test]
    fn test_preload_limit_and_refill() {
        let entries: Vec<(String, Priority)> = (0..7).map(|i| (format!("{i}.css"), Priority::High)).collect();
        let mut registry = Registry::with_base("https://a.test/").unwrap();
        let ids: Vec<_> = entries
            .iter()
            .map(|(n, p)| add(&mut registry, n, ResourceType::Stylesheet, *p))
            .collect();

        let mut scheduler = Scheduler::new(params(StrategyMode::Balanced), false);
        scheduler.admit_batch(&mut registry, &ids);
        assert!(scheduler.pump(&mut registry).is_empty());

        scheduler.start();
        let orders = scheduler.pump(&mut registry);
        assert_eq!(orders.len(), 5);
        assert!(orders.iter().all(|o| o.lane == Lane::Preload));
        assert_eq!(registry.get(ids[0]).unwrap().state, LoadState::Preloading);

        let first = registry.get_mut(ids[0]).unwrap();
        scheduler.complete(first, 100, 12.0);
        let next = scheduler.pump(&mut registry);
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].id, ids[5]);
    }

    #[test]
    fn test_prefetch_waits_for_window_and_empty_preload() {
        let (mut registry, ids) = setup(&[
            ("a.css", ResourceType::Stylesheet, Priority::High),
            ("b.js", ResourceType::Script, Priority::Medium),
        ]);
        let mut scheduler = Scheduler::new(params(StrategyMode::DataSaving), false);
        scheduler.reconfigure(ScheduleParams {
            prefetch_enabled: true,
            ..params(StrategyMode::DataSaving)
        });
        scheduler.admit_batch(&mut registry, &ids);
        scheduler.start();

        assert_eq!(scheduler.pump(&mut registry).len(), 1);
        scheduler.open_prefetch_window();
        scheduler.set_suspended(true);
        assert!(scheduler.pump(&mut registry).is_empty());

        scheduler.set_suspended(false);
        let orders = scheduler.pump(&mut registry);
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].lane, Lane::Prefetch);
        assert_eq!(registry.get(ids[1]).unwrap().state, LoadState::Prefetching);
    }

    #[test]
    fn test_visibility_is_idempotent() {
        let (mut registry, ids) = setup(&[("a.png", ResourceType::Image, Priority::Lazy)]);
        let mut scheduler = Scheduler::new(params(StrategyMode::Balanced), false);
        scheduler.admit_batch(&mut registry, &ids);
        scheduler.start();
        assert!(scheduler.pump(&mut registry).is_empty());

        let resource = registry.get_mut(ids[0]).unwrap();
        assert!(scheduler.on_visible(resource).is_some());
        assert_eq!(resource.state, LoadState::Loading);
        assert!(scheduler.on_visible(resource).is_none());

        scheduler.complete(resource, 10, 5.0);
        assert!(scheduler.on_visible(resource).is_none());
        assert_eq!(resource.state, LoadState::Loaded);
    }

    #[test]
    fn test_cancelled_resource_ignores_signal() {
        let (mut registry, ids) = setup(&[("a.png", ResourceType::Image, Priority::Lazy)]);
        let mut scheduler = Scheduler::new(params(StrategyMode::Balanced), false);
        scheduler.admit_batch(&mut registry, &ids);

        assert!(scheduler.cancel(ids[0]));
        let resource = registry.get_mut(ids[0]).unwrap();
        assert!(scheduler.on_visible(resource).is_none());
        assert_eq!(scheduler.queue_len(QueueKind::Lazy), 0);
    }

    #[test]
    fn test_reconfigure_moves_ineligible_preloads() {
        let (mut registry, ids) = setup(&[
            ("a.js", ResourceType::Script, Priority::Medium),
            ("b.css", ResourceType::Stylesheet, Priority::Critical),
            ("c.js", ResourceType::Script, Priority::Medium),
            ("d.js", ResourceType::Script, Priority::High),
        ]);
        let mut scheduler = Scheduler::new(params(StrategyMode::Balanced), false);
        scheduler.admit_batch(&mut registry, &ids);
        assert_eq!(scheduler.queue_len(QueueKind::Preload), 4);

        scheduler.reconfigure(params(StrategyMode::DataSaving));
        assert_eq!(scheduler.queued(QueueKind::Preload), vec![ids[1], ids[3]]);
        assert_eq!(scheduler.queued(QueueKind::Prefetch), vec![ids[0], ids[2]]);
        assert_eq!(scheduler.queue_of(ids[0]), Some(QueueKind::Prefetch));

        scheduler.reconfigure(params(StrategyMode::Balanced));
        assert_eq!(scheduler.queue_len(QueueKind::Prefetch), 0);
        assert_eq!(scheduler.queue_len(QueueKind::Preload), 4);
    }

    #[test]
    fn test_each_resource_in_at_most_one_queue() {
        let (mut registry, ids) = setup(&[
            ("a.js", ResourceType::Script, Priority::Medium),
            ("b.png", ResourceType::Image, Priority::Lazy),
            ("c.css", ResourceType::Stylesheet, Priority::High),
        ]);
        let mut scheduler = Scheduler::new(params(StrategyMode::Balanced), false);
        scheduler.admit_batch(&mut registry, &ids);
        scheduler.admit_batch(&mut registry, &ids);
        scheduler.reconfigure(params(StrategyMode::DataSaving));
        scheduler.reconfigure(params(StrategyMode::Optimal));

        for id in &ids {
            let count = [QueueKind::Preload, QueueKind::Prefetch, QueueKind::Lazy]
                .iter()
                .filter(|&&k| scheduler.queued(k).contains(id))
                .count();
            assert_eq!(count, 1, "{id} queued {count} times");
        }
    }

    #[test]
    fn test_immediate_mode_bypasses_queues() {
        let (mut registry, ids) = setup(&[("a.png", ResourceType::Image, Priority::Lazy)]);
        let mut scheduler = Scheduler::new(params(StrategyMode::Balanced), true);
        let admissions = scheduler.admit_batch(&mut registry, &ids);

        assert!(matches!(&admissions[..], [Admission::Immediate(order)] if order.lane == Lane::Immediate));
        assert_eq!(scheduler.queue_len(QueueKind::Lazy), 0);
        assert_eq!(registry.get(ids[0]).unwrap().state, LoadState::Loading);
    }

    #[test]
    fn test_lazy_image_failure() {
        let (mut registry, ids) = setup(&[
            ("a.png", ResourceType::Image, Priority::Lazy),
            ("b.js", ResourceType::Script, Priority::High),
        ]);
        let mut scheduler = Scheduler::new(params(StrategyMode::Balanced), false);
        scheduler.admit_batch(&mut registry, &ids);
        scheduler.start();
        scheduler.pump(&mut registry);

        let image = registry.get_mut(ids[0]).unwrap();
        scheduler.on_visible(image);
        assert_eq!(scheduler.fail(image), FailureOutcome::LazyError);
        assert_eq!(image.state, LoadState::LazyError);

        let script = registry.get_mut(ids[1]).unwrap();
        assert_eq!(scheduler.fail(script), FailureOutcome::Failed);
        assert_eq!(scheduler.in_flight(), 0);
    }
}
