//! Visibility Detector
//!
//! Watches lazy elements against the viewport grown by a margin and
//! signals once an element's visible fraction reaches the minimum ratio.

use std::collections::HashMap;

use pageflow_dom::{
    DomRect, DomTree, NodeId, Notification, Subscribable, SubscriptionToken, Subscriptions,
};

/// Element to watch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibilityInterest {
    pub node: NodeId,
}

/// Intersection signal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntersectionSignal {
    pub node: NodeId,
    pub ratio: f64,
    pub is_intersecting: bool,
    pub time_ms: f64,
}

impl IntersectionSignal {
    pub fn new(node: NodeId, ratio: f64, time_ms: f64) -> Self {
        Self {
            node,
            ratio,
            is_intersecting: ratio > 0.0,
            time_ms,
        }
    }
}

#[derive(Debug)]
pub struct VisibilityDetector {
    margin_px: f64,
    min_ratio: f64,
    subscriptions: Subscriptions<VisibilityInterest>,
    /// Last ratio per subscription
    last_ratio: HashMap<SubscriptionToken, f64>,
    pending: Vec<Notification<IntersectionSignal>>,
}

impl VisibilityDetector {
    pub fn new(margin_px: f64, min_ratio: f64) -> Self {
        Self {
            margin_px,
            min_ratio,
            subscriptions: Subscriptions::new(),
            last_ratio: HashMap::new(),
            pending: Vec::new(),
        }
    }

    pub fn margin(&self) -> f64 {
        self.margin_px
    }

    /// Applies from the next check on
    pub fn set_margin(&mut self, margin_px: f64) {
        self.margin_px = margin_px;
    }

    pub fn min_ratio(&self) -> f64 {
        self.min_ratio
    }

    /// Whether a ratio is enough to trigger a load
    pub fn qualifies(&self, ratio: f64) -> bool {
        ratio >= self.min_ratio
    }

    pub fn observed(&self) -> usize {
        self.subscriptions.len()
    }

    /// Recompute ratios; queues a signal for every element crossing into range
    pub fn check(&mut self, viewport: DomRect, tree: &DomTree, time_ms: f64) {
        let root = viewport.expand(self.margin_px);

        for (token, interest) in self.subscriptions.iter() {
            // Not rendered or detached: nothing to intersect
            let Ok(Some(rect)) = tree.bounding_rect(interest.node) else {
                continue;
            };
            let ratio = rect.visible_ratio(&root);
            let was_in = self.last_ratio.get(&token).is_some_and(|&r| r >= self.min_ratio);
            self.last_ratio.insert(token, ratio);

            if ratio >= self.min_ratio && !was_in {
                self.pending.push(Notification {
                    token,
                    event: IntersectionSignal::new(interest.node, ratio, time_ms),
                });
            }
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Stop watching everything
    pub fn disconnect(&mut self) {
        self.subscriptions.clear();
        self.last_ratio.clear();
        self.pending.clear();
    }
}

impl Subscribable<IntersectionSignal> for VisibilityDetector {
    type Interest = VisibilityInterest;

    fn subscribe(&mut self, interest: VisibilityInterest) -> SubscriptionToken {
        self.subscriptions.insert(interest)
    }

    fn unsubscribe(&mut self, token: SubscriptionToken) -> bool {
        self.pending.retain(|n| n.token != token);
        self.last_ratio.remove(&token);
        self.subscriptions.remove(token).is_some()
    }

    fn take_notifications(&mut self) -> Vec<Notification<IntersectionSignal>> {
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pageflow_dom::Document;

    fn setup() -> (Document, NodeId) {
        let mut doc = Document::new("https://a.test/", DomRect::from_xywh(0.0, 0.0, 800.0, 600.0));
        let body = doc.body();
        let img = doc.append_element(
            body,
            "img",
            &[("data-src", "a.png")],
            Some(DomRect::from_xywh(0.0, 1000.0, 100.0, 100.0)),
        );
        (doc, img)
    }

    #[test]
    fn test_signal_on_entering_margin() {
        let (mut doc, img) = setup();
        let mut detector = VisibilityDetector::new(50.0, 0.01);
        let token = detector.subscribe(VisibilityInterest { node: img });

        detector.check(doc.viewport(), doc.tree(), 0.0);
        assert!(detector.take_notifications().is_empty());

        // 10px inside the 50px margin: ratio 0.1
        doc.scroll_to(360.0);
        detector.check(doc.viewport(), doc.tree(), 10.0);
        let signals = detector.take_notifications();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].token, token);
        assert!((signals[0].event.ratio - 0.1).abs() < 1e-9);

        // Still in range: no repeat
        doc.scroll_to(400.0);
        detector.check(doc.viewport(), doc.tree(), 20.0);
        assert!(detector.take_notifications().is_empty());
    }

    #[test]
    fn test_below_min_ratio_does_not_signal() {
        let (mut doc, img) = setup();
        let mut detector = VisibilityDetector::new(0.0, 0.5);
        detector.subscribe(VisibilityInterest { node: img });

        doc.scroll_to(430.0);
        detector.check(doc.viewport(), doc.tree(), 0.0);
        assert!(detector.take_notifications().is_empty());

        doc.scroll_to(460.0);
        detector.check(doc.viewport(), doc.tree(), 1.0);
        assert_eq!(detector.take_notifications().len(), 1);
    }

    #[test]
    fn test_unsubscribe_drops_pending() {
        let (mut doc, img) = setup();
        let mut detector = VisibilityDetector::new(50.0, 0.01);
        let token = detector.subscribe(VisibilityInterest { node: img });

        doc.scroll_to(1000.0);
        detector.check(doc.viewport(), doc.tree(), 0.0);
        assert!(detector.has_pending());

        assert!(detector.unsubscribe(token));
        assert!(detector.take_notifications().is_empty());
        assert_eq!(detector.observed(), 0);
    }

    #[test]
    fn test_detached_element_is_skipped() {
        let (mut doc, img) = setup();
        let mut detector = VisibilityDetector::new(50.0, 0.01);
        detector.subscribe(VisibilityInterest { node: img });

        doc.tree_mut().remove(img);
        doc.scroll_to(1000.0);
        detector.check(doc.viewport(), doc.tree(), 0.0);
        assert!(detector.take_notifications().is_empty());
    }
}
