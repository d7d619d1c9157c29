//! Ordered event list with parent/child bookkeeping
//!
//! Entries are kept sorted by [`EventKey`] (trigger time, then insertion
//! order), so replay is a forward walk and lookups are binary searches.
//! Every derived event remembers the event it came from: effects record the
//! event that scheduled them, projected ends record the process they stop.
//! Removing an event removes everything derived from it.
//!
//! Derived events keep their ids across replays. When a parent is triggered
//! again its old children are retired, and the child it derives in the same
//! slot (its end, or its n-th effect) takes the retired id back. Same-time
//! ordering then depends only on the events themselves, not on how often
//! they were replayed.

use std::sync::Arc;

use ahash::AHashMap;

use crate::core::types::{EventId, EventKey, Time};
use crate::timeline::event::Event;
use crate::timeline::process::EndReason;

/// How an event got onto the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Added through the timeline's public API
    External,
    /// The `index`-th follow-up scheduled by `on_start_effects` of `parent`
    Effect { parent: EventId, index: usize },
    /// Projected end of the process started by `process`
    End { process: EventId, reason: EndReason },
}

impl Origin {
    pub fn parent(&self) -> Option<EventId> {
        match self {
            Origin::External => None,
            Origin::Effect { parent, .. } => Some(*parent),
            Origin::End { process, .. } => Some(*process),
        }
    }

    fn slot(&self) -> Option<(EventId, Slot)> {
        match *self {
            Origin::External => None,
            Origin::Effect { parent, index } => Some((parent, Slot::Effect(index))),
            Origin::End { process, .. } => Some((process, Slot::End)),
        }
    }
}

/// Place of a derived event among its parent's derived events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Slot {
    End,
    Effect(usize),
}

#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    pub key: EventKey,
    pub event: Arc<dyn Event>,
    pub origin: Origin,
}

impl ScheduledEvent {
    pub fn id(&self) -> EventId {
        self.key.id
    }

    pub fn time(&self) -> Time {
        self.key.time
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    entries: Vec<ScheduledEvent>,
    times: AHashMap<EventId, Time>,
    children: AHashMap<EventId, Vec<EventId>>,
    retired: AHashMap<EventId, AHashMap<Slot, EventId>>,
    next_id: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an event
    ///
    /// External events get a fresh id, so they sort after every existing key
    /// at `time`. Derived events reuse the id last retired from their slot.
    pub fn insert(&mut self, time: Time, event: Arc<dyn Event>, origin: Origin) -> EventKey {
        self.insert_after(time, event, origin, None)
    }

    /// Insert so that the new key sorts after `after`
    ///
    /// A retired id that would sort at or before `after` is dropped for a
    /// fresh one.
    pub fn insert_after(
        &mut self,
        time: Time,
        event: Arc<dyn Event>,
        origin: Origin,
        after: Option<EventKey>,
    ) -> EventKey {
        let id = self
            .reclaim(origin)
            .filter(|&id| Some(EventKey::new(time, id)) > after)
            .unwrap_or_else(|| self.fresh_id());
        let key = EventKey::new(time, id);

        let pos = self.entries.partition_point(|e| e.key < key);
        self.entries.insert(pos, ScheduledEvent { key, event, origin });
        self.times.insert(id, time);
        if let Some(parent) = origin.parent() {
            self.children.entry(parent).or_default().push(id);
        }
        key
    }

    pub fn key_of(&self, id: EventId) -> Option<EventKey> {
        self.times.get(&id).map(|&time| EventKey::new(time, id))
    }

    pub fn get(&self, id: EventId) -> Option<&ScheduledEvent> {
        let key = self.key_of(id)?;
        self.position(key).map(|i| &self.entries[i])
    }

    pub fn contains(&self, id: EventId) -> bool {
        self.times.contains_key(&id)
    }

    fn position(&self, key: EventKey) -> Option<usize> {
        self.entries.binary_search_by(|e| e.key.cmp(&key)).ok()
    }

    fn fresh_id(&mut self) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        id
    }

    fn reclaim(&mut self, origin: Origin) -> Option<EventId> {
        let (parent, slot) = origin.slot()?;
        let slots = self.retired.get_mut(&parent)?;
        let id = slots.remove(&slot)?;
        if slots.is_empty() {
            self.retired.remove(&parent);
        }
        Some(id)
    }

    /// Remove `id` and every event derived from it, returning what was removed
    ///
    /// `id` itself is retired into its parent's slot; its descendants go
    /// for good.
    pub fn remove(&mut self, id: EventId) -> Vec<ScheduledEvent> {
        let origin = self.get(id).map(|e| e.origin);
        if let Some((parent, slot)) = origin.and_then(|o| o.slot()) {
            if let Some(siblings) = self.children.get_mut(&parent) {
                siblings.retain(|&child| child != id);
            }
            self.retired.entry(parent).or_default().insert(slot, id);
        }

        let mut removed = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            self.retired.remove(&next);
            if let Some(kids) = self.children.remove(&next) {
                stack.extend(kids);
            }
            if let Some(time) = self.times.remove(&next) {
                if let Some(i) = self.position(EventKey::new(time, next)) {
                    removed.push(self.entries.remove(i));
                }
            }
        }
        removed
    }

    /// Remove everything derived from `parent`, keeping `parent` itself
    pub fn remove_children(&mut self, parent: EventId) -> usize {
        let kids = self.children.remove(&parent).unwrap_or_default();
        kids.into_iter().map(|kid| self.remove(kid).len()).sum()
    }

    pub fn children_of(&self, parent: EventId) -> impl Iterator<Item = &ScheduledEvent> + '_ {
        self.children
            .get(&parent)
            .into_iter()
            .flatten()
            .filter_map(move |&id| self.get(id))
    }

    /// Earliest projected end of `process` sorting after `after`
    pub fn pending_end(
        &self,
        process: EventId,
        after: Option<EventKey>,
    ) -> Option<(EventKey, EndReason)> {
        self.children_of(process)
            .filter(|e| Some(e.key) > after)
            .filter_map(|e| match e.origin {
                Origin::End { reason, .. } => Some((e.key, reason)),
                _ => None,
            })
            .min_by_key(|(key, _)| *key)
    }

    /// Key of the first event sorting after `cursor` (the first event overall for None)
    pub fn next_after(&self, cursor: Option<EventKey>) -> Option<EventKey> {
        let idx = match cursor {
            None => 0,
            Some(cursor) => self.entries.partition_point(|e| e.key <= cursor),
        };
        self.entries.get(idx).map(|e| e.key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScheduledEvent> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::event::VariableEvent;

    fn event(name: &str) -> Arc<dyn Event> {
        Arc::new(VariableEvent::new(name))
    }

    fn names(queue: &EventQueue) -> Vec<&str> {
        queue.iter().map(|e| e.event.name()).collect()
    }

    #[test]
    fn test_insert_keeps_time_order_with_stable_ties() {
        let mut queue = EventQueue::new();
        queue.insert(5.0, event("b"), Origin::External);
        queue.insert(1.0, event("a"), Origin::External);
        queue.insert(5.0, event("c"), Origin::External);
        queue.insert(3.0, event("x"), Origin::External);
        assert_eq!(names(&queue), vec!["a", "x", "b", "c"]);
    }

    #[test]
    fn test_next_after_walks_forward() {
        let mut queue = EventQueue::new();
        let a = queue.insert(1.0, event("a"), Origin::External);
        let b = queue.insert(1.0, event("b"), Origin::External);
        assert_eq!(queue.next_after(None), Some(a));
        assert_eq!(queue.next_after(Some(a)), Some(b));
        assert_eq!(queue.next_after(Some(b)), None);
    }

    #[test]
    fn test_remove_cascades_to_descendants() {
        let mut queue = EventQueue::new();
        let root = queue.insert(0.0, event("root"), Origin::External);
        let child = queue.insert(2.0, event("child"), Origin::Effect { parent: root.id, index: 0 });
        queue.insert(4.0, event("grandchild"), Origin::Effect { parent: child.id, index: 0 });
        queue.insert(3.0, event("other"), Origin::External);

        let removed = queue.remove(root.id);
        assert_eq!(removed.len(), 3);
        assert_eq!(names(&queue), vec!["other"]);
        assert!(queue.get(child.id).is_none());
    }

    #[test]
    fn test_remove_children_keeps_parent() {
        let mut queue = EventQueue::new();
        let root = queue.insert(0.0, event("root"), Origin::External);
        queue.insert(2.0, event("child"), Origin::Effect { parent: root.id, index: 0 });
        assert_eq!(queue.remove_children(root.id), 1);
        assert_eq!(names(&queue), vec!["root"]);
        assert_eq!(queue.children_of(root.id).count(), 0);
    }

    #[test]
    fn test_pending_end_respects_cursor() {
        let mut queue = EventQueue::new();
        let start = queue.insert(0.0, event("gen"), Origin::External);
        let end = queue.insert(
            10.0,
            event("gen:depleted"),
            Origin::End {
                process: start.id,
                reason: EndReason::Depleted,
            },
        );
        assert_eq!(
            queue.pending_end(start.id, Some(start)),
            Some((end, EndReason::Depleted))
        );
        assert_eq!(queue.pending_end(start.id, Some(end)), None);
    }

    #[test]
    fn test_removing_single_child_detaches_it() {
        let mut queue = EventQueue::new();
        let root = queue.insert(0.0, event("root"), Origin::External);
        let child = queue.insert(1.0, event("child"), Origin::Effect { parent: root.id, index: 0 });
        queue.remove(child.id);
        assert_eq!(queue.children_of(root.id).count(), 0);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_rederived_events_take_back_their_ids() {
        let mut queue = EventQueue::new();
        let root = queue.insert(0.0, event("root"), Origin::External);
        let first = queue.insert(2.0, event("a"), Origin::Effect { parent: root.id, index: 0 });
        let second = queue.insert(2.0, event("b"), Origin::Effect { parent: root.id, index: 1 });
        let later = queue.insert(2.0, event("later"), Origin::External);

        queue.remove_children(root.id);
        let again_b = queue.insert(2.0, event("b"), Origin::Effect { parent: root.id, index: 1 });
        let again_a = queue.insert(2.0, event("a"), Origin::Effect { parent: root.id, index: 0 });
        assert_eq!(again_a, first);
        assert_eq!(again_b, second);
        assert_eq!(names(&queue), vec!["root", "a", "b", "later"]);
        assert!(later.id > second.id);
    }

    #[test]
    fn test_removed_parent_forgets_retired_children() {
        let mut queue = EventQueue::new();
        let root = queue.insert(0.0, event("root"), Origin::External);
        let child = queue.insert(1.0, event("child"), Origin::Effect { parent: root.id, index: 0 });
        queue.remove_children(root.id);
        queue.remove(root.id);

        let other = queue.insert(0.0, event("other"), Origin::External);
        let orphan = queue.insert(
            1.0,
            event("child"),
            Origin::Effect {
                parent: root.id,
                index: 0,
            },
        );
        assert_ne!(orphan.id, child.id);
        assert!(orphan.id > other.id);
    }
}
