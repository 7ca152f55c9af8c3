use std::sync::Mutex;

use indexmap::IndexMap;
use once_cell::sync::Lazy;

use crate::logger::{debug, trace};

// Opaque handle the hosting runtime mints for a logical task; the tracker
// only assumes the same value recurs for the same logical task, never
// pointer identity of an external runtime object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(pub u64);

// Reserved for "none"; never a live task id.
pub const NONE_ID: u32 = 0;

#[derive(Debug, Clone)]
struct TaskRecord {
    id: u32,
    parent_id: u32,
    active_count: u32,
}

#[derive(Default)]
pub struct PromiseTracker {
    next_id: u32,
    handle_to_id: IndexMap<TaskHandle, u32>,
    records: IndexMap<u32, TaskRecord>,
    executing_stack: Vec<u32>,
}

impl PromiseTracker {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            handle_to_id: IndexMap::new(),
            records: IndexMap::new(),
            executing_stack: Vec::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn init(&mut self, handle: TaskHandle, parent: Option<TaskHandle>) {
        let parent_id = parent
            .map(|p| self.id_for(p))
            .unwrap_or(NONE_ID);

        if let Some(&existing_id) = self.handle_to_id.get(&handle) {
            if let Some(record) = self.records.get_mut(&existing_id) {
                record.active_count += 1;
                if record.parent_id == NONE_ID && parent_id != NONE_ID {
                    record.parent_id = parent_id;
                }
                trace!(
                    "promise init: task {} active_count -> {}, parent_id={}",
                    existing_id, record.active_count, record.parent_id
                );
                return;
            }
        }

        let id = self.next_id;
        self.next_id += 1;
        self.handle_to_id.insert(handle, id);
        self.records.insert(
            id,
            TaskRecord {
                id,
                parent_id,
                active_count: 1,
            },
        );
        debug!("promise init: new task {} (parent={})", id, parent_id);
    }

    pub fn resolve(&mut self, _handle: TaskHandle) {}

    pub fn before(&mut self, handle: TaskHandle) {
        if let Some(&id) = self.handle_to_id.get(&handle) {
            if self.records.contains_key(&id) {
                self.executing_stack.push(id);
                trace!("promise before: pushed task {}", id);
            }
        }
    }

    // Only pops the executing stack when this task is actually on top;
    // a mismatch is tolerated silently rather than raised.
    pub fn after(&mut self, handle: TaskHandle) {
        let Some(&id) = self.handle_to_id.get(&handle) else {
            return;
        };

        if self.executing_stack.last() == Some(&id) {
            self.executing_stack.pop();
            trace!("promise after: popped task {}", id);
        }

        let mut destroy = false;
        if let Some(record) = self.records.get_mut(&id) {
            record.active_count = record.active_count.saturating_sub(1);
            destroy = record.active_count == 0;
        }
        if destroy {
            self.records.shift_remove(&id);
            self.handle_to_id.retain(|_, v| *v != id);
            debug!("promise after: destroyed task {}", id);
        }
    }

    pub fn current_id(&self) -> u32 {
        self.executing_stack.last().copied().unwrap_or(NONE_ID)
    }

    pub fn parent_id(&self, id: u32) -> u32 {
        self.records.get(&id).map(|r| r.parent_id).unwrap_or(NONE_ID)
    }

    fn id_for(&mut self, handle: TaskHandle) -> u32 {
        self.handle_to_id.get(&handle).copied().unwrap_or(NONE_ID)
    }
}

static TRACKER: Lazy<Mutex<PromiseTracker>> = Lazy::new(|| Mutex::new(PromiseTracker::new()));

pub fn on_init(handle: TaskHandle, parent: Option<TaskHandle>) {
    TRACKER.lock().unwrap().init(handle, parent);
}

pub fn on_resolve(handle: TaskHandle) {
    TRACKER.lock().unwrap().resolve(handle);
}

pub fn on_before(handle: TaskHandle) {
    TRACKER.lock().unwrap().before(handle);
}

pub fn on_after(handle: TaskHandle) {
    TRACKER.lock().unwrap().after(handle);
}

pub fn current_id() -> u32 {
    TRACKER.lock().unwrap().current_id()
}

pub fn parent_id(id: u32) -> u32 {
    TRACKER.lock().unwrap().parent_id(id)
}

#[cfg(test)]
pub(crate) fn reset_for_test() {
    TRACKER.lock().unwrap().reset();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(n: u64) -> TaskHandle {
        TaskHandle(n)
    }

    #[test]
    fn ids_are_monotonic_and_never_zero() {
        let mut t = PromiseTracker::new();
        t.init(h(1), None);
        t.init(h(2), None);
        assert_eq!(t.handle_to_id[&h(1)], 1);
        assert_eq!(t.handle_to_id[&h(2)], 2);
    }

    #[test]
    fn before_after_track_current_id() {
        let mut t = PromiseTracker::new();
        t.init(h(1), None);
        assert_eq!(t.current_id(), NONE_ID);
        t.before(h(1));
        assert_eq!(t.current_id(), 1);
        t.after(h(1));
        assert_eq!(t.current_id(), NONE_ID);
    }

    #[test]
    fn parent_is_recorded() {
        let mut t = PromiseTracker::new();
        t.init(h(1), None);
        t.init(h(2), Some(h(1)));
        assert_eq!(t.parent_id(2), 1);
        assert_eq!(t.parent_id(1), NONE_ID);
    }

    #[test]
    fn first_concrete_parent_wins() {
        let mut t = PromiseTracker::new();
        t.init(h(1), None);
        t.init(h(2), Some(h(1)));
        t.init(h(3), None);
        // second init announces a different parent for the same handle;
        // the first concrete parent is kept.
        t.init(h(2), Some(h(3)));
        assert_eq!(t.parent_id(2), 1);
    }

    #[test]
    fn absent_parent_can_be_upgraded_to_concrete() {
        let mut t = PromiseTracker::new();
        t.init(h(1), None);
        t.init(h(2), None);
        assert_eq!(t.parent_id(2), NONE_ID);
        t.init(h(2), Some(h(1)));
        assert_eq!(t.parent_id(2), 1);
    }

    #[test]
    fn active_count_destroys_record_at_zero() {
        let mut t = PromiseTracker::new();
        t.init(h(1), None);
        t.init(h(1), None); // active_count = 2
        t.after(h(1)); // 1
        assert_eq!(t.parent_id(1), NONE_ID); // still alive, no-op value
        assert!(t.records.contains_key(&1));
        t.after(h(1)); // 0, destroyed
        assert!(!t.records.contains_key(&1));
    }

    #[test]
    fn mismatched_after_does_not_disturb_stack() {
        let mut t = PromiseTracker::new();
        t.init(h(1), None);
        t.init(h(2), None);
        t.before(h(1));
        t.before(h(2));
        // after for a task that is not on top of the stack: stack unaffected
        t.after(h(1));
        assert_eq!(t.current_id(), 2);
    }

    #[test]
    fn resolve_is_a_no_op() {
        let mut t = PromiseTracker::new();
        t.init(h(1), None);
        t.before(h(1));
        t.resolve(h(1));
        assert_eq!(t.current_id(), 1);
    }
}
