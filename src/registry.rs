// Process-wide registry mapping promise lineages to execution-context views.

use std::sync::Mutex;

use indexmap::IndexMap;
use once_cell::sync::Lazy;

use crate::context::ExecutionContextView;
use crate::error::{ContextError, Result};
use crate::logger::{debug, trace};
use crate::promise;
use crate::util::new_frame_id;

const DEFAULT_LINEAGE_PREFIX: &str = "default-";

struct RegistryState {
    lineage_to_view: IndexMap<String, ExecutionContextView>,
    task_to_lineage: IndexMap<u32, String>,
    default_lineage: String,
}

impl RegistryState {
    fn bootstrap() -> Self {
        let default_lineage = format!("{DEFAULT_LINEAGE_PREFIX}{}", new_frame_id());
        let mut lineage_to_view = IndexMap::new();
        lineage_to_view.insert(
            default_lineage.clone(),
            ExecutionContextView::new(false, false),
        );

        let mut task_to_lineage = IndexMap::new();
        let current = promise::current_id();
        if current != promise::NONE_ID {
            task_to_lineage.insert(current, default_lineage.clone());
        }

        debug!("context registry bootstrapped with default lineage {default_lineage}");
        Self {
            lineage_to_view,
            task_to_lineage,
            default_lineage,
        }
    }

    // Walks ancestors of `task_id` until one is bound to a lineage, falling
    // back to the default lineage if the walk reaches `0` or the parent id
    // repeats.
    fn resolve_lineage(&self, task_id: u32) -> &str {
        let mut t = task_id;
        loop {
            if let Some(lineage) = self.task_to_lineage.get(&t) {
                return lineage;
            }
            if t == promise::NONE_ID {
                return &self.default_lineage;
            }
            let next = promise::parent_id(t);
            if next == t || next == promise::NONE_ID {
                return &self.default_lineage;
            }
            t = next;
        }
    }
}

static REGISTRY: Lazy<Mutex<RegistryState>> = Lazy::new(|| Mutex::new(RegistryState::bootstrap()));

pub fn get_current_context() -> ExecutionContextView {
    let state = REGISTRY.lock().unwrap();
    let task_id = promise::current_id();
    let lineage = state.resolve_lineage(task_id);
    state
        .lineage_to_view
        .get(lineage)
        .cloned()
        .unwrap_or_else(|| state.lineage_to_view[&state.default_lineage].clone())
}

pub fn fork_for_promise(strict_controllers: Option<bool>, strict_segments: Option<bool>) -> String {
    let forked = get_current_context().fork(strict_controllers, strict_segments);
    let name = new_frame_id();

    let mut state = REGISTRY.lock().unwrap();
    state.lineage_to_view.insert(name.clone(), forked);
    trace!("fork_for_promise: created lineage {name}");
    name
}

// Binds the current task id to an existing lineage name. Fails if the name
// is unknown or the current task is already bound to any lineage.
pub fn start_promise(name: &str) -> Result<()> {
    let mut state = REGISTRY.lock().unwrap();
    if !state.lineage_to_view.contains_key(name) {
        return Err(ContextError::UnknownContext(name.to_string()));
    }

    let task_id = promise::current_id();
    if state.task_to_lineage.contains_key(&task_id) {
        return Err(ContextError::AlreadyStarted(task_id));
    }

    state.task_to_lineage.insert(task_id, name.to_string());
    trace!("start_promise: task {task_id} bound to lineage {name}");
    Ok(())
}

// Removes the lineage→view binding and every task→lineage binding pointing
// to it; returns whether anything was removed.
pub fn end_promise(name: &str) -> bool {
    let mut state = REGISTRY.lock().unwrap();
    let had_view = state.lineage_to_view.shift_remove(name).is_some();

    let before = state.task_to_lineage.len();
    state.task_to_lineage.retain(|_, lineage| lineage != name);
    let had_tasks = state.task_to_lineage.len() != before;

    if had_view || had_tasks {
        trace!("end_promise: removed lineage {name}");
    }
    had_view || had_tasks
}

#[cfg(test)]
pub(crate) fn reset_for_test() {
    let mut state = REGISTRY.lock().unwrap();
    *state = RegistryState::bootstrap();
}
