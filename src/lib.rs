#![doc = include_str!("../README.md")]

pub mod context;
pub mod controller;
pub mod error;
pub mod logger;
pub mod path_matcher;
pub mod promise;
pub mod registry;
pub mod security;
pub mod stack;
pub mod util;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use indexmap::IndexMap;

pub use context::ExecutionContextView;
pub use controller::{Controller, ControllerData, DynValue, Invocation};
pub use error::{ContextError, Result};
pub use promise::TaskHandle;
pub use security::{FileAccessController, FileAccessOptions, FILEACCESS_SEGMENT};

pub fn get_current_context() -> ExecutionContextView {
    registry::get_current_context()
}

// Returns a function that, on each call, resolves the current view and
// runs `func` through `run_in_context` with the declared segments.
pub fn wrap_function<R: 'static>(
    segment_options: IndexMap<String, ControllerData>,
    func: impl Fn(Vec<DynValue>) -> Result<R> + 'static,
) -> impl Fn(Vec<DynValue>) -> Result<R> {
    let func = Arc::new(func);
    move |args: Vec<DynValue>| {
        let view = registry::get_current_context();
        let func = Arc::clone(&func);
        let call_args = args.clone();
        view.run_in_context(segment_options.clone(), args, move || func(call_args))
    }
}

pub fn fork_for_promise(strict_controllers: Option<bool>, strict_segments: Option<bool>) -> String {
    registry::fork_for_promise(strict_controllers, strict_segments)
}

pub fn start_promise(name: &str) -> Result<()> {
    registry::start_promise(name)
}

pub fn end_promise(name: &str) -> bool {
    registry::end_promise(name)
}

pub fn get_current_promise_id() -> u32 {
    promise::current_id()
}

// With no argument, the parent of the current task; `0` when unknown.
pub fn get_parent_promise_id(id: Option<u32>) -> u32 {
    promise::parent_id(id.unwrap_or_else(promise::current_id))
}

// Resolves once immediately, forcing the executor to schedule a fresh poll
// before proceeding, so `wrap_promise` can defer `start_promise` by one tick.
struct YieldOnce(bool);

impl Future for YieldOnce {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<()> {
        if self.0 {
            Poll::Ready(())
        } else {
            self.0 = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

// Forks a lineage, starts it on the next poll, and ends it once `promise`
// settles, success or failure alike. Generic over any `Future` rather than
// a specific executor's `finally`-style hook.
pub async fn wrap_promise<F>(
    promise: F,
    strict_controllers: Option<bool>,
    strict_segments: Option<bool>,
) -> F::Output
where
    F: Future,
{
    let name = registry::fork_for_promise(strict_controllers, strict_segments);
    YieldOnce(false).await;
    if let Err(err) = registry::start_promise(&name) {
        logger::warn!("wrap_promise: failed to start lineage {name}: {err}");
    }
    let result = promise.await;
    registry::end_promise(&name);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::indexmap;
    use serial_test::serial;

    fn reset() {
        promise::reset_for_test();
        registry::reset_for_test();
    }

    #[test]
    #[serial]
    fn wrap_function_runs_the_wrapped_call_when_no_segments_are_declared() {
        reset();
        let wrapped = wrap_function(IndexMap::new(), |_args| Ok(42));
        assert_eq!(wrapped(Vec::new()).unwrap(), 42);
    }

    #[test]
    #[serial]
    fn wrap_function_can_be_called_more_than_once() {
        reset();
        let wrapped = wrap_function(IndexMap::new(), |args: Vec<DynValue>| {
            Ok(args.len())
        });
        assert_eq!(wrapped(vec![DynValue::Str("a".to_string())]).unwrap(), 1);
        assert_eq!(wrapped(Vec::new()).unwrap(), 0);
    }

    #[test]
    #[serial]
    fn denied_file_access_prevents_the_wrapped_call_from_running() {
        reset();
        let view = get_current_context();
        let segments =
            security::add_file_access_controller(None, FileAccessOptions::default()).unwrap();
        let frame = view.push_controllers(segments).unwrap();

        let segment_options: IndexMap<String, ControllerData> = indexmap! {
            FILEACCESS_SEGMENT.to_string() => indexmap! { "read".to_string() => DynValue::Str("{0}".to_string()) }
        };
        let wrapped = wrap_function(segment_options, |_args| Ok(()));
        let err = wrapped(vec![DynValue::Str("/tmp/a.tmp".to_string())]).unwrap_err();
        assert_eq!(err, ContextError::FileAccessForbidden("/tmp/a.tmp".to_string()));

        view.pop_controllers(&frame).unwrap();
    }

    #[test]
    #[serial]
    fn get_parent_promise_id_defaults_to_the_current_task() {
        reset();
        promise::on_init(TaskHandle(1), None);
        promise::on_init(TaskHandle(2), Some(TaskHandle(1)));
        promise::on_before(TaskHandle(2));
        assert_eq!(get_parent_promise_id(None), 1);
        promise::on_after(TaskHandle(2));
    }
}
