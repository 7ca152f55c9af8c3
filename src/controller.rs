// This crate ships exactly one concrete controller
// (`security::FileAccessController`), but the capability interface stays
// open via a trait object so a host embedding this crate can add its own
// segments.

use std::any::Any;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{ContextError, Result};

#[derive(Debug, Clone)]
pub enum DynValue {
    Str(String),
    List(Vec<DynValue>),
    Record(IndexMap<String, DynValue>),
    None,
}

impl DynValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DynValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&DynValue> {
        match self {
            DynValue::Record(map) => map.get(key),
            _ => None,
        }
    }
}

impl From<&str> for DynValue {
    fn from(s: &str) -> Self {
        DynValue::Str(s.to_string())
    }
}

impl From<String> for DynValue {
    fn from(s: String) -> Self {
        DynValue::Str(s)
    }
}

pub type ControllerData = IndexMap<String, DynValue>;

// `Send + Sync` because controllers are held behind the process-wide,
// `Mutex`-guarded singletons in `crate::registry`, even though the
// cooperative single-threaded model never actually hands one to a second
// OS thread.
pub trait Controller: Send + Sync {
    fn create_child(&self, data: ControllerData) -> Result<Box<dyn Controller>>;

    fn on_context(&self, invocation: Box<dyn Invocation>) -> Result<Box<dyn Any>>;
}

pub trait Invocation {
    fn args(&self) -> &[DynValue];

    // Every link the crate builds overrides this; an implementor that
    // forgets to override it gets a stable error instead of a panic.
    fn invoke(self: Box<Self>) -> Result<Box<dyn Any>> {
        Err(ContextError::NotImplemented("Invocation::invoke"))
    }
}

pub(crate) struct InnerInvocation<R> {
    pub args: Vec<DynValue>,
    pub call: Box<dyn FnOnce() -> Result<R>>,
}

impl<R: 'static> Invocation for InnerInvocation<R> {
    fn args(&self) -> &[DynValue] {
        &self.args
    }

    fn invoke(self: Box<Self>) -> Result<Box<dyn Any>> {
        (self.call)().map(|r| Box::new(r) as Box<dyn Any>)
    }
}

pub(crate) struct CompositeInvocation {
    pub args: Vec<DynValue>,
    pub inner: Box<dyn Invocation>,
    pub controller: Arc<dyn Controller>,
}

impl Invocation for CompositeInvocation {
    fn args(&self) -> &[DynValue] {
        &self.args
    }

    fn invoke(self: Box<Self>) -> Result<Box<dyn Any>> {
        let CompositeInvocation {
            inner, controller, ..
        } = *self;
        controller.on_context(inner)
    }
}

// The chain is always built and consumed within one `run_in_context` call
// with a single, known `R`, so this can never observe a mismatch.
pub(crate) fn downcast<R: 'static>(value: Box<dyn Any>) -> R {
    *value
        .downcast::<R>()
        .unwrap_or_else(|_| unreachable!("invocation chain produced an unexpected type"))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BareInvocation;

    impl Invocation for BareInvocation {
        fn args(&self) -> &[DynValue] {
            &[]
        }
    }

    #[test]
    fn base_invoke_is_not_implemented() {
        let err = Box::new(BareInvocation).invoke().unwrap_err();
        assert_eq!(err.code(), crate::error::ERR_METHOD_NOT_IMPLEMENTED);
    }
}
