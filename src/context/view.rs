use std::sync::{Arc, Mutex};

use indexmap::IndexMap;

use crate::controller::{
    downcast, CompositeInvocation, Controller, ControllerData, DynValue, InnerInvocation,
    Invocation,
};
use crate::error::{ContextError, Result};
use crate::logger::{debug, trace, warn};
use crate::stack::ControllerStack;
use crate::util::new_frame_id;

struct ViewState {
    stack: ControllerStack,
    strict_controllers: bool,
    strict_segments: bool,
}

// Cheap to clone: every clone shares the same underlying state.
#[derive(Clone)]
pub struct ExecutionContextView {
    state: Arc<Mutex<ViewState>>,
}

impl ExecutionContextView {
    pub fn new(strict_controllers: bool, strict_segments: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(ViewState {
                stack: ControllerStack::new(),
                strict_controllers,
                strict_segments,
            })),
        }
    }

    pub fn is_strict_controllers(&self) -> bool {
        self.state.lock().unwrap().strict_controllers
    }

    pub fn is_strict_segments(&self) -> bool {
        self.state.lock().unwrap().strict_segments
    }

    pub fn push_controllers(&self, segments: IndexMap<String, Arc<dyn Controller>>) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if state.strict_controllers {
            for name in segments.keys() {
                if state.stack.lookup(name).is_some() {
                    return Err(ContextError::InvalidOptionValue {
                        option: "segments",
                        value: name.clone(),
                    });
                }
            }
        }
        let id = state.stack.push(segments)?;
        trace!("push_controllers -> frame {}", id);
        Ok(id)
    }

    pub fn pop_controllers(&self, frame_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.stack.pop(frame_id)?;
        trace!("pop_controllers <- frame {}", frame_id);
        Ok(())
    }

    // A `true` argument upgrades a strictness flag; anything else
    // preserves the current value.
    pub fn fork(&self, strict_controllers: Option<bool>, strict_segments: Option<bool>) -> Self {
        let state = self.state.lock().unwrap();
        let id = new_frame_id();
        let forked_stack = state.stack.fork(id);
        let strict_controllers = state.strict_controllers || strict_controllers.unwrap_or(false);
        let strict_segments = state.strict_segments || strict_segments.unwrap_or(false);
        drop(state);

        Self {
            state: Arc::new(Mutex::new(ViewState {
                stack: forked_stack,
                strict_controllers,
                strict_segments,
            })),
        }
    }

    // Segments are chained in `segment_options`' declaration order, so the
    // last one added is the outermost and runs first. The pushed frame is
    // always popped, even when the chain returns an error.
    pub fn run_in_context<R: 'static>(
        &self,
        segment_options: IndexMap<String, ControllerData>,
        args: Vec<DynValue>,
        call: impl FnOnce() -> Result<R> + 'static,
    ) -> Result<R> {
        let mut invocation: Box<dyn Invocation> = Box::new(InnerInvocation {
            args: args.clone(),
            call: Box::new(call),
        });

        let mut children: IndexMap<String, Arc<dyn Controller>> = IndexMap::new();
        {
            let state = self.state.lock().unwrap();
            for (segment, data) in segment_options {
                let controller = match state.stack.lookup(&segment) {
                    Some(c) => c,
                    None => {
                        if state.strict_segments {
                            return Err(ContextError::InvalidArgValue {
                                arg: "segment_options",
                                value: segment,
                            });
                        }
                        continue;
                    }
                };
                let child: Arc<dyn Controller> = Arc::from(controller.create_child(data)?);
                invocation = Box::new(CompositeInvocation {
                    args: args.clone(),
                    inner: invocation,
                    controller: Arc::clone(&child),
                });
                children.insert(segment, child);
            }
        }

        let frame_id = {
            let mut state = self.state.lock().unwrap();
            state.stack.push(children)?
        };
        debug!("run_in_context: pushed frame {}", frame_id);

        let result = invocation.invoke();

        {
            let mut state = self.state.lock().unwrap();
            if let Err(e) = state.stack.pop(&frame_id) {
                warn!("run_in_context: failed to pop frame {}: {}", frame_id, e);
            }
        }

        result.map(downcast::<R>)
    }
}
