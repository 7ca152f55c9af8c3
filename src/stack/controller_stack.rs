use std::sync::Arc;

use indexmap::IndexMap;

use super::frame::Frame;
use crate::controller::Controller;
use crate::error::{ContextError, Result};
use crate::util::new_frame_id;

#[derive(Default)]
pub struct ControllerStack {
    frames: Vec<Frame>,
}

impl ControllerStack {
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    pub fn push(&mut self, segments: IndexMap<String, Arc<dyn Controller>>) -> Result<String> {
        let id = new_frame_id();
        self.frames.push(Frame::new(id.clone(), segments));
        Ok(id)
    }

    pub fn pop(&mut self, frame_id: &str) -> Result<()> {
        match self.frames.last() {
            None => Err(ContextError::IndexOutOfRange),
            Some(top) if top.id == frame_id => {
                self.frames.pop();
                Ok(())
            }
            Some(_) => Err(ContextError::InvalidFrameId(frame_id.to_string())),
        }
    }

    pub fn lookup(&self, segment_name: &str) -> Option<Arc<dyn Controller>> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.segments.get(segment_name).cloned())
    }

    // Later frames override earlier ones on key collision. Independent of
    // the receiver afterwards: controllers are shared via `Arc`, never moved.
    pub fn fork(&self, new_frame_id: String) -> ControllerStack {
        let mut merged: IndexMap<String, Arc<dyn Controller>> = IndexMap::new();
        for frame in &self.frames {
            for (name, controller) in &frame.segments {
                merged.insert(name.clone(), Arc::clone(controller));
            }
        }
        ControllerStack {
            frames: vec![Frame::new(new_frame_id, merged)],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
