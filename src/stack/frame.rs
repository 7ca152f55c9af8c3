use std::sync::Arc;

use indexmap::IndexMap;

use crate::controller::Controller;

pub(crate) struct Frame {
    pub(crate) id: String,
    pub(crate) segments: IndexMap<String, Arc<dyn Controller>>,
}

impl Frame {
    pub(crate) fn new(id: String, segments: IndexMap<String, Arc<dyn Controller>>) -> Self {
        Self { id, segments }
    }
}
