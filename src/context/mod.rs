mod view;

pub use view::ExecutionContextView;
