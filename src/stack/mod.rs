mod controller_stack;
mod frame;

pub use controller_stack::ControllerStack;
