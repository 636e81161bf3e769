mod frame;
mod pull_listener;

pub use frame::*;
pub use pull_listener::*;
