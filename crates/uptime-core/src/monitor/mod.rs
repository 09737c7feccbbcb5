pub mod engine;
pub mod state;

pub use engine::{Scheduler, TickSummary};
pub use state::{Direction, EndpointState, EndpointStatus, Transition};
