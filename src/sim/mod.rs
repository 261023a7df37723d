pub mod scheduler;
pub mod simulator;

pub use scheduler::{EventId, Scheduler, SimTime, TimerQueue};
pub use simulator::{Node, NodeEvent, NodeEventKind, NodeTimers, Simulator};
