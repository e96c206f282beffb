pub mod events;
pub mod reactor;
pub mod timers;

pub use events::{Event, Generation, TimerKind};
pub use reactor::Reactor;
pub use timers::Timers;
