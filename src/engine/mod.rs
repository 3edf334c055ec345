// Engine module - THE CONDUCTOR
// Worker task that serializes every device operation behind a handle

mod collab;
mod config;
mod event;
mod worker;

pub use collab::{Clock, DeclineSink, FileSink, FixedClock, PersistenceSink, SystemClock};
pub use config::EngineConfig;
pub use event::{EngineError, EngineEvent};
pub use worker::{Engine, EngineHandle};
