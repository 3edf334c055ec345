// Connection module - THE LIFELINE
// Connection lifecycle, failure classification and scheduled reconnects

mod manager;
mod state;

pub use manager::{ConnectionConfig, ConnectionManager};
pub use state::{ConnectionPhase, ConnectionState, RetryDecision};
