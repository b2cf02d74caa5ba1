//! Background tasks for the roster service.
//!
//! - `fanout` - best-effort delivery of timeline batches to the realtime
//!   channel and the external webhook

pub mod fanout;

pub use fanout::{run_fanout_worker, FanoutConfig, FanoutHandle, FanoutJob, FANOUT_QUEUE_DEPTH};
