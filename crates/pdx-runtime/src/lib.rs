//! Orchestration loop for private data exchange (PDX).
//!
//! Feeds observed records through the exchange engine and the retention
//! enforcer, in one of two modes chosen by [`ExchangeConfig::mode`]:
//!
//! - **sweep**: every interval, scan all public records and process them in
//!   a bounded worker pool ([`Sweeper`]);
//! - **subscription**: follow the change feed from a checkpoint and
//!   resubscribe after a disconnect ([`Subscriber`]).
//!
//! # Design Rules
//!
//! 1. Failures are contained per record. A record's error is reported in its
//!    [`RecordReport`] and never aborts the rest of the sweep or session.
//! 2. A sweep is complete only when every record task has been joined.
//! 3. Shutdown is observed between records, never inside one.
//! 4. No ambient state: store, clock, participant, and handler are passed in.

pub mod clock;
pub mod config;
pub mod error;
pub mod node;
pub mod processor;
pub mod subscription;
pub mod sweep;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ExchangeConfig, Mode};
pub use error::{RuntimeError, RuntimeResult};
pub use node::{ExchangeNode, NodeExit};
pub use processor::{RecordProcessor, RecordReport};
pub use subscription::Subscriber;
pub use sweep::{SweepReport, Sweeper};
