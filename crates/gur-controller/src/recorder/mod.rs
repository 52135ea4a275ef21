//! Trial recorder
//!
//! - [`TrialLog`]: durable CSV log with trial-id recovery
//! - [`TrialLogWriter`]: background appender used by the runtime

pub mod trial_log;
pub mod writer;

pub use trial_log::{next_trial_id, TrialLog};
pub use writer::{TrialLogWriter, WriterStats};
