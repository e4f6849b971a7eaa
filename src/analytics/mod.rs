//! Click recording and operator-facing reporting
//!
//! The redirect path hands click metadata to [`ClickRecorder`] over a
//! bounded channel and never waits on it. A single actor task turns those
//! into [`ClickEvent`](crate::models::ClickEvent)s and appends them to the
//! event store in batches. [`Aggregator`] answers admin queries from the
//! stores without mutating anything.

pub mod aggregator;
pub mod ip_extractor;
pub mod recorder;
pub mod user_agent;

pub use aggregator::Aggregator;
pub use ip_extractor::{anonymize_ip, client_ip};
pub use recorder::ClickRecorder;
pub use user_agent::summarize_user_agent;
