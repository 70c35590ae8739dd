//! Eventual values with an attached re-fetch capability, and the polling
//! loop that drives them.

pub mod poll;
pub mod value;

pub use poll::{poll_until, PollOptions};
pub use value::Retryable;
