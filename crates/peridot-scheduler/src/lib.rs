//! Job scheduling for peridot.
//!
//! Turns job plans into stored jobs and hands ready jobs to agents through
//! a [`Dispatcher`].

pub mod dispatch;
pub mod error;
pub mod plan;
pub mod worker;

pub use dispatch::{Dispatcher, JsonLinesDispatcher};
pub use error::{SchedulerError, SchedulerResult};
pub use plan::submit_plan;
pub use worker::{PollOutcome, Worker};
