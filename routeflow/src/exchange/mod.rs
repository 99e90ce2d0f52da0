//! The unit of work flowing through a pipeline.
//!
//! This module provides:
//! - Messages (headers + JSON body)
//! - A thread-safe property bag for out-of-band flags
//! - The `UnitOfWork` with its error slot and completion hooks

mod message;
mod properties;
mod synchronization;
mod unit_of_work;

pub use message::Message;
pub use properties::PropertyBag;
pub use synchronization::{OnCompletion, Synchronization};
pub use unit_of_work::{UnitOfWork, DUPLICATE_MESSAGE, FAILURE_HANDLED};
