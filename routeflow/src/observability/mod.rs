//! Observability utilities.

mod logging;

pub use logging::{init_tracing, uow_span, LoggingConfig};
