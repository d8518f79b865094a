//! Exit codes and startup failure reporting for hostkeep
//!
//! 0, 1, 2 and 130 are stable; scheduled jobs alert on them.

use hostkeep_common::display;
use std::fmt::Display;
use tracing::error;

pub use hostkeep_common::{EXIT_HARD_FAILURE, EXIT_INTERRUPTED, EXIT_PRECONDITION, EXIT_SUCCESS};

/// Report a failure that ends the run before any step, and return the
/// precondition exit code. `logged` is false until logging is initialised.
pub fn precondition_failed(err: impl Display, logged: bool) -> i32 {
    if logged {
        error!("precondition failed: {}", err);
    }
    display::error(&err.to_string());
    EXIT_PRECONDITION
}
