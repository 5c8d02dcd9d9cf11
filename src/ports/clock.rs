//! Clock port.
//!
//! Handlers and the sweep read time through this trait so tests can pin it.

use crate::domain::foundation::Timestamp;

pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}
