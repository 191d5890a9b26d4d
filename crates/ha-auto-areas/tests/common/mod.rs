//! Common test utilities for the auto areas integration tests

mod test_hass;

pub use test_hass::*;
