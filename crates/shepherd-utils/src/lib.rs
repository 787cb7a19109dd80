pub mod atomic_write;
pub mod error;
pub mod exit_codes;
pub mod logging;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;
