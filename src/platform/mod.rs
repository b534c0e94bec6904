/// Common cross-platform file utilities
pub mod common;

/// Single-instance lock file
pub mod lock;
