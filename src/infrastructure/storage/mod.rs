//! Local file persistence helpers.

pub mod atomic_file;

pub use atomic_file::{remove_if_exists, write_atomic, write_atomic_blocking};
