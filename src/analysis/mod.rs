//! Derived metrics over reading history.

pub mod stats;

pub use self::stats::{compute, Statistics};
