//! Configuration helpers for the command line.

pub mod duration;

pub use duration::parse_duration;
