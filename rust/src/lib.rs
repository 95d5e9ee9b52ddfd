//! ISO Adaptation Layer implemented in Rust

mod ffi;
pub mod isoal;
pub mod time;

pub use ffi::*;
