//! Sandbox module containing admission control and both executors.

pub mod admission;
pub mod config;
pub mod dispatch;
pub mod isolate;
pub mod limits;
pub mod outcome;
pub mod process;
