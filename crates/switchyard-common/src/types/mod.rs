//! Core types for Switchyard

pub mod clock;
pub mod mode;
pub mod profit;
pub mod workload;
