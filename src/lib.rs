//! # Switchyard
//!
//! Facade over the workspace crates so the integration suite and benchmarks
//! can reach every layer through one dependency.

pub use switchyard_common as common;
pub use switchyard_engine as engine;
pub use switchyard_pricing as pricing;
