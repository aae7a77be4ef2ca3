//! Shader launch and section statistics.
//!
//! Every shader dispatch and every declared section can be bracketed by
//! a [`StatisticHandler`]; the per-thread handlers accumulate into
//! [`Statistics`] records which the device merges into one aggregate
//! for reporting.

pub mod handler;
pub mod key;
pub mod statistics;
pub mod types;

pub use handler::{SectionGuard, StatisticHandler};
pub use key::{ShaderKey, SmallShaderKey};
pub use statistics::{SectionStats, ShaderStats, Statistics};
pub use types::{Quantity, SectionType, ShaderType};
