//! Public detector surface: parameters, validation and the pipeline.

pub mod params;
mod pipeline;
mod reconstruct;

pub use params::{OverlapMode, ParamError, RidgeMode, RidgeParams};
pub use pipeline::RidgeDetector;
