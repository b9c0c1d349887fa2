//! Step definitions for milestone settlement scenarios.

mod given;
mod then;
pub mod world;
