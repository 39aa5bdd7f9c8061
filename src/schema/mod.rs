//! Schema module - Configuration, population and persistence types.

mod arena;
mod config;
mod fitness;
mod persistence;
mod population;

pub use arena::*;
pub use config::*;
pub use fitness::*;
pub use persistence::*;
pub use population::*;
