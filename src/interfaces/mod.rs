//! Input and output surfaces of the batch runner.

pub mod csv;
pub mod snapshot;
