pub mod checkpoint;
pub mod config;
pub mod data;
pub mod error;
pub mod feature;
pub mod io;
pub mod lr;
pub mod mask;
pub mod metric;
pub mod mixup;
pub mod model;
pub mod task;
pub mod train;
pub mod valid;

#[cfg(test)]
mod util;
