pub mod classify;
pub mod predict;
