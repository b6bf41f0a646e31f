pub mod details;
pub mod evaluator;
mod log_builder;
