pub mod executor;
pub mod processor;
pub mod runner;
