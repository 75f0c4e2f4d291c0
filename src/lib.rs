pub mod agents;
pub mod api;
pub mod cli;
pub mod clock;
pub mod engine;
pub mod runner;
pub mod storage;
