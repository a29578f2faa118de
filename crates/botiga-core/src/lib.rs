pub mod config;
pub mod engine;
pub mod errors;
pub mod judge;
pub mod model;
pub mod prompt;
pub mod providers;
pub mod report;
pub mod storage;
