pub mod collector;
pub mod indicators;
pub mod metrics;
pub mod monitoring;
pub mod storage;
pub mod supervisor;
pub mod updater;

pub mod config;
pub mod error;
pub mod logger;
pub mod time;
