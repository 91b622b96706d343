pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod server;
pub mod storage;
