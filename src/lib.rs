pub mod app;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod fs_util;
pub mod listing;
pub mod location;
pub mod output;
pub mod planner;
pub mod progress;
pub mod s3;
pub mod session;
pub mod store;
pub mod tui;
