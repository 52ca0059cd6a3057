pub mod cli;
pub mod clone;
pub mod common;
pub mod config;
pub mod menu;
pub mod self_update;
pub mod ui;
