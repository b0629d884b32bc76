//! Billable time and focus session tracking from the terminal.
//! A running timer is snapshotted after every change, so it survives the process exiting and is
//! picked up again by the next command.
//!

pub mod app;
pub mod cli;
pub mod config;
pub mod fs;
pub mod storage;
pub mod timer;
pub mod utils;
