//! tuimuppet CLI
//!
//! Loads a scenario directory, builds the backend the scenario asks for,
//! runs it and writes the report.

pub mod config;
pub mod loader;
pub mod output;
