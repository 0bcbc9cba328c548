//! tuimuppet scenario engine
//!
//! Drives an interactive terminal application through a [`Backend`] and turns
//! scripted sequences of steps into a [`RunReport`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     ScenarioRunner                          │
//! │    ├── RunPlan::build()   merge macros, resolve order,      │
//! │    │                      expand macro steps (pre-launch)   │
//! │    ├── launch + readiness gate                              │
//! │    ├── per sequence: ensure matcher, Interpreter::run_step  │
//! │    └── report::build()    aggregate + validate              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Backend (trait)                                            │
//! │    ├── FakeBackend   scripted screen, simulated exit        │
//! │    ├── TmuxBackend   detached tmux session                  │
//! │    └── PtyBackend    pseudo-terminal + terminal emulator,   │
//! │                      response forwarding, transcript        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod artifacts;
pub mod backend;
pub mod interpreter;
pub mod macros;
pub mod matcher;
pub mod report;
pub mod runner;
pub mod stability;
pub mod timing;

pub use backend::{build_backend, Backend, BackendOptions};
pub use runner::{RunPlan, ScenarioRunner};
pub use tuimuppet_common::{Error, Result, RunReport};
