#![recursion_limit = "256"]

pub mod artifacts;
pub mod config;
pub mod error;
pub mod experiment;
pub mod graph;
pub mod optim;
