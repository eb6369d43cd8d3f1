#![forbid(unsafe_code)]

pub mod analysis;
pub mod app;
pub mod cli;
pub mod command;
pub mod commands;
pub mod error;
pub mod inflight;
pub mod logging;
pub mod model;
pub mod openai;
pub mod parse;
pub mod progress;
pub mod prompt;
pub mod provider;
pub mod sanitize;
pub mod scoring;
pub mod store;
