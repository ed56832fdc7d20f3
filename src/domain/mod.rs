//! Core engine: series handling, strategy modules, signal combination and
//! trade simulation. Nothing in here performs I/O.

pub mod backtest;
pub mod combiner;
pub mod config_validation;
pub mod error;
pub mod event;
pub mod indicator_helpers;
pub mod module;
pub mod modules;
pub mod position;
pub mod series;
pub mod session;
pub mod simulator;
pub mod standardize;
pub mod strategy;
pub mod summary;
pub mod trade;
