//! modtrader: modular strategy backtester.
//!
//! Hexagonal architecture: the engine lives in [`domain`], collaborator
//! traits in [`ports`], concrete implementations in [`adapters`], the
//! command line in [`cli`].

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod ports;
