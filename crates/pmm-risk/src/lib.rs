//! Notional exposure risk manager.
//!
//! A pure state machine over running per-symbol and global notional
//! exposure. Each tick the orchestrator asks `check()` whether a
//! symbol may quote (`Ok`), must sit out a cooldown (`Pause` /
//! `GlobalPause`), or must be force-flattened (`Flat`).

pub mod manager;

pub use manager::{RiskAction, RiskLimits, RiskManager};
