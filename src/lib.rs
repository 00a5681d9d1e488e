//! # Scope DAQ Core Library
//!
//! This crate drives a bench oscilloscope over SCPI. Its core is a generic
//! *setting namespace*: a typed table that maps readable setting names to SCPI
//! command fragments, caches the instrument state, validates writes against an
//! allow-list before anything is transmitted, and confirms every exchange
//! against the instrument's own error queue.
//!
//! ## Crate Structure
//!
//! Data flows strictly downward through these modules:
//!
//! - **`controller`**: `Oscilloscope`, which owns one link plus a facade per
//!   subsystem and orchestrates waveform capture.
//! - **`subsystems`**: the Trigger, Channel, Timebase and Waveform facades, each a
//!   thin typed wrapper around a `SettingNamespace`.
//! - **`namespace`**: the generic cached/validated setting namespace.
//! - **`link`**: `InstrumentLink`, the single choke point for instrument I/O with
//!   mandatory error-queue verification.
//! - **`session`**: the `Session` transport trait with TCP and simulated
//!   implementations, plus bounded interactive resource selection.
//!
//! Supporting modules:
//!
//! - **`config`**: Figment-based configuration (TOML file + `SCOPE_` environment).
//! - **`error`**: the `ScopeError` enum shared by every layer.
//! - **`export`**: CSV export of captured traces.
//! - **`tracing_init`**: `tracing-subscriber` setup.

/// Log an I/O event at `info` when verbose, `debug` otherwise.
macro_rules! io_event {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}

pub mod config;
pub mod controller;
pub mod error;
#[cfg(feature = "storage_csv")]
pub mod export;
pub mod link;
pub mod namespace;
pub mod session;
pub mod subsystems;
pub mod tracing_init;

pub use controller::{Oscilloscope, ScopeOptions};
pub use error::{Result, ScopeError, Severity};
pub use link::{InstrumentLink, SharedLink};
pub use namespace::{AllowList, CommandTable, NamespaceState, SettingNamespace};
pub use subsystems::{Channel, ChannelId, Timebase, Trigger, Waveform};
