// only use std when feature = "std" is enabled or during testing
#![cfg_attr(not(any(test, feature = "std")), no_std)]

mod fmt;

pub mod autotune;
pub mod config;
pub mod excitation;
pub mod io;
pub mod readings;
pub mod record;
pub mod sample_queue;
pub mod sampler;
pub mod stabilization;
pub mod stats;
pub mod system_ident;
pub mod time;

pub use autotune::{Autotune, AutotuneInitError, AutotuneState, TickOutcome};
pub use config::{AutotuneConfig, DEFAULT_QUEUE_CAPACITY};
pub use record::SystemIdent;
pub use sample_queue::{Sample, SampleQueue};
pub use sampler::GyroSampler;
pub use system_ident::{State, SystemIdentFilter};

#[cfg(test)]
mod tests;
