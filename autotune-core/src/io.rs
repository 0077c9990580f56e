//! Collaborators the autotune task talks to. The flight firmware implements
//! these on top of its object store, tests implement them with plain structs.

use crate::readings::{FlightStatus, ManualControlCommand};
use crate::record::SystemIdent;
use crate::stabilization::StabilizationDesired;

/// Snapshots of externally owned records, read once per period.
pub trait FlightSignals {
    fn flight_status(&mut self) -> FlightStatus;
    fn manual_control(&mut self) -> ManualControlCommand;
}

pub trait AutotunePublisher {
    #[cfg(feature = "defmt")]
    type Error: defmt::Format + core::fmt::Debug;
    #[cfg(not(feature = "defmt"))]
    type Error: core::fmt::Debug;

    /// Make the `SystemIdent` record known to the object store. Called once
    /// before the task starts.
    fn register(&mut self) -> Result<(), Self::Error>;

    fn publish_system_ident(&mut self, record: &SystemIdent);

    fn publish_stabilization_desired(&mut self, desired: &StabilizationDesired);

    /// Ask storage to persist the last published `SystemIdent`. Fire and
    /// forget, only issued while disarmed.
    fn request_save(&mut self);
}

pub trait Watchdog {
    fn feed(&mut self);
}

/// For targets without a watchdog.
impl Watchdog for () {
    fn feed(&mut self) {}
}
