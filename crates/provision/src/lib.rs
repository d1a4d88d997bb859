//! UE Provisioning
//!
//! Installs the SSH multiplexer and the throughput tool on rooted UE
//! devices, prepares Qualcomm diag logging, and brings up USB tethering
//! with the dropbear SSH server.

pub mod diag;
pub mod payloads;
pub mod sequencer;
pub mod tether;

pub use payloads::{DeviceAbi, PayloadError, PayloadStore};
pub use sequencer::{ProvisionReport, Sequencer, SequencerError};
pub use tether::{TetherControl, TetherError};
