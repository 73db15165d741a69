// SPDX-License-Identifier: MIT OR Apache-2.0

#[allow(clippy::module_inception)]
mod controller;
mod snapshot;
mod state;

pub use controller::{ControllerError, GraphViewController};
pub use snapshot::Snapshot;
