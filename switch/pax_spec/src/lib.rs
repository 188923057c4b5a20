// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Wire-level definitions for the PAX switch management interface.
//!
//! These are the structures and constants exchanged with the switch firmware
//! through the MRPC window of the Global Address Space (GAS): the MRPC
//! register layout itself, the management command set, the fabric structures
//! (link status, HVD bind, GFMS endpoint-port dumps), the event model, and
//! the per-port bandwidth counters.
//!
//! Everything here is plain data; the `pax_switch` crate provides the
//! transport that moves these bytes.

#![forbid(unsafe_code)]

pub mod event;
pub mod fabric;
pub mod mrpc;
pub mod pcie;
pub mod pmon;
