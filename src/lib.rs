//! Intune reconciliation jobs over Microsoft Graph
//!
//! - `attribute-sync`: keep a device extension attribute in line with
//!   custom attribute script results
//! - `build-ranges`: rebuild a compliance policy's valid OS build ranges
//!   from the Windows Update catalog

pub mod cmd;
pub mod config;
pub mod error;
pub mod graph;
pub mod reconcile;
pub mod secrets;
