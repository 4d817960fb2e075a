//! Decentralized congestion control for periodic vehicular beaconing.
//!
//! Each [`engine::DccEngine`] watches the busy/idle state of the shared
//! channel, keeps short- and long-horizon windows of the busy ratio, and
//! moves a hysteresis state machine whose state picks the beacon interval,
//! data rate or transmit power. [`sim`] hosts many engines on one medium.

use std::time::Duration;

pub mod api;
pub mod channel;
pub mod config;
pub mod dcc;
pub mod engine;
pub mod error;
pub mod sim;
pub mod state;

pub type SimTime = Duration;
