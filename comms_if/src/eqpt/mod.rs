//! # Equipment Interface
//!
//! This module defines the sensor payloads which are sent from the simulator bridge to the
//! harness.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod cam;
