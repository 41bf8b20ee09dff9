#![cfg_attr(not(test), no_std)]

//! pico_settings - Runtime settings engine for Raspberry Pi Pico W/2W class devices
//!
//! This library loads device and application settings from Flash at boot,
//! applies remote update requests, and publishes the current state as
//! size-bounded JSON documents.

extern crate alloc;

// Platform abstraction layer (Flash)
pub mod platform;

// Core systems: logging, time, settings engine
pub mod core;
