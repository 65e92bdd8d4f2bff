// src/lib.rs

//! fleetwatch: flight-leg and fault monitoring for a small fleet.

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
