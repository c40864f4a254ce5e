//! HTTP and websocket handlers.

pub mod auth;
pub mod branch;
pub mod deliveries;
pub mod inventory;
pub mod metrics;
pub mod sales;
pub mod session;
pub mod ws;
