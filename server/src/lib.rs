//! Presence and messaging relay server library.
//! This crate exposes internal modules for integration testing.
//! The binary entry point is in main.rs.

pub mod channels;
pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod notify;
pub mod presence;
pub mod push;
pub mod routes;
pub mod signaling;
pub mod state;
pub mod ws;
