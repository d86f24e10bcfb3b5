//! # Arena Game Client Library
//!
//! This library provides the client side of the arena game: it mirrors the
//! server's entities locally, smooths what it draws and reacts to one-shot
//! events, while the server stays the only authority on game state.
//!
//! ## Architecture Overview
//!
//! ### Mirrors
//! Every entity the server reports gets a local [`mirror::Mirror`]. The first
//! message carries its full state; later messages carry only changed fields,
//! which pass through a pre-update hook, an atomic apply and a post-update
//! hook. The hooks detect edges (a sword swing starting, a new angle) and
//! emit [`mirror::Effect`]s such as particles, zoom and HUD refreshes.
//!
//! ### Client-Side Prediction
//! The self entity's aim is applied the moment the input is produced and
//! stays on screen until the server acknowledges that input, so aiming never
//! waits on a round trip.
//!
//! ### Interpolation
//! Other entities move and turn toward each new confirmed value over a short,
//! fixed window instead of snapping to it.
//!
//! ### Removal Transition
//! Removed entities fade out for the window the server announces on connect.
//! Their animations are cancelled before the mirror is dropped.
//!
//! ## Module Organization
//!
//! - `mirror`: per-entity state, hooks, interpolation and effects
//! - `tween`: time-based property animations
//! - `game`: snapshot and diff application, prediction, removal
//! - `input`: sequenced inputs and the bot that produces them
//! - `network`: the WebSocket session loop
//! - `error`: client error type
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::new("ws://127.0.0.1:8080", "bot", None);
//!
//!     // Plays for ten seconds, then disconnects cleanly.
//!     client.run(Some(Duration::from_secs(10))).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod game;
pub mod input;
pub mod mirror;
pub mod network;
pub mod tween;

pub use error::ClientError;
