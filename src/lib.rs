//! Divergence: a timeline-branching grid puzzle.
//!
//! `domain` is the rules engine, `sim` drives it from player intents and
//! loads levels, `config` reads the player's settings.

pub mod config;
pub mod domain;
pub mod error;
pub mod sim;
