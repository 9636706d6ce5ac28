//! Pure rules engine. No I/O, no clocks; every operation is a total
//! function over owned branch state.

pub mod branch;
pub mod entity;
pub mod physics;
pub mod rules;
pub mod terrain;
pub mod timeline;
