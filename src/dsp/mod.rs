//! DSP — the effect chain and the pieces it is built from.
//!
//! Everything here runs in Rust on fixed 128-frame quanta, so the live
//! preview and the offline export produce the same signal for the same
//! parameters.

pub mod convolver;
pub mod filter;
pub mod graph;
pub mod impulse;
pub mod renderer;
pub mod source;
pub mod wav;
