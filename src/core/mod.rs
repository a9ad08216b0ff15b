//! Runtime: node loading, timed effects, and the dialogue state machine.

pub mod audio;
pub mod config;
pub mod engine;
pub mod fader;
pub mod store;
pub mod surface;
pub mod timing;
pub mod typewriter;
