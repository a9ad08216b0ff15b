//! Data types for dialogue content: nodes, characters, and assets.

pub mod asset;
pub mod character;
pub mod node;
