//! Dialogue Engine: branching visual-novel dialogue for games.
//!
//! Loads a graph of narrative nodes from RON or JSON documents, plays
//! their lines with a typewriter effect, swaps portraits, backgrounds and
//! music as lines and nodes ask for them, and follows player-chosen
//! options to the next node. Rendering, asset lookup and input polling
//! stay with the host behind small traits.

pub mod core;
pub mod schema;
