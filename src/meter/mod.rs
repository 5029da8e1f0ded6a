//! Analytics event vocabulary.

pub mod events;
