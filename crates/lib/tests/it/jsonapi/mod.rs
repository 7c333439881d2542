//! Network adapter integration tests
//!
//! This module tests the JSON:API layer: request shaping, document
//! normalization into the collection, the save/destroy lifecycle, and
//! one end-to-end exchange over a real HTTP server.

pub mod helpers;
mod requests;
mod sync;
