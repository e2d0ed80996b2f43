//! Course recommendation and fitness evaluation service
//!
//! Peer-similarity retrieval over stored profile vectors proposes one more
//! course; a structured-generation service scores each candidate course
//! against the student's profile.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod services;
