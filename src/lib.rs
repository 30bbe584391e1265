//! Turns product requirement documents into features, test points and test
//! cases by prompting an OpenAI-compatible inference engine.

pub mod api;
pub mod client;
pub mod config;
pub mod engine;
pub mod models;
pub mod pipeline;
pub mod quality;
pub mod render;
pub mod session;
pub mod stage;
