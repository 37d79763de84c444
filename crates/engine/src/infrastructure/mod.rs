//! Infrastructure implementations.
//!
//! Contains port trait implementations for external dependencies.

pub mod app_settings;
pub mod clock;
pub mod gameplay;
pub mod image_renderer;
pub mod llm_manager;
pub mod media;
pub mod ollama;
pub mod persistence;
pub mod ports;
pub mod prompt_builder;
pub mod scripted_llm;
pub mod world_loader;
