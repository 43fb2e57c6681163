//! Spectra: a desktop audio player built around a real-time analysis and
//! rendering pipeline.
//!
//! Decoded audio flows through a fixed graph
//! (`source -> intensity gain -> analysis tap -> volume gain -> output`).
//! Once per display frame the [`render_loop::RenderLoop`] samples the tap,
//! feeds the active [`visualizers::Visualizer`] and advances the
//! [`audio::BeatDetector`] against the playback clock.

pub mod app;
pub mod audio;
pub mod effects;
pub mod error;
pub mod graphics;
pub mod integrations;
pub mod library;
pub mod render_loop;
pub mod settings;
pub mod spectrum;
pub mod visualizers;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{Error, Result};
