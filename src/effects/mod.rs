pub mod preset;

pub use preset::{PresetManager, Theme, ThemePreset};
