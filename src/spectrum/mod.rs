pub mod compressor;
pub mod math;

pub use compressor::{compress, compress_into, compress_normalized, limit, CompressorOptions};
pub use math::{
    linear_resample, linear_resample_into, log_parabolic_resample, log_parabolic_resample_into,
    normalize_8bit, VISUALIZER_BIN_COUNT,
};
