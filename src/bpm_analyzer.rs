use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;

use spectra::audio::{estimate_tempo, RodioDecoder, TempoConfig, TrackDecoder};
use spectra::library::parse_file_name;

#[derive(Parser)]
#[command(name = "bpm-analyzer")]
#[command(about = "Estimate the tempo and beat offset of an audio file")]
struct Args {
    /// Audio file to analyse (MP3, WAV, FLAC, OGG, M4A)
    #[arg()]
    input_file: PathBuf,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Slowest tempo considered
    #[arg(long, default_value_t = 60.0)]
    min_bpm: f32,

    /// Fastest tempo considered
    #[arg(long, default_value_t = 200.0)]
    max_bpm: f32,
}

#[derive(Serialize)]
struct Report {
    file: String,
    title: String,
    duration_seconds: f64,
    bpm: f32,
    beat_offset: f64,
    confidence: f32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
    let args = Args::parse();

    info!("🎵 Analysing {}", args.input_file.display());
    let started = Instant::now();

    let bytes = std::fs::read(&args.input_file)
        .with_context(|| format!("Failed to read {}", args.input_file.display()))?;
    let buffer = RodioDecoder
        .decode(bytes)
        .with_context(|| format!("Failed to decode {}", args.input_file.display()))?;

    let config = TempoConfig {
        min_bpm: args.min_bpm,
        max_bpm: args.max_bpm,
        ..TempoConfig::default()
    };
    let estimate = estimate_tempo(&buffer.mono(), buffer.sample_rate, &config).context("Tempo estimation failed")?;
    info!("✅ Analysis finished in {:.2}s", started.elapsed().as_secs_f64());

    let file_name = args
        .input_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let report = Report {
        title: parse_file_name(&file_name).display_name(),
        file: args.input_file.display().to_string(),
        duration_seconds: buffer.duration(),
        bpm: estimate.bpm,
        beat_offset: estimate.offset,
        confidence: estimate.confidence,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.title);
        println!("  Duration:    {:.2}s", report.duration_seconds);
        println!("  BPM:         {}", report.bpm);
        println!("  Beat offset: {:.3}s", report.beat_offset);
        println!("  Confidence:  {:.2}", report.confidence);
    }
    Ok(())
}
