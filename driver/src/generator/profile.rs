use anyhow::Context;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use trackcore::model::Dataset;

/// Configuration for generating a synthetic measurement run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub rows: usize,
    /// Travelled distance between consecutive rows, meters.
    pub step_m: f64,
    /// Rail profile wavelength, meters.
    pub wavelength_m: f64,
    pub amplitude: f64,
    pub noise: f64,
    /// Every n-th row gets a spike for the outlier stage to clean up.
    pub spike_every: usize,
    pub spike_height: f64,
    pub seed: u64,
    pub scenario: Option<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            rows: 1024,
            step_m: 0.25,
            wavelength_m: 24.0,
            amplitude: 3.0,
            noise: 0.15,
            spike_every: 97,
            spike_height: 40.0,
            seed: 0,
            scenario: None,
        }
    }
}

/// Builds a synthetic track recording: sinusoidal rail levels with phase
/// offsets per channel, measurement jitter, and periodic spikes.
pub fn build_track_dataset_from_config(config: &GeneratorConfig) -> anyhow::Result<Dataset> {
    let rows = config.rows;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut data = Dataset::new();

    for row in 0..rows {
        let travelled = row as f64 * config.step_m;
        let phase = 2.0 * PI * travelled / config.wavelength_m.max(f64::EPSILON);
        let mut levels = [0.0f64; 6];
        for (channel, level) in levels.iter_mut().enumerate() {
            let offset = channel as f64 * 0.4;
            let jitter = rng.gen_range(-config.noise..=config.noise);
            *level = config.amplitude * (phase + offset).sin() + jitter;
        }
        if config.spike_every > 0 && row % config.spike_every == config.spike_every - 1 {
            levels[0] += config.spike_height;
        }
        let encoder = 10.0 + rng.gen_range(-config.noise..=config.noise);
        let angle = 0.05 * (phase * 2.0).cos();
        data.push_row(
            row as u64 + 1,
            travelled,
            &[
                ("Level1", Some(levels[0])),
                ("Level2", Some(levels[1])),
                ("Level3", Some(levels[2])),
                ("Level4", Some(levels[3])),
                ("Level5", Some(levels[4])),
                ("Level6", Some(levels[5])),
                ("Encoder3", Some(encoder)),
                ("Ang1", Some(angle)),
                ("Ang2", Some(angle * 0.5)),
                ("Ang3", Some(-angle)),
            ],
        );
    }

    data.validate()
        .context("validating the generated dataset")?;
    Ok(data)
}

pub fn build_track_dataset(rows: usize, seed: u64) -> anyhow::Result<Dataset> {
    let config = GeneratorConfig {
        rows,
        seed,
        ..Default::default()
    };
    build_track_dataset_from_config(&config)
}
