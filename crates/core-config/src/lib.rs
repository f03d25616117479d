//! Engine configuration loading and parsing.
//!
//! Parses `plotline.toml` (or an explicit override path) into a tolerant
//! [`ConfigFile`] (unknown fields are ignored so configs survive engine
//! upgrades), then clamps the raw values against runtime context in
//! [`Config::apply_context`]: worker counts against available parallelism,
//! fps against a sane ceiling. The raw parsed values are retained so a
//! later context change can re-clamp.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

pub const DEFAULT_CONFIG_NAME: &str = "plotline.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// Target tick rate.
    #[serde(default = "defaults::fps")]
    pub fps: u32,
    /// Worker thread count; 0 = derive from available parallelism.
    #[serde(default)]
    pub workers: usize,
    /// Packets drained per receiver tick.
    #[serde(default = "defaults::max_packets_per_tick")]
    pub max_packets_per_tick: usize,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            fps: defaults::fps(),
            workers: 0,
            max_packets_per_tick: defaults::max_packets_per_tick(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CanvasSection {
    #[serde(default = "defaults::canvas_mm")]
    pub width_mm: f32,
    #[serde(default = "defaults::canvas_mm")]
    pub height_mm: f32,
    /// Window pixels per millimetre.
    #[serde(default = "defaults::render_scale")]
    pub render_scale: u32,
    /// RGBA in [0, 1].
    #[serde(default = "defaults::background")]
    pub background: [f32; 4],
}

impl Default for CanvasSection {
    fn default() -> Self {
        Self {
            width_mm: defaults::canvas_mm(),
            height_mm: defaults::canvas_mm(),
            render_scale: defaults::render_scale(),
            background: defaults::background(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    #[serde(default = "defaults::shape_cache")]
    pub shape_entries: usize,
    #[serde(default = "defaults::chain_cache")]
    pub chain_entries: usize,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            shape_entries: defaults::shape_cache(),
            chain_entries: defaults::chain_cache(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub canvas: CanvasSection,
    #[serde(default)]
    pub cache: CacheSection,
}

mod defaults {
    pub fn fps() -> u32 {
        60
    }
    pub fn max_packets_per_tick() -> usize {
        2
    }
    pub fn canvas_mm() -> f32 {
        200.0
    }
    pub fn render_scale() -> u32 {
        4
    }
    pub fn background() -> [f32; 4] {
        [1.0, 1.0, 1.0, 1.0]
    }
    pub fn shape_cache() -> usize {
        128
    }
    pub fn chain_cache() -> usize {
        256
    }
}

/// Runtime facts the raw config is clamped against.
#[derive(Debug, Clone, Copy)]
pub struct ConfigContext {
    pub available_parallelism: usize,
}

impl ConfigContext {
    pub fn detect() -> Self {
        Self {
            available_parallelism: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

/// Parsed config plus the clamped effective values the engine actually
/// uses.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Parsed (or default) data, pre-clamp.
    pub file: ConfigFile,
    pub effective_workers: usize,
    pub effective_fps: u32,
}

impl Config {
    /// Clamp raw values against `ctx`. Workers: explicit value capped at
    /// available parallelism; 0 derives "all but one core", at least 1.
    pub fn apply_context(&mut self, ctx: ConfigContext) {
        let cores = ctx.available_parallelism.max(1);
        self.effective_workers = match self.file.engine.workers {
            0 => (cores - 1).max(1),
            n => n.min(cores),
        };
        self.effective_fps = self.file.engine.fps.clamp(1, 240);
    }
}

/// Load from `path` if given, else from `plotline.toml` in the working
/// directory, else defaults. A present-but-invalid file is an error; a
/// missing file is not.
pub fn load_from(path: Option<&Path>, ctx: ConfigContext) -> Result<Config> {
    let (text, source): (Option<String>, Option<PathBuf>) = match path {
        Some(p) => {
            let text = std::fs::read_to_string(p)
                .with_context(|| format!("reading config {}", p.display()))?;
            (Some(text), Some(p.to_owned()))
        }
        None => {
            let default = Path::new(DEFAULT_CONFIG_NAME);
            if default.exists() {
                (
                    Some(
                        std::fs::read_to_string(default)
                            .with_context(|| format!("reading config {DEFAULT_CONFIG_NAME}"))?,
                    ),
                    Some(default.to_owned()),
                )
            } else {
                (None, None)
            }
        }
    };

    let file: ConfigFile = match &text {
        Some(text) => toml::from_str(text).context("parsing config")?,
        None => ConfigFile::default(),
    };
    let mut config = Config {
        file,
        effective_workers: 0,
        effective_fps: 0,
    };
    config.apply_context(ctx);
    info!(
        target: "config",
        source = source.as_ref().map(|p| p.display().to_string()).as_deref(),
        fps = config.effective_fps,
        workers = config.effective_workers,
        "config_loaded"
    );
    Ok(config)
}
