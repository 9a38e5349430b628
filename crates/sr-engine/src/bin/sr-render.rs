//! SonicRack offline renderer
//!
//! Usage:
//!   sr-render scene.json                    - Render and print levels
//!   sr-render scene.json -o mix.wav         - Also write a WAV file
//!   sr-render scene.json -d 30 --bits 16    - Override duration and bit depth
//!
//! Scene file:
//!
//! ```json
//! {
//!   "config": { "sampleRate": 48000, "blockSize": 128 },
//!   "assets": { "vox": "vox.wav", "ir": "cab.wav" },
//!   "commands": [ { "type": "TRACK_ADD", "payload": { "id": "t1", "name": "Vox" } } ],
//!   "duration": 10.0
//! }
//! ```
//!
//! Asset paths are resolved relative to the scene file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::Deserialize;
use sr_core::{EngineConfig, ModuleType, level_db};
use sr_engine::{AssetTable, EngineCommand, ExportFormat, OfflineRenderer, write_wav};

/// Fallback render length when neither the scene nor the CLI gives one
const DEFAULT_DURATION_SECS: f64 = 10.0;

#[derive(Parser)]
#[command(name = "sr-render", about = "Render a SonicRack scene offline")]
struct Cli {
    /// Scene file (JSON)
    scene: PathBuf,

    /// Output WAV file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Duration in seconds (overrides the scene)
    #[arg(short, long)]
    duration: Option<f64>,

    /// Output bit depth (16, 24 or 32 float)
    #[arg(long, default_value_t = 24)]
    bits: u16,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Scene {
    #[serde(default)]
    config: EngineConfig,
    #[serde(default)]
    assets: BTreeMap<String, PathBuf>,
    #[serde(default)]
    commands: Vec<EngineCommand>,
    duration: Option<f64>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let text = std::fs::read_to_string(&cli.scene)
        .with_context(|| format!("reading scene {}", cli.scene.display()))?;
    let scene: Scene = serde_json::from_str(&text).context("parsing scene")?;
    let format = ExportFormat::from_bits(cli.bits)?;

    let base = cli.scene.parent().unwrap_or(Path::new("."));
    let mut assets = AssetTable::new();
    for (id, path) in &scene.assets {
        let path = base.join(path);
        assets
            .load_wav(id.as_str(), &path)
            .with_context(|| format!("loading asset '{id}' from {}", path.display()))?;
    }

    let duration = cli
        .duration
        .or(scene.duration)
        .unwrap_or(DEFAULT_DURATION_SECS);
    if duration <= 0.0 {
        bail!("duration must be positive, got {duration}");
    }

    let mut renderer = OfflineRenderer::from_commands(&scene.config, assets, scene.commands)?;
    let output = renderer.render(duration)?;

    for (strip, chain) in renderer.wired_chains() {
        println!("{strip}: {}", chain.join(" -> "));
    }
    println!("Peak: {:.2} dBFS", level_db(output.peak()));

    let engine = renderer.engine();
    for (strip, _) in engine.wired_chains() {
        let Some(track) = engine.track(&strip) else {
            continue;
        };
        let meters = track
            .rack()
            .iter()
            .filter(|m| m.module_type == ModuleType::LoudnessMeter && !m.bypassed);
        for module in meters {
            if let Some(meter) = engine.meters().module(&strip, &module.id) {
                println!(
                    "Loudness [{}]: momentary {:.1} LUFS, short-term {:.1} LUFS",
                    module.id,
                    meter.momentary.load(),
                    meter.short_term.load()
                );
            }
        }
    }

    if let Some(path) = &cli.output {
        write_wav(path, &output, format)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Wrote {}", path.display());
    }

    Ok(())
}
