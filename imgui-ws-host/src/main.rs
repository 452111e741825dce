//! imgui-ws host: streams a demo GUI to browsers.
//!
//! ```text
//! imgui-ws-host                       Serve with ./imgui-ws-host.toml or defaults
//! imgui-ws-host --config <path>       Load a custom config TOML
//! imgui-ws-host --port <port>         Override server.port_listen
//! imgui-ws-host --record <dir>        Record frames, saved to <dir> on exit
//! imgui-ws-host --replay <file>       Loop a recording under the live GUI
//! imgui-ws-host --gen-config          Print the default config to stdout
//! imgui-ws-host --write-config <path> Write the default config to a file
//! ```

mod config;
mod demo;

use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use imgui_ws::{ImGuiWsBuilder, Replay, TextureType};
use tokio::time::MissedTickBehavior;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::HostConfig;
use crate::demo::{Demo, WHITE_TEXTURE};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "imgui-ws-host", about = "Stream an immediate-mode GUI to web browsers")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "imgui-ws-host.toml")]
    config: PathBuf,

    /// Listen port, overriding the config file.
    #[arg(short, long)]
    port: Option<u16>,

    /// Record published frames; the session is saved in this directory on exit.
    #[arg(long)]
    record: Option<PathBuf>,

    /// Replay a recorded `.imgrcd` session underneath the demo.
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Write the default configuration to this path and exit.
    #[arg(long)]
    write_config: Option<PathBuf>,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&HostConfig::default())?;
        println!("{text}");
        return Ok(());
    }
    if let Some(path) = &cli.write_config {
        HostConfig::write_default(path)?;
        println!("Default config written to {}", path.display());
        return Ok(());
    }

    let mut config = HostConfig::load(&cli.config);
    if let Some(port) = cli.port {
        config.server.port_listen = port;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("imgui-ws-host v{}", env!("CARGO_PKG_VERSION"));
    info!("serving {} from {}", config.server.http_root, config.server.path_on_disk);
    info!("target FPS: {}", config.frame.fps);

    let mut gui = ImGuiWsBuilder::new(config.server.clone()).start()?;
    gui.set_texture(WHITE_TEXTURE, TextureType::Rgba32, 1, 1, &[255; 4])?;
    if let Some(path) = &cli.replay {
        gui.set_replay(Some(Replay::load(path)?));
    }
    if cli.record.is_some() {
        gui.start_recording();
    }

    let mut demo = Demo::default();
    let mut frames = tokio::time::interval(config.frame_interval());
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last = Instant::now();
    let mut connected = 0;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                break;
            }
            _ = frames.tick() => {
                let now = Instant::now();
                gui.run_frame(&mut demo, now - last);
                last = now;

                let n = gui.num_connected();
                if n != connected {
                    info!("{n} client(s) connected, control: {:?}", gui.control());
                    connected = n;
                }
            }
        }
    }

    if let (Some(dir), Some(session)) = (&cli.record, gui.stop_recording()) {
        session.save_in_dir(dir)?;
    }
    gui.stop()?;
    Ok(())
}
