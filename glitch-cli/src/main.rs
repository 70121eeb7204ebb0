use std::io::Write;
use std::path::PathBuf;

use glitch::Melody;
use player::Renderer;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

mod edit;

/// Bytebeat melody synthesizer
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate a melody forever, writing one raw sample byte per tick
    /// to stdout (8000 Hz, mono, unsigned 8-bit)
    Render {
        /// Melody program, e.g. "drone!a1k3el"
        formula: Option<String>,
    },

    /// Edit a melody file on a live grid, with playback
    Edit {
        /// File containing a serialized melody
        file: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let env = env_logger::Env::default()
        .filter_or("GLITCH_LOG", "info")
        .write_style_or("GLITCH_LOG", "always");
    env_logger::init_from_env(env);

    let args = Args::parse();
    match args.command {
        Command::Render { formula } => {
            let formula = formula.context("missing FORMULA argument")?;
            render(&formula)
        }
        Command::Edit { file } => {
            let file = file.context("missing melody filename")?;
            edit::run(&file)
        }
    }
}

fn render(formula: &str) -> Result<()> {
    let melody = Melody::new(formula)?;
    info!("rendering {melody}");

    let mut renderer = Renderer::new(melody);
    let mut out = std::io::stdout().lock();
    loop {
        let frame = renderer.next_frame();
        out.write_all(&frame.samples)
            .context("failed to write samples")?;
    }
}
