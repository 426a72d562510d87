use clap::Parser;
use glyphstore::{open, ReadableFontBackend, StoreError, WritableFontBackend};
use std::process::ExitCode;

/// Inspect a designspace or UFO the way an editor sees it
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The .designspace or .ufo to open
    font: String,

    /// Glyphs to dump as JSON
    glyphs: Vec<String>,

    /// Print the glyph map instead of glyphs
    #[arg(long)]
    glyph_map: bool,

    /// Write each requested glyph straight back after reading it
    #[arg(long)]
    roundtrip: bool,

    #[command(flatten)]
    verbosity: clap_verbosity_flag::Verbosity,
}

async fn run(args: Args) -> Result<(), StoreError> {
    let mut font = open(&args.font)?;
    let glyph_map = font.get_glyph_map().await?;
    if args.glyph_map {
        println!("{}", serde_json::to_string_pretty(&glyph_map)?);
    }
    for name in &args.glyphs {
        let glyph = font.get_glyph(name).await?;
        if args.roundtrip {
            let codepoints = glyph_map.get(name).cloned().unwrap_or_default();
            font.put_glyph(name, &glyph, &codepoints).await?;
            log::info!("Wrote {} back", name);
        } else {
            println!("{}", serde_json::to_string_pretty(&glyph)?);
        }
    }
    font.close();
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    env_logger::Builder::new()
        .filter_level(args.verbosity.into())
        .init();
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("Could not start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };
    match runtime.block_on(run(args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
