//! Amstrad CPC 6128 emulator binary.
//!
//! Runs headless for a fixed number of frames, then writes whatever
//! captures were asked for.

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use emu_core::Observable;
use emu_cpc::{Cpc, CpcConfig, RamSize, TitleConfig, TitleDatabase, capture};
use format_cpr::Cartridge;
use nec_upd765::DiskImage;

/// Amstrad CPC 6128 emulator
#[derive(Parser, Debug)]
#[command(name = "emu-cpc", version, about, long_about = None)]
struct Args {
    /// OS ROM (16K)
    #[arg(long)]
    os: PathBuf,

    /// BASIC ROM (16K)
    #[arg(long)]
    basic: PathBuf,

    /// AMSDOS ROM (16K), mapped as upper ROM 7
    #[arg(long)]
    amsdos: Option<PathBuf>,

    /// RAM size in KB (128, 576, 1088, 2112 or 4160)
    #[arg(long, default_value_t = 128)]
    ram: u32,

    /// Insert a DSK or EDSK disk image
    #[arg(long, group = "media")]
    dsk: Option<PathBuf>,

    /// Load an SNA snapshot
    #[arg(long, group = "media")]
    sna: Option<PathBuf>,

    /// Plug in a CPR cartridge
    #[arg(long, group = "media")]
    cpr: Option<PathBuf>,

    /// Plug in a Dandanator flash image
    #[arg(long, group = "media")]
    dandanator: Option<PathBuf>,

    /// JSON title database for per-title settings
    #[arg(long)]
    title_db: Option<PathBuf>,

    /// Frames to run
    #[arg(long, default_value_t = 200)]
    frames: u32,

    /// Save a PNG screenshot of the last frame
    #[arg(long)]
    screenshot: Option<PathBuf>,

    /// Save a WAV dump of the whole run
    #[arg(long)]
    audio: Option<PathBuf>,

    /// Text to type (use \n for Enter)
    #[arg(long = "type")]
    type_text: Option<String>,

    /// Frame at which typing starts
    #[arg(long, default_value_t = 100)]
    type_at: u64,

    /// Restore a save state before running
    #[arg(long)]
    load_state: Option<PathBuf>,

    /// Write a save state after running
    #[arg(long)]
    save_state: Option<PathBuf>,

    /// Write an SNA snapshot after running
    #[arg(long)]
    save_sna: Option<PathBuf>,

    /// Print observable machine state as JSON after running
    #[arg(long)]
    dump_state: bool,

    /// Write disk changes back to the DSK file after running
    #[arg(long)]
    write_back: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("emu-cpc: {e}");
            ExitCode::FAILURE
        }
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, Box<dyn Error>> {
    fs::read(path).map_err(|e| format!("{}: {e}", path.display()).into())
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    let ram = RamSize::from_kb(args.ram).ok_or_else(|| format!("unsupported RAM size {}K", args.ram))?;
    let titles = match &args.title_db {
        Some(path) => TitleDatabase::load(path)?,
        None => TitleDatabase::new(),
    };

    let media = [&args.dsk, &args.sna, &args.cpr, &args.dandanator]
        .into_iter()
        .flatten()
        .next();
    let media_data = media.map(|path| read_file(path)).transpose()?;
    let title = match (&args.dsk, &media_data) {
        (Some(path), _) => {
            let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            titles.get(TitleDatabase::disk_key(&name))
        }
        (None, Some(data)) => titles.get(TitleDatabase::image_key(data)),
        (None, None) => TitleConfig::default(),
    };

    let config = CpcConfig {
        os_rom: read_file(&args.os)?,
        basic_rom: read_file(&args.basic)?,
        amsdos_rom: args.amsdos.as_deref().map(read_file).transpose()?,
        ram,
        title,
    };
    let mut cpc = Cpc::new(&config)?;

    if let Some(data) = media_data {
        if args.dsk.is_some() {
            cpc.insert_disk(DiskImage::parse(data)?);
        } else if args.sna.is_some() {
            cpc.load_sna(&data)?;
        } else if args.cpr.is_some() {
            cpc.insert_cartridge(Cartridge::parse(&data)?);
        } else {
            cpc.insert_dandanator(data)?;
        }
    }

    if let Some(path) = &args.load_state {
        cpc.load_state(&read_file(path)?)?;
    }

    if let Some(text) = &args.type_text {
        let text = text.replace("\\n", "\n");
        cpc.input_queue().enqueue_text(&text, args.type_at);
    }

    let mut audio = Vec::new();
    for _ in 0..args.frames {
        cpc.run_frame();
        let samples = cpc.take_audio_buffer();
        if args.audio.is_some() {
            audio.extend_from_slice(&samples);
        }
    }

    if let Some(path) = &args.screenshot {
        capture::save_screenshot(&cpc, path)?;
        log::info!("Screenshot saved to {}", path.display());
    }
    if let Some(path) = &args.audio {
        capture::save_audio(&audio, path)?;
        log::info!("Audio saved to {} ({} samples)", path.display(), audio.len());
    }
    if let Some(path) = &args.save_state {
        fs::write(path, cpc.save_state()?)?;
    }
    if let Some(path) = &args.save_sna {
        fs::write(path, cpc.save_sna())?;
    }
    if let (true, Some(path)) = (args.write_back, &args.dsk) {
        let regions = cpc.flush_disk(path)?;
        log::info!("{regions} disk regions written back");
    }
    if args.dump_state {
        println!("{}", serde_json::to_string_pretty(&cpc.snapshot())?);
    }
    Ok(())
}
