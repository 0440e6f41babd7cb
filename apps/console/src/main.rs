mod commands;

use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::Parser;
use sprout_audio::{
    device_names, CaptureSource, CpalCapture, CpalSink, Direction, NullBackend, PlaybackSink,
};
use sprout_domain::BucketKind;
use sprout_trainer::{GateEvent, Listing, PlayerDisplay, Screen, SessionShell, TrainerConfig};
use tokio::runtime::Runtime;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::commands::{Command, HELP};

const GRID_COLUMNS: usize = 4;

#[derive(Parser, Debug)]
#[command(name = "sprout", about = "Record, sort and loop plant training clips")]
struct Cli {
    /// Config file to use instead of the per-user one.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Play and record silence instead of opening audio devices.
    #[arg(long)]
    null_audio: bool,
    /// Write the active config as JSON and exit.
    #[arg(long)]
    write_config: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.clone().or_else(settings_path);
    let config = load_config(config_path.as_deref())?;

    if cli.write_config {
        let path = config_path.ok_or_else(|| anyhow!("no config dir"))?;
        save_config(&path, &config)?;
        println!("wrote {}", path.display());
        return Ok(());
    }

    let rt = Arc::new(Runtime::new()?);
    let (sink, capture): (Arc<dyn PlaybackSink>, Arc<dyn CaptureSource>) = if cli.null_audio {
        let backend = Arc::new(NullBackend::default());
        (backend.clone(), backend)
    } else {
        (
            Arc::new(CpalSink::new(config.output_device.clone())),
            Arc::new(CpalCapture::new(
                config.input_device.clone(),
                config.normalize_recordings,
            )),
        )
    };

    let mut shell = SessionShell::new(config, sink, capture, rt.handle().clone())?;
    rt.spawn(print_display(shell.player().subscribe()));

    println!("sprout is locked. Type `grid` to see the cells, `help` for commands.");
    print_grid(&shell);

    let mut console = Console {
        shell: &mut shell,
        listings: HashMap::new(),
    };
    let stdin = io::stdin();
    prompt();
    for line in stdin.lock().lines() {
        let line = line?;
        match Command::parse(&line) {
            Ok(None) => {}
            Ok(Some(Command::Quit)) => break,
            Ok(Some(command)) => {
                if let Err(err) = console.run(command) {
                    println!("error: {err:#}");
                }
            }
            Err(err) => println!("error: {err:#}"),
        }
        prompt();
    }

    if let Err(err) = shell.lock() {
        warn!(?err, "failed to lock on exit");
    }
    info!("bye");
    Ok(())
}

struct Console<'a> {
    shell: &'a mut SessionShell,
    listings: HashMap<BucketKind, Listing>,
}

impl Console<'_> {
    fn run(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Grid => print_grid(self.shell),
            Command::Tap(cell) => match self.shell.tap(cell)? {
                GateEvent::Pending(entered) => {
                    println!("{entered}/{} entered", self.shell.config().secret_code.len())
                }
                GateEvent::Unlocked => {
                    println!("unlocked. Record clips, then `play`.");
                }
                GateEvent::Rejected => println!("wrong code, start again"),
            },
            Command::Record { bucket, name } => {
                self.shell.begin_recording(bucket, name)?;
                println!("recording into {bucket}. Type `stop` to finish.");
            }
            Command::Stop => {
                let len = self.shell.finish_recording()?;
                println!("saved, bucket now holds {len}");
            }
            Command::Add { bucket, path, name } => {
                let len = self.shell.add_file(bucket, &path, name.as_deref())?;
                println!("added to {bucket}, bucket now holds {len}");
            }
            Command::List => {
                for bucket in BucketKind::ALL {
                    let listing = self.shell.listing(bucket)?;
                    println!("{bucket} ({})", listing.names.len());
                    for (index, name) in listing.names.iter().enumerate() {
                        println!("  {index}: {name}");
                    }
                    self.listings.insert(bucket, listing);
                }
            }
            Command::Delete { bucket, index } => {
                let listing = self
                    .listings
                    .get(&bucket)
                    .ok_or_else(|| anyhow!("run `list` before deleting"))?;
                match self.shell.delete(listing, index)? {
                    Some(clip) => println!("deleted {:?}", clip.name()),
                    None => println!("nothing deleted; the list is out of date, run `list` again"),
                }
                self.listings.remove(&bucket);
            }
            Command::Play => {
                self.shell.open_player()?;
                println!("pick `mode good` or `mode bad`, `admin` to go back");
            }
            Command::Mode(bucket) => {
                if self.shell.screen() != Screen::Play {
                    self.shell.open_player()?;
                }
                if !self.shell.select_mode(bucket)? {
                    println!("no {bucket} clips recorded");
                }
            }
            Command::Admin => self.shell.open_admin()?,
            Command::Lock => {
                self.shell.lock()?;
                self.listings.clear();
                println!("locked");
                print_grid(self.shell);
            }
            Command::Import(path) => {
                let (good, bad) = self.shell.import_from(&path)?;
                self.listings.clear();
                println!("imported {good} good and {bad} bad clips");
            }
            Command::Export(path) => {
                let path =
                    path.unwrap_or_else(|| PathBuf::from(&self.shell.config().export_file_name));
                self.shell.export_to(&path)?;
                println!("exported to {}", path.display());
            }
            Command::Devices => {
                for (label, direction) in [("output", Direction::Output), ("input", Direction::Input)] {
                    println!("{label} devices:");
                    for name in device_names(direction) {
                        println!("  {name}");
                    }
                }
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => {}
        }
        Ok(())
    }
}

async fn print_display(mut rx: watch::Receiver<PlayerDisplay>) {
    let mut last = None;
    while rx.changed().await.is_ok() {
        let display = rx.borrow_and_update().clone();
        let mode = display
            .mode
            .map(|mode| mode.as_str().to_uppercase())
            .unwrap_or_else(|| "-".into());
        let line = format!("[MODE: {mode}] {}", display.headline);
        if display.visible && last.as_ref() != Some(&line) {
            println!("{line}");
            last = Some(line);
        } else if !display.visible {
            last = None;
        }
    }
}

fn print_grid(shell: &SessionShell) {
    if shell.screen() != Screen::Lock {
        println!("already unlocked");
        return;
    }
    for (row, cells) in shell.grid().cells().chunks(GRID_COLUMNS).enumerate() {
        let line: Vec<String> = cells
            .iter()
            .enumerate()
            .map(|(col, color)| format!("{:>2}:{:<6}", row * GRID_COLUMNS + col, color.as_str()))
            .collect();
        println!("{}", line.join(" "));
    }
}

fn prompt() {
    print!("> ");
    let _ = io::stdout().flush();
}

fn settings_path() -> Option<PathBuf> {
    let base = dirs::config_dir()?;
    Some(base.join("sprout").join("config.json"))
}

fn load_config(path: Option<&Path>) -> Result<TrainerConfig> {
    match path {
        Some(path) if path.exists() => TrainerConfig::load(path),
        Some(path) => {
            info!(path = %path.display(), "no config file, using defaults");
            Ok(TrainerConfig::default())
        }
        None => Ok(TrainerConfig::default()),
    }
}

fn save_config(path: &Path, config: &TrainerConfig) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(path, json)?;
    Ok(())
}
