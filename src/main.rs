//! Binary entrypoint for the StashFlow CLI.
//!
//! Commands:
//! - `filters` - list the loaded filter registry in display order
//! - `presets` - list presets with their live warnings
//! - `settings` - dump the effective settings as JSON
//! - `predict <network>` - dry-run a network against the world fixture
//! - `distribute <network>` - gather and route, then optionally write the co-save
//! - `explain <network> <item>` - show which stage family would take an item
//! - `picker <master>` - print the container picker for a master container
//! - `save-inspect <path>` - list the records of a co-save blob
//!
//! World-facing commands read a TOML world given by `--world`; state comes from `--save`
//! when given, otherwise from the config seeds of a new game.
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use stashflow::app::App;
use stashflow::config::ini::{ConfigDir, DEFAULT_PREFIX};
use stashflow::config::{parse_hex, Settings};
use stashflow::host::{MemoryHost, WorldFixture};
use stashflow::network::persist::inspect;

#[derive(Parser)]
#[command(name = "stashflow")]
#[command(about = "Data-driven item distribution for RPG storage networks")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration directory holding the INI files
    #[arg(short, long, default_value = ".", global = true)]
    config: PathBuf,

    /// INI file name prefix
    #[arg(long, default_value = DEFAULT_PREFIX, global = true)]
    prefix: String,

    /// World fixture (TOML)
    #[arg(short, long, global = true)]
    world: Option<PathBuf>,

    /// Co-save blob to restore before running the command
    #[arg(short, long, global = true)]
    save: Option<PathBuf>,

    /// Append log lines to this file as well
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// List filters in display order
    Filters,
    /// List presets and their warnings
    Presets,
    /// Print the effective settings as JSON
    Settings,
    /// Predict where a network would send its items
    Predict { network: String },
    /// Distribute a network's items
    Distribute {
        network: String,
        /// Write the resulting co-save here
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Explain where an item (hex form id) would be routed
    Explain { network: String, item: String },
    /// Show the container picker for a master container (hex form id)
    Picker { master: String },
    /// List the records of a co-save blob
    SaveInspect { path: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_dir = ConfigDir::new(&cli.config).with_prefix(&cli.prefix);
    let settings = Settings::from_document(&config_dir.merged());
    init_logging(&settings, cli.verbose, cli.log_file.as_ref());

    if let Commands::SaveInspect { path } = &cli.command {
        let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        for record in inspect(&data)? {
            println!("{} v{} ({} bytes)", record.tag, record.version, record.length);
        }
        return Ok(());
    }
    if let Commands::Settings = cli.command {
        println!("{}", serde_json::to_string_pretty(&settings)?);
        return Ok(());
    }

    let host = match &cli.world {
        Some(path) => MemoryHost::from_fixture(
            WorldFixture::load(path).with_context(|| format!("loading {}", path.display()))?,
        ),
        None => MemoryHost::new(),
    };
    let host = Arc::new(host);
    let app = App::load(&config_dir, host.clone());

    match &cli.save {
        Some(path) => {
            let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            let (loaded, validated) = app.load_game(&data)?;
            if !loaded.skipped.is_empty() {
                warn!("skipped records: {}", loaded.skipped.join(", "));
            }
            if !validated.is_clean() {
                info!("validation: {:?}", validated);
            }
        }
        None => {
            let seeded = app.new_game();
            info!("new game: {} config seeds applied", seeded);
        }
    }

    match cli.command {
        Commands::Filters => {
            for filter in app.filters.filters() {
                let indent = if filter.is_root() { "" } else { "  " };
                println!("{}{} - {}", indent, filter.id, filter.display_name);
            }
        }
        Commands::Presets => {
            for preset in app.manager.presets() {
                println!("{} (master {})", preset.name, preset.master);
                let warnings = preset.warnings(app.host());
                for line in warnings.lines() {
                    println!("  ! {}", line);
                }
            }
        }
        Commands::Predict { network } => {
            let prediction = app.distributor().predict(&network)?;
            println!("{}", serde_json::to_string_pretty(&prediction)?);
        }
        Commands::Distribute { network, out } => {
            let report = app.distributor().distribute(&network)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if let Some(out) = out {
                std::fs::write(&out, app.save_game())
                    .with_context(|| format!("writing {}", out.display()))?;
                info!("co-save written to {}", out.display());
            }
        }
        Commands::Explain { network, item } => {
            let item = parse_hex(&item).ok_or_else(|| anyhow!("bad form id '{}'", item))?;
            match app.distributor().explain(&network, item)? {
                Some((filter, target)) => {
                    let display = app.resolve_container(target);
                    println!("{} -> {} ({:#010X})", filter, display.name, target);
                }
                None => println!("stays in the catch-all"),
            }
        }
        Commands::Picker { master } => {
            let master = parse_hex(&master).ok_or_else(|| anyhow!("bad form id '{}'", master))?;
            for entry in app.picker_list(master) {
                if entry.enabled {
                    println!("  {} [{}] {:#010X}", entry.name, entry.location, entry.container);
                } else {
                    println!("{}", entry.name);
                }
            }
        }
        Commands::Settings | Commands::SaveInspect { .. } => {}
    }
    Ok(())
}

fn init_logging(settings: &Settings, verbosity: u8, log_file: Option<&PathBuf>) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let level = match verbosity {
        0 => settings.log_level(),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(level);

    let file = log_file.and_then(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    });
    match file {
        Some(f) => {
            let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
            // Mirror to the console only when attached to a terminal
            let is_tty = atty::is(atty::Stream::Stderr);
            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());
                if let Ok(mut guard) = write_mutex.lock() {
                    let _ = writeln!(guard, "{}", line);
                }
                if is_tty {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            });
        }
        None => {
            builder.format(|fmt, record| {
                writeln!(
                    fmt,
                    "{} [{}] {}",
                    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                    record.level(),
                    record.args()
                )
            });
        }
    }
    let _ = builder.try_init();
}
