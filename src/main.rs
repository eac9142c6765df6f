use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod controller;
mod domain;
mod inputter;
mod model;
mod ui;

use controller::Controller;
use domain::{ViewerConfig, ViewerError};
use model::{Model, Status};

/// Browse csv, parquet and arrow files in the terminal.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// File to open
    path: String,

    /// Show the data page by page instead of as one scrollable table
    #[arg(long)]
    pagination: bool,

    #[arg(long, default_value_t = 100)]
    page_size: usize,

    /// Rows fetched beyond the visible ones, in each direction
    #[arg(long, default_value_t = 10)]
    row_buffer: usize,

    /// Rows per fetched block
    #[arg(long, default_value_t = 100)]
    block_size: usize,

    /// Blocks kept in the row cache
    #[arg(long, default_value_t = 10)]
    max_blocks: usize,

    /// Grid state to restore, written with `w`
    #[arg(long)]
    state: Option<String>,

    #[arg(long, default_value = "tvgrid.log")]
    log_file: String,

    /// Artificial delay of every data request, in milliseconds
    #[arg(long, default_value_t = 0)]
    latency: u64,
}

fn expand(path: &str) -> Result<PathBuf, ViewerError> {
    let expanded = shellexpand::full(path)
        .map_err(|e| ViewerError::Io(std::io::Error::other(e.to_string())))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

fn init_logging(path: &Path) -> Result<(), ViewerError> {
    let file = File::create(path)?;
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        .with(tracing_error::ErrorLayer::default())
        .init();
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Err(e) => {
            ratatui::restore();
            error!("Exiting with error: {e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => {
            ratatui::restore();
            ExitCode::SUCCESS
        }
    }
}

fn run(args: Args) -> Result<(), ViewerError> {
    init_logging(&expand(&args.log_file)?)?;

    let config = ViewerConfig {
        path: expand(&args.path)?,
        state: args.state.as_deref().map(expand).transpose()?,
        pagination: args.pagination,
        page_size: args.page_size,
        row_buffer: args.row_buffer,
        block_size: args.block_size,
        max_blocks: args.max_blocks,
        latency_ms: args.latency,
        event_poll_time: 50,
    };
    info!("Starting with {:?}", config);

    let dataset = tvgrid::load_records(config.path.clone())?;
    let mut model = Model::init(&config, dataset)?;
    let controller = Controller::new(config.event_poll_time);

    let mut terminal = ratatui::init();
    let size = terminal.size()?;
    model.update(Some(domain::Message::Resize(size.width, size.height)))?;

    while model.status != Status::Quitting {
        model.tick();
        let uidata = model.get_uidata();
        terminal.draw(|f| ui::draw(&uidata, f))?;

        let message = controller.handle_event(model.raw_keyevents())?;
        model.update(message)?;
    }
    info!("Bye");
    Ok(())
}
