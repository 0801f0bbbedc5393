use std::fs::File;
use std::process::ExitCode;
use std::sync::Mutex;
use std::time::Duration;

use clap::Parser;
use ratatui::DefaultTerminal;
use tracing::info;
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod cache;
mod controller;
mod domain;
mod filter;
mod model;
mod pagination;
mod source;
mod table;
mod ui;
mod view;

use controller::Controller;
use domain::{DashConfig, DashError};
use model::{Model, Status};
use source::{
    DEFAULT_SHEETS_URL, DEFAULT_WORKSHEET, FileSource, SHEETS_TOKEN_ENV, SheetSource, TableSource,
};
use ui::DashUI;

/// Terminal dashboard for a car listing worksheet.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Local CSV, Parquet or Arrow file to load instead of a spreadsheet
    #[arg(conflicts_with = "sheet_id", required_unless_present = "sheet_id")]
    path: Option<String>,

    /// Id of a published spreadsheet
    #[arg(long)]
    sheet_id: Option<String>,

    /// Worksheet (tab) to read
    #[arg(long, default_value = DEFAULT_WORKSHEET)]
    worksheet: String,

    /// Base url of the spreadsheet service
    #[arg(long, default_value = DEFAULT_SHEETS_URL)]
    sheets_url: String,

    /// Bearer token sent with spreadsheet requests
    #[arg(long, env = SHEETS_TOKEN_ENV, hide_env_values = true)]
    token: Option<String>,

    /// Rows per page (1-15)
    #[arg(long, default_value_t = 10)]
    page_size: usize,

    /// Seconds a loaded table is reused before it is fetched again
    #[arg(long, default_value_t = 600)]
    cache_ttl: u64,

    /// Maximum height of the table in lines
    #[arg(long, default_value_t = 20)]
    max_height: usize,

    /// Keep the table height constant across pages
    #[arg(long)]
    fixed_layout: bool,

    /// Show the price charts on start
    #[arg(long)]
    charts: bool,

    /// Number of bins of the price histogram
    #[arg(long, default_value_t = 10)]
    bins: usize,

    /// Where to write the log
    #[arg(long, default_value = "carview.log")]
    log_file: String,
}

impl Args {
    fn config(&self) -> DashConfig {
        DashConfig::default()
            .with_page_size(DashConfig::clamp_page_size(self.page_size))
            .with_cache_ttl(Duration::from_secs(self.cache_ttl))
            .with_max_height(self.max_height)
            .with_fixed_layout(self.fixed_layout)
            .with_show_charts(self.charts)
            .with_histogram_bins(self.bins.max(1))
    }

    fn source(&self) -> Result<Box<dyn TableSource>, DashError> {
        match (&self.path, &self.sheet_id) {
            (Some(path), _) => Ok(Box::new(FileSource::new(path)?)),
            (None, Some(id)) => Ok(Box::new(SheetSource::new(
                &self.sheets_url,
                id,
                &self.worksheet,
                self.token.clone(),
            )?)),
            (None, None) => Err(DashError::LoadingFailed(
                "give a file path or --sheet-id".into(),
            )),
        }
    }
}

fn init_logging(path: &str) -> Result<(), DashError> {
    let file = File::create(shellexpand::tilde(path).into_owned())?;
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        .with(ErrorLayer::default())
        .try_init()
        .map_err(|e| DashError::Logging(e.to_string()))
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args) {
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

fn run(args: &Args) -> Result<(), DashError> {
    init_logging(&args.log_file)?;
    let cfg = args.config();
    info!("Starting carview with {cfg:?}");

    let mut model = Model::init(&cfg, args.source()?);
    let ui = DashUI::new(&cfg);
    let controller = Controller::new(&cfg);

    let mut terminal = ratatui::init();
    let result = event_loop(&mut terminal, &mut model, &ui, &controller);
    ratatui::restore();

    info!("Bye!");
    result
}

fn event_loop(
    terminal: &mut DefaultTerminal,
    model: &mut Model,
    ui: &DashUI,
    controller: &Controller,
) -> Result<(), DashError> {
    while model.status != Status::QUITTING {
        // Render the current view
        terminal.draw(|f| ui.draw(model, f))?;

        // Handle events and map to a Message
        if let Some(message) = controller.handle_event()? {
            model.update(Some(message));
        };
    }
    Ok(())
}
