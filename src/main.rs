use std::path::PathBuf;

use bonus_report::pipeline;
use bonus_report::settings::Settings;
use bonus_report::{ReportError, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    if let Err(error) = init_logging(&cli.log_level) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
    if let Err(error) = run(cli) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Build(args) => execute_build(args),
        Command::InitConfig { output } => Settings::default().write_to(&output),
    }
}

fn execute_build(args: BuildArgs) -> Result<()> {
    let settings = args.resolve_settings()?;
    let summary = pipeline::run(&settings)?;
    if let Some(path) = &args.summary_json {
        pipeline::write_summary_json(path, &summary.report)?;
    }
    if args.open {
        pipeline::open_in_default_app(&summary.output);
    }
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|error| ReportError::Logging(error.to_string()))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|error| ReportError::Logging(error.to_string()))
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Monthly summary of loyalty-bonus turnover from spreadsheet exports."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log filter directive, e.g. `info` or `bonus_report=debug`. `RUST_LOG` wins when set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Command {
    /// Aggregate the source exports and write the report workbook.
    Build(BuildArgs),
    /// Write the default settings as JSON.
    InitConfig {
        /// Destination of the settings file.
        #[arg(long, default_value = "bonus-report.json")]
        output: PathBuf,
    },
}

#[derive(clap::Args)]
struct BuildArgs {
    /// JSON settings file. Defaults apply for anything it leaves out.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the source file pattern.
    #[arg(long)]
    pattern: Option<String>,

    /// Override the destination workbook.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Override the sheet read from each source file.
    #[arg(long)]
    sheet: Option<String>,

    /// Disable all exclusion rules.
    #[arg(long)]
    no_filter: bool,

    /// Exclude a fuel-mark code (repeatable).
    #[arg(long = "exclude-fuel-mark", value_name = "CODE")]
    exclude_fuel_marks: Vec<i64>,

    /// Exclude a station number (repeatable).
    #[arg(long = "exclude-azs", value_name = "NUMBER")]
    exclude_azs: Vec<i64>,

    /// Locale for month names, e.g. `ru_RU.UTF-8` or `en_US`.
    #[arg(long)]
    locale: Option<String>,

    /// Also write the report rows and statistics as JSON.
    #[arg(long, value_name = "PATH")]
    summary_json: Option<PathBuf>,

    /// Open the written report with the default application.
    #[arg(long)]
    open: bool,
}

impl BuildArgs {
    fn resolve_settings(&self) -> Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::from_path(path)?,
            None => Settings::default(),
        };

        if let Some(pattern) = &self.pattern {
            settings.source_pattern = pattern.clone();
        }
        if let Some(output) = &self.output {
            settings.destination = output.clone();
        }
        if let Some(sheet) = &self.sheet {
            settings.source_sheet = sheet.clone();
        }
        if let Some(locale) = &self.locale {
            settings.locale = locale.clone();
        }
        if self.no_filter {
            settings.filters.enabled = false;
        }
        settings
            .filters
            .exclude_fuel_marks
            .extend(self.exclude_fuel_marks.iter().copied());
        settings.filters.exclude_azs.extend(self.exclude_azs.iter().copied());

        settings.validate()?;
        Ok(settings)
    }
}
