//! ODVT CLI - Normalize the ODVT workbook and compute dashboard views
//!
//! # Main Commands
//!
//! ```bash
//! odvt serve                          # Start HTTP server (port 3000)
//! odvt views ODVT.xlsx                # All dashboard views as JSON
//! odvt join ODVT.xlsx request.csv     # Join an uploaded cost file
//! odvt export ODVT.xlsx report.xlsx   # Views as an Excel report
//! ```
//!
//! # Debug Commands
//!
//! ```bash
//! odvt normalize ODVT.xlsx            # Canonical tables and warnings
//! odvt schemas                        # Built-in schema catalogs
//! ```
//!
//! The workbook argument defaults to `ODVT_WORKBOOK` (or `ODVT.xlsx`).

use clap::{Args, Parser, Subcommand};
use odvt::{
    join_upload, load_dataset, start_server, DashboardFilters, DashboardOptions, DashboardViews,
    DateRange, Report,
};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "odvt")]
#[command(about = "Normalize ODVT logistics data and compute dashboard views", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load both sheets and print the canonical tables with warnings
    Normalize {
        /// Source workbook
        workbook: Option<PathBuf>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compute every dashboard view
    Views {
        /// Source workbook
        workbook: Option<PathBuf>,

        #[command(flatten)]
        filters: FilterArgs,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Left-join an uploaded cost file (xlsx or csv) onto the cost model
    Join {
        /// Source workbook
        workbook: PathBuf,

        /// Uploaded cost request
        upload: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write every view to an xlsx report
    Export {
        /// Source workbook
        workbook: PathBuf,

        /// Report path
        output: PathBuf,

        /// Also include the join of this cost request
        #[arg(long)]
        upload: Option<PathBuf>,

        #[command(flatten)]
        filters: FilterArgs,
    },

    /// Print the built-in schema catalogs
    Schemas,

    /// Start HTTP server
    Serve {
        /// Source workbook
        #[arg(short, long)]
        workbook: Option<PathBuf>,

        /// Port to listen on (default: ODVT_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[derive(Args)]
struct FilterArgs {
    /// Date bucket: "1 Year", "6 Months", "3 Months", "1 Month", "Month to Date"
    #[arg(long)]
    date_range: Option<DateRange>,

    /// Origin state to keep (repeatable)
    #[arg(long = "origin-state")]
    origin_states: Vec<String>,

    /// Destination state to keep (repeatable)
    #[arg(long = "destination-state")]
    destination_states: Vec<String>,

    /// Transporter to keep (repeatable)
    #[arg(long = "transporter")]
    transporters: Vec<String>,

    /// Lowest rating in the transporter summary
    #[arg(long, default_value = "2")]
    rating_low: u8,

    /// Highest rating in the transporter summary
    #[arg(long, default_value = "5")]
    rating_high: u8,
}

impl From<FilterArgs> for DashboardFilters {
    fn from(args: FilterArgs) -> Self {
        DashboardFilters {
            date_range: args.date_range,
            origin_states: args.origin_states,
            destination_states: args.destination_states,
            transporters: args.transporters,
            rating_low: args.rating_low,
            rating_high: args.rating_high,
        }
    }
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match DashboardOptions::from_env() {
        Err(e) => Err(e.into()),
        Ok(options) => match cli.command {
            Commands::Normalize { workbook, output } => {
                cmd_normalize(&workbook.unwrap_or(options.workbook), output.as_deref())
            }

            Commands::Views {
                workbook,
                filters,
                output,
            } => {
                let workbook = workbook.unwrap_or_else(|| options.workbook.clone());
                cmd_views(&workbook, filters.into(), &options, output.as_deref())
            }

            Commands::Join {
                workbook,
                upload,
                output,
            } => cmd_join(&workbook, &upload, output.as_deref()),

            Commands::Export {
                workbook,
                output,
                upload,
                filters,
            } => cmd_export(&workbook, &output, upload.as_deref(), filters.into(), &options),

            Commands::Schemas => cmd_schemas(),

            Commands::Serve { workbook, port } => {
                let options = DashboardOptions {
                    workbook: workbook.unwrap_or(options.workbook),
                    port: port.unwrap_or(options.port),
                    ..options
                };
                cmd_serve(options).await
            }
        },
    };

    if let Err(e) = result {
        eprintln!("✗ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_normalize(workbook: &Path, output: Option<&Path>) -> CliResult {
    let dataset = load_dataset(workbook)?;

    let json = serde_json::to_string_pretty(&json!({
        "summary": dataset.summary(),
        "trips": {
            "version": dataset.trips.version,
            "warnings": dataset.trips.warnings,
            "records": dataset.trips.table.to_records(),
        },
        "costModel": {
            "version": dataset.cost_model.version,
            "warnings": dataset.cost_model.warnings,
            "records": dataset.cost_model.table.to_records(),
        },
    }))?;
    write_output(&json, output)
}

fn cmd_views(
    workbook: &Path,
    filters: DashboardFilters,
    options: &DashboardOptions,
    output: Option<&Path>,
) -> CliResult {
    let dataset = load_dataset(workbook)?;
    let views = DashboardViews::compute(&dataset, &filters, options)?;

    for (name, status) in views.statuses() {
        eprintln!("   {:<24} {}", name, status);
    }

    let json = serde_json::to_string_pretty(&views)?;
    write_output(&json, output)
}

fn cmd_join(workbook: &Path, upload: &Path, output: Option<&Path>) -> CliResult {
    let dataset = load_dataset(workbook)?;
    let bytes = fs::read(upload)?;
    let joined = join_upload(&bytes, &file_name(upload), &dataset)?;

    let json = serde_json::to_string_pretty(&json!({
        "fileName": joined.file_name,
        "rows": joined.rows,
        "matched": joined.matched,
        "records": joined.table.to_records(),
    }))?;
    write_output(&json, output)
}

fn cmd_export(
    workbook: &Path,
    output: &Path,
    upload: Option<&Path>,
    filters: DashboardFilters,
    options: &DashboardOptions,
) -> CliResult {
    let dataset = load_dataset(workbook)?;
    let views = DashboardViews::compute(&dataset, &filters, options)?;
    let joined = match upload {
        Some(path) => Some(join_upload(&fs::read(path)?, &file_name(path), &dataset)?),
        None => None,
    };

    let summary = dataset.summary();
    Report {
        summary: &summary,
        views: &views,
        joined: joined.as_ref(),
    }
    .save(output)?;
    Ok(())
}

fn cmd_schemas() -> CliResult {
    let catalogs = [odvt::schema::trip_catalog(), odvt::schema::cost_model_catalog()];
    println!("{}", serde_json::to_string_pretty(&catalogs)?);
    Ok(())
}

async fn cmd_serve(options: DashboardOptions) -> CliResult {
    let dataset = load_dataset(&options.workbook)?;
    start_server(dataset, options).await?;
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("upload")
        .to_string()
}

fn write_output(content: &str, path: Option<&Path>) -> CliResult {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
