//! Retention CLI - cohort retention analysis of transaction CSV files
//!
//! # Main Commands
//!
//! ```bash
//! retention serve                       # Start HTTP server (port 3000)
//! retention analyze input.csv           # Cohort and retention tables
//! retention analyze input.csv --format json --policy fill
//! ```
//!
//! # Debug Commands (for development)
//!
//! ```bash
//! retention parse input.csv             # Just parse CSV to JSON
//! retention profile input.csv           # Column types and missing values
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use retention::{
    analyze_file, parse_bytes, profile, AnalysisOptions, AnalysisResponse, MissingValuePolicy,
};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "retention")]
#[command(about = "Cohort retention analysis for retail transaction CSV files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Handling of rows with missing values
#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    /// Drop rows without a customer id or invoice date
    Drop,
    /// Fill missing customer ids with -1 and text with "No Description"
    Fill,
    /// Keep every row as is
    #[value(name = "none")]
    Keep,
}

impl From<PolicyArg> for MissingValuePolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Drop => MissingValuePolicy::DropIncomplete,
            PolicyArg::Fill => MissingValuePolicy::FillDefaults,
            PolicyArg::Keep => MissingValuePolicy::PassThrough,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a CSV file and output JSON
    Parse {
        /// Input CSV file
        input: PathBuf,

        /// CSV delimiter (auto-detect if not specified)
        #[arg(short, long)]
        delimiter: Option<char>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show shape, column types and missing values of a CSV file
    Profile {
        /// Input CSV file
        input: PathBuf,

        /// CSV delimiter (auto-detect if not specified)
        #[arg(short, long)]
        delimiter: Option<char>,

        /// Explicit chrono format for date columns
        #[arg(long)]
        date_format: Option<String>,
    },

    /// Full pipeline: CSV → cohorts → retention
    Analyze {
        /// Input CSV file
        input: PathBuf,

        /// Missing value handling
        #[arg(short, long, value_enum, default_value = "drop")]
        policy: PolicyArg,

        /// Customer id column (auto-detect if not specified)
        #[arg(long)]
        customer_column: Option<String>,

        /// Invoice date column (auto-detect if not specified)
        #[arg(long)]
        date_column: Option<String>,

        /// Explicit chrono format for the invoice date
        #[arg(long)]
        date_format: Option<String>,

        /// CSV delimiter (auto-detect if not specified)
        #[arg(short, long)]
        delimiter: Option<char>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, env = "RETENTION_PORT", default_value = "3000")]
        port: u16,

        /// Largest accepted upload, in megabytes
        #[arg(long, env = "RETENTION_MAX_UPLOAD_MB", default_value = "200")]
        max_upload_mb: usize,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Parse {
            input,
            delimiter,
            output,
        } => cmd_parse(&input, delimiter, output.as_deref()),

        Commands::Profile {
            input,
            delimiter,
            date_format,
        } => cmd_profile(&input, delimiter, date_format.as_deref()),

        Commands::Analyze {
            input,
            policy,
            customer_column,
            date_column,
            date_format,
            delimiter,
            format,
            output,
        } => {
            let options = AnalysisOptions {
                policy: policy.into(),
                customer_column,
                date_column,
                date_format,
                delimiter,
            };
            cmd_analyze(&input, &options, format, output.as_deref())
        }

        Commands::Serve {
            port,
            max_upload_mb,
        } => cmd_serve(port, max_upload_mb).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_parse(
    input: &Path,
    delimiter: Option<char>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Parsing CSV: {}", input.display());

    let result = parse_bytes(&fs::read(input)?, delimiter)?;

    eprintln!("   Encoding: {}", result.encoding);
    eprintln!(
        "   Delimiter: '{}'{}",
        format_delimiter(result.delimiter),
        if delimiter.is_none() { " (auto-detected)" } else { "" }
    );
    eprintln!("   Columns: {}", result.headers.join(", "));
    eprintln!("✅ Parsed {} records", result.records.len());

    let json = serde_json::to_string_pretty(&result.records)?;
    write_output(&json, output)?;

    Ok(())
}

fn cmd_profile(
    input: &Path,
    delimiter: Option<char>,
    date_format: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let parsed = parse_bytes(&fs::read(input)?, delimiter)?;
    let profile = profile(&parsed, date_format);

    println!("📋 {}", input.display());
    println!(
        "   {} rows, {} columns, {} missing cells\n",
        profile.row_count,
        profile.column_count,
        profile.total_missing()
    );
    println!("   {:<24} {:<10} {:>8}", "column", "type", "missing");
    for col in &profile.columns {
        println!(
            "   {:<24} {:<10} {:>8}",
            col.name,
            format!("{:?}", col.column_type).to_lowercase(),
            col.missing
        );
    }

    Ok(())
}

fn cmd_analyze(
    input: &Path,
    options: &AnalysisOptions,
    format: OutputFormat,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Processing: {}", input.display());

    let result = analyze_file(input, options)?;
    let response = AnalysisResponse::from(result);

    let content = match format {
        OutputFormat::Json => serde_json::to_string_pretty(&response)?,
        OutputFormat::Table => format!(
            "Customers per cohort\n\n{}\nRetention\n\n{}",
            response.cohorts, response.retention
        ),
    };
    write_output(&content, output)?;

    eprintln!("\n✨ Done!");
    Ok(())
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

async fn cmd_serve(port: u16, max_upload_mb: usize) -> Result<(), Box<dyn std::error::Error>> {
    let limit = max_upload_mb.saturating_mul(1024 * 1024);
    retention::server::start_server(port, limit).await
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
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
