//! BinFeed CLI — dump tabular market data into the binary store.
//!
//! Commands:
//! - `dump-all` — full dump: rebuild calendar, instruments, and features
//! - `dump-fix` — backfill symbols missing from the instrument registry
//! - `dump-update` — extend the calendar and append new trailing rows
//! - `inspect` — decode one symbol's field series against the calendar

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use binfeed_core::{
    encoder, Calendar, DumpAll, DumpConfig, DumpFix, DumpReport, DumpUpdate, FieldFilter, Freq,
    StdoutProgress,
};

#[derive(Parser)]
#[command(name = "binfeed", about = "BinFeed — binary columnar store dumper")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Full dump: rebuild the entire store from source data.
    DumpAll {
        #[command(flatten)]
        args: DumpArgs,
    },
    /// Backfill symbols absent from the instrument registry.
    DumpFix {
        #[command(flatten)]
        args: DumpArgs,
    },
    /// Extend the calendar and append new rows to known symbols.
    DumpUpdate {
        #[command(flatten)]
        args: DumpArgs,
    },
    /// Print one symbol's decoded field series against the calendar.
    Inspect {
        /// Root of the binary store.
        #[arg(long)]
        store: PathBuf,

        /// Symbol code (e.g. SH600000).
        #[arg(long)]
        symbol: String,

        /// Field name (e.g. close).
        #[arg(long, default_value = "close")]
        field: String,

        /// Calendar frequency: day or 1min.
        #[arg(long, default_value = "day")]
        freq: String,
    },
}

#[derive(Args)]
struct DumpArgs {
    /// Source directory of per-symbol files, or a single flat table file.
    #[arg(long)]
    source: Option<PathBuf>,

    /// Root of the binary store (calendars/, features/, instruments/).
    #[arg(long)]
    output: Option<PathBuf>,

    /// TOML config file. Either --config or --source/--output is required.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Copy the output root here before mutating it.
    #[arg(long)]
    backup_dir: Option<PathBuf>,

    /// Calendar frequency: day or 1min.
    #[arg(long, default_value = "day")]
    freq: String,

    /// Worker pool size for per-symbol phases.
    #[arg(long, default_value_t = 16)]
    workers: usize,

    /// Name of the date column in source tables.
    #[arg(long, default_value = "date")]
    date_field: String,

    /// Name of the symbol column (flat-table sources).
    #[arg(long, default_value = "symbol")]
    symbol_field: String,

    /// Suffix matched when scanning a source directory.
    #[arg(long, default_value = ".csv")]
    file_suffix: String,

    /// Comma-separated fields to dump (wins over --exclude-fields).
    #[arg(long, default_value = "")]
    include_fields: String,

    /// Comma-separated fields to skip.
    #[arg(long, default_value = "")]
    exclude_fields: String,

    /// Process at most this many symbols (testing aid).
    #[arg(long)]
    limit: Option<usize>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::DumpAll { args } => {
            let config = build_config(args)?;
            let report = DumpAll::new(&config, &StdoutProgress).dump()?;
            print_report(&report)
        }
        Commands::DumpFix { args } => {
            let config = build_config(args)?;
            let report = DumpFix::new(&config, &StdoutProgress).dump()?;
            print_report(&report)
        }
        Commands::DumpUpdate { args } => {
            let config = build_config(args)?;
            let report = DumpUpdate::new(&config, &StdoutProgress).dump()?;
            print_report(&report)
        }
        Commands::Inspect {
            store,
            symbol,
            field,
            freq,
        } => run_inspect(&store, &symbol, &field, &freq),
    }
}

/// Build the run configuration from a TOML file or from flags.
///
/// A config file carries the complete configuration (only `--limit` and
/// `--backup-dir` override it); without one, `--source` and `--output`
/// are required and the remaining flags fill in the rest.
fn build_config(args: DumpArgs) -> Result<DumpConfig> {
    if let Some(path) = &args.config {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let mut config: DumpConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        if args.limit.is_some() {
            config.limit_nums = args.limit;
        }
        if args.backup_dir.is_some() {
            config.backup_dir = args.backup_dir;
        }
        return Ok(config);
    }

    let (Some(source), Some(output)) = (args.source, args.output) else {
        bail!("either --config or both --source and --output are required");
    };
    let freq: Freq = args.freq.parse().map_err(anyhow::Error::msg)?;

    let mut config = DumpConfig::new(source, output);
    config.backup_dir = args.backup_dir;
    config.freq = freq;
    config.max_workers = args.workers;
    config.date_field = args.date_field;
    config.symbol_field = args.symbol_field;
    config.file_suffix = args.file_suffix;
    config.fields = FieldFilter::from_lists(&args.include_fields, &args.exclude_fields);
    config.limit_nums = args.limit;
    Ok(config)
}

fn print_report(report: &DumpReport) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(report).context("serializing dump report")?
    );
    if !report.errors.is_empty() {
        bail!("{} symbol(s) failed — see error map above", report.errors.len());
    }
    Ok(())
}

fn run_inspect(store: &PathBuf, symbol: &str, field: &str, freq: &str) -> Result<()> {
    let freq: Freq = freq.parse().map_err(anyhow::Error::msg)?;
    let config = DumpConfig {
        freq,
        ..DumpConfig::new(PathBuf::new(), store.clone())
    };

    let calendar = Calendar::load(&config.calendar_path(), freq)
        .with_context(|| format!("loading calendar from {}", store.display()))?;
    let features_dir = config.symbol_features_dir(&symbol.to_uppercase());
    let (start_index, values) = encoder::read_series(&features_dir, field, freq)
        .with_context(|| format!("reading {field} series for {symbol}"))?;

    println!(
        "{symbol} {field}: {} values from calendar index {start_index}",
        values.len()
    );
    for (offset, value) in values.iter().enumerate() {
        let date = calendar
            .get(start_index + offset)
            .map(|d| freq.format(d))
            .unwrap_or_else(|| format!("<beyond calendar: index {}>", start_index + offset));
        if value.is_nan() {
            println!("{date}\t-");
        } else {
            println!("{date}\t{value}");
        }
    }
    Ok(())
}
