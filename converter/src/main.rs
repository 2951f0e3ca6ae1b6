//! csv2stmt CLI - Convert bank CSV exports to OFX/QIF statements
//!
//! # Main Commands
//!
//! ```bash
//! csv2stmt convert input.csv -o out.ofx          # CSV to OFX with the default mapping
//! csv2stmt convert input.csv -f qif -m mint      # CSV to QIF with a built-in mapping
//! csv2stmt convert input.csv -m auto -c id       # Pick a mapping by headers, collapse splits
//! csv2stmt mappings list                         # Manage stored mappings
//! ```
//!
//! # Helper Commands
//!
//! ```bash
//! csv2stmt example-mapping         # Show an annotated mapping JSON
//! csv2stmt operations              # Show available mapping operations
//! ```

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use clap::{Args, Parser, Subcommand};
use csv2stmt::dates::{parse_date, parse_datetime};
use csv2stmt::logs::{drain, LogLevel, LOG_BROADCASTER};
use csv2stmt::render::qif::DEFAULT_DATE_FORMAT;
use csv2stmt::transform::DEFAULT_CHUNK_SIZE;
use csv2stmt::{
    convert_source, example_mapping, operations_description, peek_headers, ConvertOptions, Format,
    MappingRegistry, MappingSpec, Outcome, SourceFormat,
};
use rust_decimal::Decimal;
use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

const EXIT_EMPTY: i32 = 2;

#[derive(Parser)]
#[command(name = "csv2stmt", version)]
#[command(about = "Convert bank CSV exports to OFX or QIF statements", long_about = None)]
struct Cli {
    /// Echo pipeline progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a CSV file into a statement
    Convert(ConvertArgs),

    /// Manage stored mappings
    Mappings {
        #[command(subcommand)]
        action: MappingAction,
    },

    /// Show an example mapping
    ExampleMapping,

    /// Show available mapping operations
    Operations,
}

#[derive(Args)]
struct ConvertArgs {
    /// Input CSV file ("-" reads stdin)
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Replace an existing output file
    #[arg(short = 'O', long)]
    overwrite: bool,

    /// Output format (ofx or qif)
    #[arg(short, long, default_value = "ofx")]
    format: Format,

    /// Mapping name, mapping JSON file, or "auto" to match by headers
    #[arg(short, long, default_value = "default", env = "CSV2STMT_MAPPING")]
    mapping: String,

    /// Collapse rows sharing this attribute (or column) into one split transaction
    #[arg(short, long)]
    collapse: Option<String>,

    /// Rows grouped together when collapsing
    #[arg(short = 'C', long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Earliest transaction date to include
    #[arg(short, long)]
    start: Option<String>,

    /// Latest transaction date to include (default: the server date)
    #[arg(short, long)]
    end: Option<String>,

    /// Statement date (default: the input file's modification time)
    #[arg(short = 'D', long)]
    server_date: Option<String>,

    /// Read ambiguous dates day-first
    #[arg(short = 'y', long)]
    day_first: bool,

    /// Account type (OFX: CHECKING, SAVINGS, MONEYMRKT, CREDITLINE; QIF: Bank, Cash)
    #[arg(short, long, env = "CSV2STMT_ACCOUNT_TYPE")]
    account_type: Option<String>,

    /// Financial institution identifier
    #[arg(short, long, env = "CSV2STMT_INSTITUTION")]
    institution: Option<String>,

    /// Statement language
    #[arg(short, long, default_value = "ENG", env = "CSV2STMT_LANGUAGE")]
    language: String,

    /// Expected ending balance
    #[arg(short = 'b', long, allow_hyphen_values = true)]
    ending_balance: Option<Decimal>,

    /// Balance before the first transaction
    #[arg(short = 'B', long, allow_hyphen_values = true, default_value_t = Decimal::ZERO)]
    opening_balance: Decimal,

    /// Layout of QIF dates
    #[arg(long, default_value = DEFAULT_DATE_FORMAT)]
    qif_date_format: String,

    /// Require an institution and a reconciled ending balance
    #[arg(long)]
    strict: bool,

    /// CSV delimiter (auto-detect if not specified)
    #[arg(short, long)]
    delimiter: Option<char>,

    /// Source encoding (auto-detect if not specified)
    #[arg(long)]
    encoding: Option<String>,

    /// The file has no header row; columns are named 0, 1, 2...
    #[arg(long)]
    no_header: bool,

    /// Index of the header (or first data) record
    #[arg(long)]
    first_row: Option<usize>,

    /// Index of the last record to read; negative counts from the end
    #[arg(long, allow_hyphen_values = true)]
    last_row: Option<i64>,

    /// Number of leading columns to skip
    #[arg(long)]
    first_col: Option<usize>,
}

#[derive(Subcommand)]
enum MappingAction {
    /// List built-in and stored mappings
    List,

    /// Show details of a mapping
    Show {
        /// Mapping name
        name: String,
    },

    /// Import a mapping JSON file
    Import {
        /// Mapping JSON file to import
        file: PathBuf,
        /// Name for the mapping
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Delete a stored mapping
    Delete {
        /// Mapping name
        name: String,
    },
}

fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    LOG_BROADCASTER.set_echo(cli.verbose);

    let result = match cli.command {
        Commands::Convert(args) => cmd_convert(args, cli.verbose),
        Commands::Mappings { action } => cmd_mappings(action).map(|()| 0),
        Commands::ExampleMapping => cmd_example_mapping().map(|()| 0),
        Commands::Operations => cmd_operations().map(|()| 0),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("❌ Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_convert(args: ConvertArgs, verbose: bool) -> CliResult<i32> {
    let from_stdin = args.input.as_os_str() == "-";
    eprintln!(
        "📄 Converting: {}",
        if from_stdin { "<stdin>".to_string() } else { args.input.display().to_string() }
    );

    let bytes = if from_stdin {
        let mut buf = Vec::new();
        io::stdin().read_to_end(&mut buf)?;
        buf
    } else {
        fs::read(&args.input)?
    };

    let source = SourceFormat {
        delimiter: args.delimiter,
        encoding: args.encoding.clone(),
        has_header: args.no_header.then_some(false),
        first_row: args.first_row,
        last_row: args.last_row,
        first_col: args.first_col,
    };
    let mapping = load_mapping(&args.mapping, &bytes, &source)?;

    let server_date = match &args.server_date {
        Some(text) => Some(parse_server_date(text, args.day_first)?),
        None if from_stdin => None,
        None => modified_time(&args.input),
    };
    let options = ConvertOptions {
        format: args.format,
        account_type: args.account_type,
        institution: args.institution,
        language: args.language,
        strict: args.strict,
        start: parse_bound(args.start.as_deref(), args.day_first)?,
        end: parse_bound(args.end.as_deref(), args.day_first)?,
        collapse: args.collapse,
        chunk_size: args.chunk_size,
        opening_balance: args.opening_balance,
        ending_balance: args.ending_balance,
        server_date,
        day_first: args.day_first,
        qif_date_format: args.qif_date_format,
        source,
        ..Default::default()
    };

    // Without --verbose, warnings are still shown once the run is over
    let mut logs = LOG_BROADCASTER.subscribe();
    let outcome = match &args.output {
        Some(path) => write_atomic(path, args.overwrite, |out| {
            convert_source(bytes.as_slice(), &mapping, &options, out)
        }),
        None => {
            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            convert_source(bytes.as_slice(), &mapping, &options, &mut out).map_err(Into::into)
        }
    };
    if !verbose {
        for entry in drain(&mut logs) {
            if entry.level == LogLevel::Warning {
                eprintln!("⚠️  {}", entry.message);
            }
        }
    }

    match outcome? {
        Outcome::Converted(summary) => {
            let period = match (summary.start_date, summary.end_date) {
                (Some(start), Some(end)) => format!(" from {} to {}", start, end),
                _ => String::new(),
            };
            eprintln!("✅ {} {} transactions{}", summary.count, options.format, period);
            eprintln!("   Balance: {} → {}", summary.opening_balance, summary.final_balance);
            if let Some(path) = &args.output {
                eprintln!("💾 Output written to: {}", path.display());
            }
            Ok(0)
        }
        Outcome::Empty => {
            let hint = if options.collapse.is_some() {
                "Check --start and --end."
            } else {
                "Try again with --collapse."
            };
            eprintln!("⚠️  No transactions to write. {}", hint);
            Ok(EXIT_EMPTY)
        }
    }
}

/// Resolve `--mapping`: a registry name, a JSON file, or `auto`.
fn load_mapping(reference: &str, bytes: &[u8], source: &SourceFormat) -> CliResult<MappingSpec> {
    let registry = MappingRegistry::new();
    if reference != "auto" {
        return Ok(registry.resolve(reference)?);
    }

    let headers = peek_headers(bytes, source)?;
    let compatible = registry.find_compatible(&headers);
    match compatible.first() {
        Some((stored, score)) => {
            eprintln!("   Mapping: {} ({:.0}% of its columns found)", stored.name, score * 100.0);
            Ok(stored.mapping.clone())
        }
        None => Err(format!("No mapping matches columns: {}", headers.join(", ")).into()),
    }
}

/// Write through a temporary file next to `path`, persisted only on success.
fn write_atomic<F>(path: &Path, overwrite: bool, render: F) -> CliResult<Outcome>
where
    F: FnOnce(&mut dyn Write) -> csv2stmt::PipelineResult<Outcome>,
{
    if path.exists() && !overwrite {
        return Err(format!("{} already exists (use --overwrite to replace it)", path.display()).into());
    }

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    let outcome = {
        let mut out = BufWriter::new(tmp.as_file_mut());
        let outcome = render(&mut out)?;
        out.flush()?;
        outcome
    };

    // An empty run leaves no file behind
    if let Outcome::Converted(_) = outcome {
        tmp.persist(path)?;
    }
    Ok(outcome)
}

fn parse_bound(text: Option<&str>, day_first: bool) -> CliResult<Option<NaiveDate>> {
    Ok(text.map(|t| parse_date(t, day_first)).transpose()?)
}

fn parse_server_date(text: &str, day_first: bool) -> CliResult<NaiveDateTime> {
    if let Ok(datetime) = parse_datetime(text, day_first) {
        return Ok(datetime);
    }
    let date = parse_date(text, day_first)?;
    date.and_hms_opt(0, 0, 0)
        .ok_or_else(|| format!("invalid server date '{}'", text).into())
}

fn modified_time(path: &Path) -> Option<NaiveDateTime> {
    let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
    Some(DateTime::<Local>::from(modified).naive_local())
}

fn cmd_mappings(action: MappingAction) -> CliResult<()> {
    let mut registry = MappingRegistry::new();

    match action {
        MappingAction::List => {
            let mappings = registry.list();
            eprintln!("📋 Mappings ({}):\n", mappings.len());
            for m in mappings {
                let origin = if m.builtin { "built-in" } else { "stored" };
                println!("  📄 {} ({})", m.name, origin);
                if !m.mapping.description.is_empty() {
                    println!("     {}", m.mapping.description);
                }
                println!("     Columns: {}", m.columns.join(", "));
                println!();
            }
            eprintln!("   Stored mappings live in {}", registry.dir().display());
        }

        MappingAction::Show { name } => {
            let m = registry.get(&name)?;
            println!("📄 Mapping: {}\n", m.name);
            println!("Columns: {}", m.columns.join(", "));
            match m.mapping.to_json() {
                Ok(json) => println!("\n{}", json),
                // Native derivations have no JSON form
                Err(_) => println!("\nDefined in code; fields: {}", m.mapping.fields.keys().cloned().collect::<Vec<_>>().join(", ")),
            }
        }

        MappingAction::Import { file, name } => {
            eprintln!("📥 Importing mapping from: {}", file.display());
            let stored = registry.import(&file, name.as_deref())?;
            eprintln!("✅ Mapping saved as: {}", stored);
        }

        MappingAction::Delete { name } => {
            registry.delete(&name)?;
            eprintln!("🗑️  Mapping deleted: {}", name);
        }
    }

    Ok(())
}

fn cmd_example_mapping() -> CliResult<()> {
    println!("{}", example_mapping().to_json()?);
    Ok(())
}

fn cmd_operations() -> CliResult<()> {
    println!("{}", operations_description());
    Ok(())
}
