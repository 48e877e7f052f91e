use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use infra_screen::algo::similarity::Metric;
use infra_screen::{ops, ColumnOverrides, Role, ScreenError, ScreeningConfig};
use serde_json::Value;
use std::io::{self, Read};

#[derive(Parser)]
#[command(
    name = "screen",
    version,
    about = "Anomaly screening and contractor risk indicators for infrastructure project records"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Threshold flags shared by every subcommand that runs the pipeline.
/// Unset flags keep the value from `--config` (or the default).
#[derive(clap::Args)]
struct ThresholdArgs {
    /// JSON config file (thresholds, overrides, geo_cell_km, as_of)
    #[arg(short, long)]
    config: Option<String>,
    /// Minimum token-set similarity between titles for redundancy [0.40, 0.95]
    #[arg(long)]
    redundant_similarity: Option<f64>,
    /// Percentile of amounts that counts as high for the ghost flag [50, 95]
    #[arg(long)]
    ghost_high_amount_percentile: Option<f64>,
    /// Duration in days that counts as never-ending [365, 1825]
    #[arg(long)]
    never_ending_days: Option<i64>,
    /// IQR multiplier for the costly flag [0.5, 3.0]
    #[arg(long)]
    cost_iqr_k: Option<f64>,
    /// Use the target-date overrun rule for ghosts
    #[arg(long)]
    use_target_overrun: Option<bool>,
    /// Days of grace past the target date [0, 365]
    #[arg(long)]
    grace_days: Option<i64>,
    /// Share of a cluster that counts as concentration [0.10, 0.90]
    #[arg(long)]
    concentration_share: Option<f64>,
    /// Flag count that counts as repeated issues [1, 100]
    #[arg(long)]
    min_repeated_flags: Option<usize>,
    /// Percentile of mean unit cost that counts as high [60, 99]
    #[arg(long)]
    high_cost_percentile: Option<f64>,
    /// Grid cell size in km when coordinates are present
    #[arg(long)]
    geo_cell_km: Option<f64>,
    /// Reference date used as "now" (YYYY-MM-DD, default: today)
    #[arg(long)]
    as_of: Option<NaiveDate>,
    /// Column override as role=column, role=auto or role=none (repeatable)
    #[arg(short = 'C', long = "column", value_name = "ROLE=COLUMN")]
    columns: Vec<String>,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum ViewArg {
    Annotated,
    Redundant,
    Ghost,
    NeverEnding,
    Costly,
    Flagged,
    Summary,
    Contractors,
    All,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the resolved role → column map
    Detect {
        /// JSON array of records (default: stdin)
        #[arg(short, long)]
        input: Option<String>,
        #[command(flatten)]
        args: ThresholdArgs,
    },
    /// Run the full screening pipeline
    Screen {
        /// JSON array of records (default: stdin)
        #[arg(short, long)]
        input: Option<String>,
        /// Which part of the result to print
        #[arg(short, long, value_enum, default_value = "all")]
        view: ViewArg,
        /// SQLite file for reusing preprocessed datasets
        #[cfg(feature = "cache")]
        #[arg(long)]
        cache: Option<String>,
        #[command(flatten)]
        args: ThresholdArgs,
    },
    /// Link project records to a budget ledger
    Match {
        /// JSON array of project records
        base: String,
        /// JSON array of ledger records
        budget: String,
        #[command(flatten)]
        args: ThresholdArgs,
    },
    /// Compute similarity between two strings
    Similarity {
        /// First string
        a: String,
        /// Second string
        b: String,
        /// Metric: sequence, token-set, partial, jaccard, prefix, composite, levenshtein, jaro-winkler
        #[arg(short, long, default_value = "composite")]
        metric: String,
        /// Compute all metrics at once
        #[arg(short, long)]
        all: bool,
    },
    /// Inspect or clear the preprocessing cache
    #[cfg(feature = "cache")]
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[cfg(feature = "cache")]
#[derive(Subcommand)]
enum CacheAction {
    /// List cached snapshots
    Info {
        /// SQLite cache file
        path: String,
    },
    /// Delete every cached snapshot
    Clear {
        /// SQLite cache file
        path: String,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let command = cli.command.unwrap_or_else(|| {
        eprintln!("No subcommand provided. Run `screen --help` for usage.");
        std::process::exit(1);
    });

    let result = match command {
        Commands::Detect { input, args } => cmd_detect(input.as_deref(), &args),
        #[cfg(feature = "cache")]
        Commands::Screen {
            input,
            view,
            cache,
            args,
        } => cmd_screen(input.as_deref(), view, cache.as_deref(), &args),
        #[cfg(not(feature = "cache"))]
        Commands::Screen { input, view, args } => cmd_screen(input.as_deref(), view, None, &args),
        Commands::Match { base, budget, args } => cmd_match(&base, &budget, &args),
        Commands::Similarity { a, b, metric, all } => cmd_similarity(&a, &b, &metric, all),
        #[cfg(feature = "cache")]
        Commands::Cache { action } => match action {
            CacheAction::Info { path } => ops::op_cache_info(&path),
            CacheAction::Clear { path } => ops::op_cache_clear(&path),
        },
    };

    match result {
        Ok(output) => print_json(&output),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn read_json_records(path: Option<&str>) -> Result<Vec<Value>, ScreenError> {
    let buf = match path {
        Some(p) => std::fs::read_to_string(p)?,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let parsed: Value = serde_json::from_str(&buf)?;
    match parsed {
        Value::Array(arr) => Ok(arr),
        single @ Value::Object(_) => Ok(vec![single]),
        other => Err(ScreenError::NotTabular(format!(
            "expected an array of records, got {}",
            kind(&other)
        ))),
    }
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn parse_override(arg: &str) -> Result<(Role, Option<String>), ScreenError> {
    let (role, column) = arg.split_once('=').ok_or_else(|| {
        ScreenError::InvalidArgument(format!("column override '{arg}' must be ROLE=COLUMN"))
    })?;
    let role = Role::from_str(role.trim()).ok_or_else(|| {
        let known: Vec<&str> = Role::ALL.iter().map(|r| r.as_str()).collect();
        ScreenError::InvalidArgument(format!(
            "unknown role '{}'. Use: {}",
            role.trim(),
            known.join(", ")
        ))
    })?;
    let column = column.trim();
    let column = match column {
        "none" | "null" | "" => None,
        other => Some(other.to_string()),
    };
    Ok((role, column))
}

/// Config file first, then individual flags on top.
fn build_config(args: &ThresholdArgs) -> Result<ScreeningConfig, ScreenError> {
    let mut config = match &args.config {
        Some(path) => ScreeningConfig::from_json_str(&std::fs::read_to_string(path)?)?,
        None => ScreeningConfig::default(),
    };

    let f = &mut config.flags;
    if let Some(v) = args.redundant_similarity {
        f.redundant_similarity = v;
    }
    if let Some(v) = args.ghost_high_amount_percentile {
        f.ghost_high_amount_percentile = v;
    }
    if let Some(v) = args.never_ending_days {
        f.never_ending_days = v;
    }
    if let Some(v) = args.cost_iqr_k {
        f.cost_iqr_k = v;
    }
    if let Some(v) = args.use_target_overrun {
        f.use_target_overrun = v;
    }
    if let Some(v) = args.grace_days {
        f.grace_days = v;
    }

    let c = &mut config.contractors;
    if let Some(v) = args.concentration_share {
        c.concentration_share = v;
    }
    if let Some(v) = args.min_repeated_flags {
        c.min_repeated_flags = v;
    }
    if let Some(v) = args.high_cost_percentile {
        c.high_cost_percentile = v;
    }

    if args.geo_cell_km.is_some() {
        config.geo_cell_km = args.geo_cell_km;
    }
    if args.as_of.is_some() {
        config.as_of = args.as_of;
    }

    let mut overrides: ColumnOverrides = config.overrides.clone();
    for arg in &args.columns {
        let (role, column) = parse_override(arg)?;
        overrides = match column.as_deref() {
            None => overrides.disable(role),
            Some("auto") => overrides.set(role, infra_screen::columns::Override::Auto),
            Some(name) => overrides.column(role, name),
        };
    }
    config.overrides = overrides;

    config.validate()?;
    Ok(config)
}

fn cmd_detect(input: Option<&str>, args: &ThresholdArgs) -> Result<Value, ScreenError> {
    let rows = read_json_records(input)?;
    let config = build_config(args)?;
    ops::op_detect(&rows, &config.overrides)
}

fn cmd_screen(
    input: Option<&str>,
    view: ViewArg,
    cache: Option<&str>,
    args: &ThresholdArgs,
) -> Result<Value, ScreenError> {
    let rows = read_json_records(input)?;
    let config = build_config(args)?;
    let mut out = ops::op_screen_cached(&rows, &config, cache)?;

    let picked = match view {
        ViewArg::All => return Ok(out),
        ViewArg::Annotated => out["annotated"].take(),
        ViewArg::Redundant => out["views"]["redundant"].take(),
        ViewArg::Ghost => out["views"]["ghost"].take(),
        ViewArg::NeverEnding => out["views"]["never-ending"].take(),
        ViewArg::Costly => out["views"]["costly"].take(),
        ViewArg::Flagged => out["views"]["flagged"].take(),
        ViewArg::Summary => out["summary"].take(),
        ViewArg::Contractors => out["contractors"].take(),
    };
    Ok(picked)
}

fn cmd_match(base: &str, budget: &str, args: &ThresholdArgs) -> Result<Value, ScreenError> {
    let base_rows = read_json_records(Some(base))?;
    let budget_rows = read_json_records(Some(budget))?;
    let config = build_config(args)?;
    ops::op_match(&base_rows, &budget_rows, &config)
}

fn cmd_similarity(a: &str, b: &str, metric: &str, all: bool) -> Result<Value, ScreenError> {
    ops::op_similarity(a, b, metric, all).map_err(|e| match e {
        ScreenError::UnknownMetric(m) => {
            ScreenError::UnknownMetric(format!("{m}. Use: {}", Metric::all_names().join(", ")))
        }
        other => other,
    })
}
