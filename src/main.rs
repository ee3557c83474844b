use anyhow::{anyhow, Context, Result};
use arrow::array::Array;
use clap::{Args, Parser, Subcommand};
use emissions::{
    analysis::{self, GroupedTable, Statistic},
    table::{self, Table},
    Config,
};
use serde::Serialize;
use std::{path::PathBuf, time::Instant};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Growth and quantile-group statistics over per-country emissions data.
#[derive(Debug, Parser)]
#[command(name = "emissions", version)]
struct Cli {
    /// YAML config file.
    #[arg(long, env = "EMISSIONS_CONFIG")]
    config: Option<PathBuf>,

    /// Dataset CSV (country, year, metrics...). Overrides the config.
    #[arg(long)]
    data: Option<PathBuf>,

    /// Keep aggregate/region rows such as "World" or "Africa".
    #[arg(long)]
    include_regions: bool,

    /// Restrict to these countries (comma separated).
    #[arg(long, value_delimiter = ',')]
    countries: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

/// Year or year-range slice applied before grouping.
#[derive(Debug, Args)]
struct Slice {
    #[arg(long, conflicts_with_all = ["from", "to"])]
    year: Option<i64>,
    #[arg(long, requires = "to")]
    from: Option<i64>,
    #[arg(long, requires = "from")]
    to: Option<i64>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Earliest / latest observation and growth per country.
    Summarize {
        #[arg(long, required = true, value_delimiter = ',')]
        columns: Vec<String>,
        #[arg(long)]
        exclude_zero: bool,
    },
    /// Growth between earliest and latest observation per country.
    Growth {
        #[arg(long)]
        column: String,
        #[arg(long)]
        exclude_zero: bool,
    },
    /// Growth multiplier of the second column relative to the first.
    Multiplier {
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,
        #[arg(long)]
        exclude_zero: bool,
        /// Report the mean multiplier per growth group instead.
        #[arg(long)]
        groups: Option<usize>,
    },
    /// Label rows with their quantile group of a column.
    Group {
        #[arg(long)]
        column: String,
        #[arg(long)]
        groups: Option<usize>,
        #[command(flatten)]
        slice: Slice,
        /// Write the grouped table here as Parquet.
        #[arg(long)]
        parquet: Option<PathBuf>,
    },
    /// One statistic of a column per quantile group of another.
    Aggregate {
        #[arg(long)]
        group_by: String,
        #[arg(long)]
        groups: Option<usize>,
        #[arg(long)]
        column: String,
        /// count, mean, sum, std, min, max, median, pNN, pct_of_total
        #[arg(long, default_value = "mean")]
        stat: Statistic,
        #[command(flatten)]
        slice: Slice,
    },
    /// Descriptive statistics of a column per quantile group of another.
    Describe {
        #[arg(long)]
        group_by: String,
        #[arg(long)]
        groups: Option<usize>,
        #[arg(long)]
        column: String,
        #[command(flatten)]
        slice: Slice,
    },
    /// Total of a column per country over a year slice.
    Totals {
        #[arg(long)]
        column: String,
        #[command(flatten)]
        slice: Slice,
    },
}

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,emissions=info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // ─── 2) resolve config ───────────────────────────────────────────
    let mut cfg = Config::load(cli.config.as_deref())?;
    if let Some(path) = cli.data.clone() {
        cfg.data_path = Some(path);
    }
    if cli.include_regions {
        cfg.countries_only = false;
    }
    let data_path = cfg
        .data_path
        .clone()
        .ok_or_else(|| anyhow!("no dataset: pass --data or set EMISSIONS_DATA"))?;

    // ─── 3) load table ───────────────────────────────────────────────
    let start = Instant::now();
    let mut table = table::load_csv(&data_path, &cfg.load_options())?;
    if !cli.countries.is_empty() {
        table = table.for_countries(&cli.countries)?;
    }
    info!(rows = table.num_rows(), elapsed = ?start.elapsed(), "table ready");

    // ─── 4) run command ──────────────────────────────────────────────
    let groups_or_default = |n: Option<usize>| n.unwrap_or(cfg.default_groups);
    match cli.command {
        Command::Summarize {
            columns,
            exclude_zero,
        } => print_json(&analysis::summary_table(
            &table,
            &columns,
            exclude_zero || cfg.exclude_zero,
        )?),
        Command::Growth {
            column,
            exclude_zero,
        } => print_json(&analysis::growth(
            &table,
            &column,
            exclude_zero || cfg.exclude_zero,
        )?),
        Command::Multiplier {
            columns,
            exclude_zero,
            groups,
        } => {
            let exclude_zero = exclude_zero || cfg.exclude_zero;
            match groups {
                Some(n) => print_json(&analysis::grouped_mean_multiplier(
                    &table,
                    &columns,
                    n,
                    exclude_zero,
                )?),
                None => print_json(&analysis::multiplier(&table, &columns, exclude_zero)?),
            }
        }
        Command::Group {
            column,
            groups,
            slice,
            parquet,
        } => {
            let grouped = group(&table, &slice, &column, groups_or_default(groups))?;
            if let Some(out) = parquet {
                table::write_parquet(&grouped.table, &out)?;
            }
            print_json(&group_members(&grouped)?)
        }
        Command::Aggregate {
            group_by,
            groups,
            column,
            stat,
            slice,
        } => {
            let grouped = group(&table, &slice, &group_by, groups_or_default(groups))?;
            print_json(&analysis::aggregate(&grouped, &column, stat)?)
        }
        Command::Describe {
            group_by,
            groups,
            column,
            slice,
        } => {
            let grouped = group(&table, &slice, &group_by, groups_or_default(groups))?;
            print_json(&analysis::describe(&grouped, &column)?)
        }
        Command::Totals { column, slice } => {
            let sliced = match (slice.year, slice.from, slice.to) {
                (Some(y), _, _) => table.for_year(y)?,
                (None, Some(a), Some(b)) => table.for_year_range(a, b)?,
                _ => table,
            };
            print_json(&analysis::sum_by_country(&sliced, &column)?)
        }
    }
}

/// Apply the year / range slice, then group.
fn group(table: &Table, slice: &Slice, column: &str, n: usize) -> Result<GroupedTable> {
    let grouped = match (slice.year, slice.from, slice.to) {
        (Some(y), _, _) => analysis::group_by_quantile_for_year(table, y, column, n)?,
        (None, Some(a), Some(b)) => {
            analysis::group_by_quantile_for_year_range(table, a, b, column, n)?
        }
        _ => analysis::group_by_quantile(table, column, n)?,
    };
    info!(column, groups = ?grouped.groups()?, rows = grouped.table.num_rows(), "grouped");
    Ok(grouped)
}

#[derive(Serialize)]
struct Member {
    country: String,
    year: i64,
    group: u32,
}

/// Labelled rows of a grouped table, in table order.
fn group_members(grouped: &GroupedTable) -> Result<Vec<Member>> {
    let labels = grouped.labels()?;
    let countries = grouped.table.countries();
    let years = grouped.table.years();
    Ok((0..grouped.table.num_rows())
        .filter(|&row| labels.is_valid(row))
        .map(|row| Member {
            country: countries.value(row).to_string(),
            year: years.value(row),
            group: labels.value(row),
        })
        .collect())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("serializing result")?;
    println!("{}", text);
    Ok(())
}
