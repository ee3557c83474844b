//! Growth, multiplier, and quantile-group statistics over a `Table`.
//!
//! Every function here is a pure transform: it reads the table it is given
//! and returns a freshly built result.

pub mod aggregate;
pub mod growth;
pub mod multiplier;
pub mod quantile;
pub mod summary;

pub use aggregate::{aggregate, describe, sum_by_country, GroupStats, Statistic};
pub use growth::{
    growth, pct_change, pct_change_between_years, value_at, with_yoy_pct_change, yoy_column_name,
};
pub use multiplier::{
    grouped_growth_multipliers, grouped_mean_multiplier, multiplier, GroupedMultiplier, Multiplier,
};
pub use quantile::{
    group_by_quantile, group_by_quantile_for_year, group_by_quantile_for_year_range,
    group_column_name, quantile_labels, GroupedTable,
};
pub use summary::{summarize, summary_table, CountrySummary};
