//! End-to-end scenarios over small hand-built tables and a CSV sample.

use emissions::analysis::{
    aggregate, group_by_quantile, group_by_quantile_for_year, growth, multiplier, summarize,
    summary_table, with_yoy_pct_change, CountrySummary, Statistic,
};
use emissions::table::{read_csv, write_parquet, LoadOptions};
use emissions::Table;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Cursor;
use tempfile::TempDir;

fn country_a() -> Table {
    Table::from_rows(
        &["pop", "co2"],
        vec![
            ("A", 2000, vec![Some(10.0), Some(5.0)]),
            ("A", 2010, vec![Some(20.0), Some(15.0)]),
        ],
    )
    .unwrap()
}

#[test]
fn summarize_reports_first_and_last_observation() {
    let summary = summarize(&country_a(), "pop", false).unwrap();
    let expected: BTreeMap<String, CountrySummary> = [(
        "A".to_string(),
        CountrySummary {
            earliest_year: 2000,
            earliest_value: 10.0,
            latest_year: 2010,
            latest_value: 20.0,
            pct_growth: Some(1.0),
        },
    )]
    .into_iter()
    .collect();
    assert_eq!(summary, expected);
    assert_eq!(growth(&country_a(), "pop", false).unwrap()["A"], Some(1.0));
}

#[test]
fn multiplier_for_growing_population() {
    let m = multiplier(&country_a(), &["pop", "co2"], false).unwrap();
    let a = m["A"];
    assert_eq!(a.growth_a, Some(1.0));
    assert_eq!(a.growth_b, Some(2.0));
    assert_eq!(a.multiplier, Some(2.0));
    assert!(!a.sign_corrected);
}

#[test]
fn multiplier_flips_sign_for_shrinking_population() {
    let t = Table::from_rows(
        &["pop", "co2"],
        vec![
            ("B", 2000, vec![Some(100.0), Some(10.0)]),
            ("B", 2010, vec![Some(50.0), Some(13.0)]),
        ],
    )
    .unwrap();
    let b = multiplier(&t, &["pop", "co2"], false).unwrap()["B"];
    assert_eq!(b.growth_a, Some(-0.5));
    assert!((b.growth_b.unwrap() - 0.3).abs() < 1e-12);
    assert!((b.multiplier.unwrap() - 0.6).abs() < 1e-12);
    assert!(b.sign_corrected);
}

#[test]
fn quartiles_of_eight_countries_hold_two_each() {
    let gdp = [40.0, 10.0, 80.0, 30.0, 70.0, 20.0, 60.0, 50.0];
    let t = Table::from_rows(
        &["gdp"],
        gdp.iter()
            .enumerate()
            .map(|(i, v)| (format!("C{}", i), 2015, vec![Some(*v)])),
    )
    .unwrap();
    let g = group_by_quantile(&t, "gdp", 4).unwrap();
    assert_eq!(g.groups().unwrap(), vec![1, 2, 3, 4]);

    let labels: Vec<u32> = g.labels().unwrap().iter().flatten().collect();
    for group in 1..=4 {
        assert_eq!(labels.iter().filter(|&&l| l == group).count(), 2);
    }
    // ordered by gdp: every member of a higher group out-ranks the lower ones
    let mut pairs: Vec<(f64, u32)> = gdp.iter().copied().zip(labels).collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    assert!(pairs.windows(2).all(|w| w[0].1 <= w[1].1));

    let counts = aggregate(&g, "gdp", Statistic::Count).unwrap();
    assert_eq!(counts.values().copied().collect::<Vec<_>>(), vec![Some(2.0); 4]);
}

#[test]
fn summarize_is_idempotent() {
    let t = country_a();
    assert_eq!(
        summary_table(&t, &["pop", "co2"], true).unwrap(),
        summary_table(&t, &["pop", "co2"], true).unwrap()
    );
}

const OWID_SAMPLE: &str = "\
country,year,iso_code,population,co2
Albania,2000,ALB,3000000,3.0
Albania,2010,ALB,2900000,4.5
Brazil,2000,BRA,175000000,330.0
Brazil,2010,BRA,196000000,420.0
Chad,2000,TCD,8000000,
Chad,2010,TCD,11000000,0.9
World,2000,OWID_WRL,6100000000,25000.0
World,2010,OWID_WRL,6900000000,33000.0
";

#[test]
fn csv_to_grouped_parquet() -> anyhow::Result<()> {
    let table = read_csv(Cursor::new(OWID_SAMPLE), &LoadOptions::default())?;
    assert_eq!(table.num_rows(), 6);
    assert!(!table.country_names().contains("World"));

    let m = multiplier(&table, &["population", "co2"], false)?;
    let albania = m["Albania"];
    assert!(albania.sign_corrected);
    assert!(albania.multiplier.is_some_and(|v| v > 0.0));
    // Chad has a single co2 observation
    assert_eq!(m["Chad"].growth_b, Some(0.0));

    let with_yoy = with_yoy_pct_change(&table)?;
    assert!(with_yoy
        .metric_names()
        .contains(&"co2 YoY_pct_change".to_string()));

    let grouped = group_by_quantile_for_year(&table, 2010, "co2", 3)?;
    assert_eq!(grouped.groups()?, vec![1, 2, 3]);

    let dir = TempDir::new()?;
    let out = dir.path().join("grouped").join("co2_2010.parquet");
    let bytes = write_parquet(&grouped.table, &out)?;
    assert!(bytes > 0);

    let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&out)?)?.build()?;
    let rows: usize = reader.map(|b| b.map(|b| b.num_rows())).sum::<Result<usize, _>>()?;
    assert_eq!(rows, 3);
    Ok(())
}
