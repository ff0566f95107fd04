//! Behavior-driven tests for the DuckDB bar store
//!
//! These tests verify what a user reading bars back out of the warehouse sees:
//! ordering, deduplication, atomic batches, persistence, and aggregation.

use std::thread;

use barvault_tests::*;
use tempfile::tempdir;
use time::macros::date;
use time::{Date, Duration};

fn daily_bars(ticker: &str, first: Date, days: i64) -> Vec<Bar> {
    (0..days)
        .map(|offset| {
            let close = 100.0 + offset as f64;
            let day = first + Duration::days(offset);
            bar(ticker, day, close - 0.5, close + 1.0, close - 1.0, close, Some(100))
        })
        .collect()
}

// =============================================================================
// Warehouse: Ordering and deduplication
// =============================================================================

#[test]
fn when_bars_arrive_out_of_order_then_range_returns_them_ascending_without_duplicates() {
    // Given: A warehouse
    let temp = tempdir().expect("tempdir");
    let warehouse = open_warehouse(temp.path());
    let xlk = symbol("XLK");

    // When: A batch arrives shuffled and with one date repeated
    let batch = vec![
        bar("XLK", date!(2024 - 05 - 03), 210.0, 212.0, 209.0, 211.0, Some(30)),
        bar("XLK", date!(2024 - 05 - 01), 205.0, 207.0, 204.0, 206.0, Some(10)),
        bar("XLK", date!(2024 - 05 - 02), 206.0, 209.0, 205.0, 208.0, Some(20)),
        bar("XLK", date!(2024 - 05 - 01), 205.5, 207.5, 204.5, 207.0, Some(11)),
    ];
    let written = warehouse.upsert_many(&xlk, &batch).expect("write");

    // Then: One row per date, ascending, with the later duplicate kept
    let series = warehouse.range(&xlk, None, None).expect("range");
    let dates: Vec<Date> = series.bars().iter().map(|bar| bar.date).collect();
    assert_eq!(written, 3);
    assert_eq!(dates, vec![date!(2024 - 05 - 01), date!(2024 - 05 - 02), date!(2024 - 05 - 03)]);
    assert_eq!(series.bars()[0].close, 207.0);
    assert_eq!(series.period(), AggregationPeriod::Daily);
}

#[test]
fn when_range_has_bounds_then_only_that_window_is_returned() {
    // Given: Ten days of XLE
    let temp = tempdir().expect("tempdir");
    let warehouse = open_warehouse(temp.path());
    let xle = symbol("XLE");
    warehouse
        .upsert_many(&xle, &daily_bars("XLE", date!(2024 - 05 - 01), 10))
        .expect("write");

    // When: The user asks for bounded and half-open windows
    let bounded = warehouse
        .range(&xle, Some(date!(2024 - 05 - 03)), Some(date!(2024 - 05 - 05)))
        .expect("bounded");
    let from = warehouse.range(&xle, Some(date!(2024 - 05 - 08)), None).expect("from");
    let until = warehouse.range(&xle, None, Some(date!(2024 - 05 - 02))).expect("until");

    // Then: Bounds are inclusive and absent bounds are open-ended
    assert_eq!(bounded.len(), 3);
    assert_eq!(bounded.first_date(), Some(date!(2024 - 05 - 03)));
    assert_eq!(from.len(), 3);
    assert_eq!(until.len(), 2);
    assert_eq!(
        warehouse.date_range(&xle).expect("date range"),
        Some((date!(2024 - 05 - 01), date!(2024 - 05 - 10)))
    );
}

// =============================================================================
// Warehouse: Atomic batches and durability
// =============================================================================

#[test]
fn when_a_batch_fails_part_way_then_none_of_it_is_visible() {
    // Given: A warehouse already holding one good day
    let temp = tempdir().expect("tempdir");
    let warehouse = open_warehouse(temp.path());
    let xlf = symbol("XLF");
    warehouse
        .upsert_many(&xlf, &daily_bars("XLF", date!(2024 - 05 - 01), 1))
        .expect("seed");

    // When: A batch whose middle row breaks the schema is written
    let mut batch = daily_bars("XLF", date!(2024 - 05 - 02), 3);
    batch[1].low = batch[1].high + 5.0;
    let result = warehouse.upsert_many(&xlf, &batch);

    // Then: The write fails and only the seeded day remains
    assert!(result.is_err());
    let series = warehouse.range(&xlf, None, None).expect("range");
    assert_eq!(series.len(), 1);
    assert_eq!(warehouse.last_date(&xlf).expect("last"), Some(date!(2024 - 05 - 01)));
    assert_eq!(warehouse.ingest_log(&xlf).expect("log").len(), 1);
}

#[test]
fn when_warehouse_is_reopened_then_previously_written_bars_are_still_there() {
    // Given: Bars written through one warehouse handle
    let temp = tempdir().expect("tempdir");
    {
        let warehouse = open_warehouse(temp.path());
        warehouse
            .upsert_many(&symbol("XLV"), &daily_bars("XLV", date!(2024 - 05 - 01), 4))
            .expect("write");
    }

    // When: The same file is opened again
    let reopened = open_warehouse(temp.path());

    // Then: The history and the symbol list survive
    assert_eq!(reopened.range(&symbol("XLV"), None, None).expect("range").len(), 4);
    assert!(reopened.symbols().expect("symbols").contains(&symbol("XLV")));
}

#[test]
fn when_different_symbols_are_written_concurrently_then_both_batches_land() {
    // Given: One shared warehouse
    let temp = tempdir().expect("tempdir");
    let warehouse = Arc::new(open_warehouse(temp.path()));

    // When: Two threads write different symbols at the same time
    let handles: Vec<_> = ["XLU", "XLB"]
        .into_iter()
        .map(|ticker| {
            let warehouse = Arc::clone(&warehouse);
            thread::spawn(move || {
                warehouse
                    .upsert_many(&symbol(ticker), &daily_bars(ticker, date!(2024 - 05 - 01), 20))
                    .expect("write")
            })
        })
        .collect();
    let written: Vec<usize> = handles
        .into_iter()
        .map(|handle| handle.join().expect("thread"))
        .collect();

    // Then: Every row from both writers is stored
    assert_eq!(written, vec![20, 20]);
    assert_eq!(warehouse.range(&symbol("XLU"), None, None).expect("XLU").len(), 20);
    assert_eq!(warehouse.range(&symbol("XLB"), None, None).expect("XLB").len(), 20);
}

// =============================================================================
// Warehouse: Ticker info
// =============================================================================

#[test]
fn when_user_asks_for_a_summary_then_extremes_and_latest_close_are_reported() {
    // Given: Three days of XLI
    let temp = tempdir().expect("tempdir");
    let warehouse = open_warehouse(temp.path());
    let xli = symbol("XLI");
    warehouse
        .upsert_many(
            &xli,
            &[
                bar("XLI", date!(2024 - 05 - 01), 120.0, 125.0, 119.0, 124.0, Some(100)),
                bar("XLI", date!(2024 - 05 - 02), 124.0, 128.0, 121.0, 122.0, None),
                bar("XLI", date!(2024 - 05 - 03), 122.0, 123.0, 117.0, 118.0, Some(300)),
            ],
        )
        .expect("write");

    // When: The summary is requested
    let summary = warehouse.summary(&xli).expect("summary").expect("present");

    // Then: It reflects the stored history
    assert_eq!(summary.record_count, 3);
    assert_eq!(summary.first_date, date!(2024 - 05 - 01));
    assert_eq!(summary.last_date, date!(2024 - 05 - 03));
    assert_eq!(summary.latest_close, 118.0);
    assert_eq!(summary.highest_high, 128.0);
    assert_eq!(summary.lowest_low, 117.0);
    assert_eq!(summary.average_volume, Some(200.0));
    assert_eq!(warehouse.summary(&symbol("NONE")).expect("summary"), None);
}

// =============================================================================
// Aggregation from stored history
// =============================================================================

#[test]
fn when_user_requests_weekly_bars_then_the_example_week_collapses_to_one_bar() {
    // Given: Monday to Friday of one week in the warehouse
    let temp = tempdir().expect("tempdir");
    let warehouse = open_warehouse(temp.path());
    let vt = symbol("VT");
    let monday = date!(2024 - 06 - 10);
    let rows = [
        (10.0, 12.0, 9.0, 11.0, 100),
        (11.0, 13.0, 9.0, 9.0, 200),
        (9.0, 12.0, 8.0, 12.0, 150),
        (12.0, 14.0, 11.0, 13.0, 300),
        (13.0, 15.0, 12.0, 14.0, 250),
    ];
    let bars: Vec<Bar> = rows
        .iter()
        .enumerate()
        .map(|(day, (open, high, low, close, volume))| {
            let date = monday + Duration::days(day as i64);
            bar("VT", date, *open, *high, *low, *close, Some(*volume))
        })
        .collect();
    warehouse.upsert_many(&vt, &bars).expect("write");

    // When: Weekly bars are loaded
    let weekly = Aggregator::default()
        .load(&warehouse, &vt, AggregationPeriod::Weekly, None, None)
        .expect("weekly");

    // Then: One bar with first open, extreme high/low, last close, summed volume
    assert_eq!(weekly.len(), 1);
    let week = &weekly.bars()[0];
    assert_eq!((week.open, week.high, week.low, week.close), (10.0, 15.0, 8.0, 14.0));
    assert_eq!(week.volume, Some(1000));
    assert_eq!(week.date, date!(2024 - 06 - 14));
}

#[test]
fn when_history_ends_three_days_into_a_month_then_the_last_monthly_bar_uses_only_those_days() {
    // Given: All of May plus 1-3 July with a gap over June
    let temp = tempdir().expect("tempdir");
    let warehouse = open_warehouse(temp.path());
    let acwi = symbol("ACWI");
    let mut bars = daily_bars("ACWI", date!(2024 - 05 - 01), 31);
    bars.extend([
        bar("ACWI", date!(2024 - 07 - 01), 50.0, 52.0, 49.0, 51.0, Some(7)),
        bar("ACWI", date!(2024 - 07 - 02), 51.0, 55.0, 50.0, 54.0, Some(8)),
        bar("ACWI", date!(2024 - 07 - 03), 54.0, 54.5, 47.0, 48.0, None),
    ]);
    warehouse.upsert_many(&acwi, &bars).expect("write");

    // When: Monthly bars are loaded
    let monthly = Aggregator::default()
        .load(&warehouse, &acwi, AggregationPeriod::Monthly, None, None)
        .expect("monthly");

    // Then: May and a partial July, with no synthetic June
    assert_eq!(monthly.len(), 2);
    let july = &monthly.bars()[1];
    assert_eq!(july.date, date!(2024 - 07 - 03));
    assert_eq!((july.open, july.high, july.low, july.close), (50.0, 55.0, 47.0, 48.0));
    assert_eq!(july.volume, Some(15));
    assert_eq!(monthly.bars()[0].date, date!(2024 - 05 - 31));
}
