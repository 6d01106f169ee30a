use chrono::{DateTime, TimeZone, Utc};
use criterion::{Criterion, criterion_group, criterion_main};
use lazy_static::lazy_static;
use laptime_sync::logic::merger::{collapse_rows, plan_merge};
use laptime_sync::{EventBus, LapRecord, MemoryStore, PairKey, ResultMerger, ScrapedRow, Store, TrackedPair};
use std::sync::Arc;

const PAIR: PairKey = PairKey { track_id: 12, vehicle_id: 3 };

lazy_static! {
    static ref UPLOADED: DateTime<Utc> = Utc.with_ymd_and_hms(2023, 6, 1, 18, 30, 0).unwrap();
    // Ten pages worth of rows, every player appearing twice
    static ref ROWS: Vec<ScrapedRow> = (0..2000u32)
        .map(|i| ScrapedRow {
            player_id: format!("player{}", i % 1000),
            player_name: format!("Player {}", i % 1000),
            lap_time_ms: 60_000 + (i * 37) % 20_000,
            sectors_ms: [20_000, 20_000, 20_000],
            controller: Some("wheel".to_string()),
            upload_date: *UPLOADED,
        })
        .collect();
    // Half the players already have a slower stored record
    static ref STORED: Vec<LapRecord> = ROWS
        .iter()
        .take(500)
        .map(|row| LapRecord {
            lap_time_ms: row.lap_time_ms + 500,
            ..LapRecord::from_row(PAIR, row)
        })
        .collect();
}

async fn merge_into_fresh_store() -> eyre::Result<()> {
    let store = Arc::new(MemoryStore::new());
    store.insert_pair(TrackedPair::scheduled(PAIR, 168)).await;
    for record in STORED.iter() {
        store.upsert_record(record.clone()).await?;
    }
    let merger = ResultMerger::new(store, EventBus::new());
    merger.merge(PAIR, &ROWS).await?;
    Ok(())
}

fn benchmark_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");
    group.sample_size(20);

    group.bench_function("collapse_rows", |b| b.iter(|| collapse_rows(&ROWS).len()));
    group.bench_function("plan_merge", |b| b.iter(|| plan_merge(PAIR, &STORED, &ROWS).len()));

    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    group.bench_function("merge_memory_store", |b| {
        b.to_async(&runtime).iter(|| async { merge_into_fresh_store().await.expect("merge") })
    });
    group.finish();
}

criterion_group!(benches, benchmark_merge);
criterion_main!(benches);
