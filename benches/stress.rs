use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ulid::Ulid;

use bookable::model::*;
use bookable::tenant::TenantManager;

const HOUR: Ms = 3_600_000;

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies.last().unwrap().as_secs_f64() * 1000.0,
    );
}

fn bench_data_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("bookable_bench_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Seed one service + one fully open staff calendar, return (service, staff).
async fn seed_shop(shop: &bookable::engine::Engine) -> (Ulid, Ulid) {
    let service = Ulid::new();
    shop.create_service(service, "Haircut".into(), 30).await.unwrap();
    let staff = Ulid::new();
    shop.create_staff(staff, "bench@example.com".into()).await.unwrap();
    for weekday in 0..7u8 {
        shop.add_window(Ulid::new(), staff, weekday, 0, 1440).await.unwrap();
    }
    (service, staff)
}

async fn phase1_sequential_writes(tm: &TenantManager) {
    let shop = tm.get_or_create("phase1").unwrap();
    let (service, staff) = seed_shop(&shop).await;

    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let s = i as Ms * HOUR;
        let t = Instant::now();
        shop.create_booking(Ulid::new(), staff, service, Span::new(s, s + HOUR), None)
            .await
            .unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("write latency", &mut latencies);
}

async fn phase2_concurrent_writes(tm: Arc<TenantManager>) {
    let n_tasks = 10;
    let n_per_task = 200;

    let shop = tm.get_or_create("phase2").unwrap();
    let service = Ulid::new();
    shop.create_service(service, "Haircut".into(), 30).await.unwrap();

    let start = Instant::now();
    let mut handles = Vec::new();

    // One staff calendar per task: contention on the WAL, not the locks
    for _ in 0..n_tasks {
        let shop = shop.clone();
        handles.push(tokio::spawn(async move {
            let staff = Ulid::new();
            shop.create_staff(staff, "bench@example.com".into()).await.unwrap();
            for j in 0..n_per_task {
                let s = j as Ms * HOUR;
                shop.create_booking(Ulid::new(), staff, service, Span::new(s, s + HOUR), None)
                    .await
                    .unwrap();
            }
        }));
    }

    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} tasks x {n_per_task} bookings = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

async fn phase3_resolution_under_load(tm: Arc<TenantManager>) {
    let shop = tm.get_or_create("phase3").unwrap();
    let (service, staff) = seed_shop(&shop).await;

    // Pre-fill a dense calendar
    let day0 = day_start_ms(bookable::engine::parse_date("2025-03-03").unwrap());
    for i in 0..200 {
        let s = day0 + i as Ms * 2 * HOUR;
        shop.create_booking(Ulid::new(), staff, service, Span::new(s, s + HOUR), None)
            .await
            .unwrap();
    }

    // Writers keep booking far-future slots in the background
    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for w in 0..5i64 {
        let shop = shop.clone();
        let stop = stop.clone();
        writer_handles.push(tokio::spawn(async move {
            let staff = Ulid::new();
            shop.create_staff(staff, "writer@example.com".into()).await.unwrap();
            let mut i = 0i64;
            while !stop.load(std::sync::atomic::Ordering::Relaxed) {
                let s = (w * 100_000 + i) * HOUR;
                let _ = shop
                    .create_booking(Ulid::new(), staff, service, Span::new(s, s + HOUR), None)
                    .await;
                i += 1;
            }
        }));
    }

    // Readers resolve slots across a week and measure latency
    let n_readers = 10usize;
    let reads_per_reader = 500usize;
    let dates = [
        "2025-03-02", "2025-03-03", "2025-03-04", "2025-03-05", "2025-03-06", "2025-03-07",
        "2025-03-08",
    ];
    let mut reader_handles = Vec::new();
    for r in 0..n_readers {
        let shop = shop.clone();
        reader_handles.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for i in 0..reads_per_reader {
                let date = dates[(r + i) % dates.len()];
                let t = Instant::now();
                let slots = shop.resolve_slots_on(service, date, None).await.unwrap();
                assert!(!slots.is_empty());
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for h in reader_handles {
        all_latencies.extend(h.await.unwrap());
    }

    stop.store(true, std::sync::atomic::Ordering::Relaxed);
    for h in writer_handles {
        let _ = h.await;
    }

    print_latency("slot resolution", &mut all_latencies);
}

async fn phase4_tenant_storm(tm: Arc<TenantManager>) {
    let n_tenants = 50;
    let ops_per_tenant = 10;

    let start = Instant::now();
    let mut handles = Vec::new();

    for t in 0..n_tenants {
        let tm = tm.clone();
        handles.push(tokio::spawn(async move {
            let shop = tm.get_or_create(&format!("storm_{t}")).unwrap();
            let (service, staff) = seed_shop(&shop).await;
            for i in 0..ops_per_tenant {
                let s = i as Ms * HOUR;
                shop.create_booking(Ulid::new(), staff, service, Span::new(s, s + HOUR), None)
                    .await
                    .unwrap();
            }
        }));
    }

    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    println!(
        "  {n_tenants} tenants x {ops_per_tenant} bookings in {:.2}s",
        elapsed.as_secs_f64()
    );
}

#[tokio::main]
async fn main() {
    let metrics_port: Option<u16> = std::env::var("BOOKABLE_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    bookable::observability::init(metrics_port);

    let data_dir = bench_data_dir();
    println!("=== bookable stress benchmark ===");
    println!("data dir: {}\n", data_dir.display());

    let tm = Arc::new(TenantManager::new(data_dir.clone(), u64::MAX));

    println!("[phase 1] sequential write throughput");
    phase1_sequential_writes(&tm).await;

    println!("\n[phase 2] concurrent write throughput");
    phase2_concurrent_writes(tm.clone()).await;

    println!("\n[phase 3] resolution latency under write load");
    phase3_resolution_under_load(tm.clone()).await;

    println!("\n[phase 4] tenant storm");
    phase4_tenant_storm(tm.clone()).await;

    let _ = std::fs::remove_dir_all(&data_dir);
    println!("\n=== benchmark complete ===");
}
