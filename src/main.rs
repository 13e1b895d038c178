//! heapdb - concurrent insert/delete workload over a heap table

use anyhow::{bail, Context, Result};
use clap::Parser as ClapParser;
use heapdb::access::{DataType, Field, Schema, Tuple, Value};
use heapdb::catalog::TableId;
use heapdb::config::{ReplacementPolicy, StorageConfig};
use heapdb::database::Database;
use heapdb::storage::StorageResult;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Runs worker threads that insert and delete rows in one shared table,
/// retrying transactions the lock manager aborts.
#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Data directory
    #[arg(short = 'D', long, default_value = "./heapdb_data")]
    data_dir: PathBuf,

    /// Bytes per page
    #[arg(long, default_value = "4096")]
    page_size: usize,

    /// Buffer pool capacity in pages
    #[arg(short = 'p', long, default_value = "50")]
    pool_pages: usize,

    /// Number of worker threads
    #[arg(short, long, default_value = "4")]
    threads: usize,

    /// Transactions per worker
    #[arg(short, long, default_value = "200")]
    ops: usize,

    /// Page replacement policy (lru or fifo)
    #[arg(long, default_value = "lru")]
    policy: String,

    /// Give up on a lock after this many milliseconds
    #[arg(long)]
    lock_timeout_ms: Option<u64>,

    /// Seed for the workload's random choices
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Default)]
struct Stats {
    commits: AtomicU64,
    aborts: AtomicU64,
    inserted: AtomicU64,
    deleted: AtomicU64,
}

const MAX_ATTEMPTS: usize = 20;

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let policy: ReplacementPolicy = args.policy.parse().context("Invalid --policy")?;
    if args.threads == 0 {
        bail!("--threads must be at least 1");
    }
    let config = StorageConfig::default()
        .with_page_size(args.page_size)
        .with_pool_capacity(args.pool_pages)
        .with_replacement(policy)
        .with_lock_timeout(args.lock_timeout_ms.map(Duration::from_millis));

    let db = Arc::new(Database::open(&args.data_dir, config).context("Failed to open database")?);
    let schema = Schema::new(vec![
        Field::new("id", DataType::Int32),
        Field::new("worker", DataType::Int32),
        Field::new("label", DataType::Varchar),
    ]);
    let table_id = db
        .create_table("workload", schema)
        .context("Failed to create workload table")?;
    let rows_before = count_rows(&db, table_id)?;

    let stats = Arc::new(Stats::default());
    let started = Instant::now();

    let handles: Vec<_> = (0..args.threads)
        .map(|worker| {
            let db = Arc::clone(&db);
            let stats = Arc::clone(&stats);
            let ops = args.ops;
            let seed = args.seed.wrapping_add(worker as u64);
            thread::spawn(move || run_worker(&db, table_id, worker as i32, ops, seed, &stats))
        })
        .collect();

    for handle in handles {
        match handle.join() {
            Ok(result) => result?,
            Err(_) => bail!("worker thread panicked"),
        }
    }

    db.flush().context("Failed to flush buffer pool")?;
    let rows_after = count_rows(&db, table_id)?;

    let inserted = stats.inserted.load(Ordering::SeqCst);
    let deleted = stats.deleted.load(Ordering::SeqCst);
    println!("Workload finished in {:.2?}", started.elapsed());
    println!("   - Commits: {}", stats.commits.load(Ordering::SeqCst));
    println!("   - Aborts (retried): {}", stats.aborts.load(Ordering::SeqCst));
    println!("   - Rows inserted: {}", inserted);
    println!("   - Rows deleted: {}", deleted);
    println!("   - Rows in table: {} (was {})", rows_after, rows_before);
    println!(
        "   - Resident pages: {}/{}",
        db.buffer_pool().len(),
        db.buffer_pool().capacity()
    );

    let expected = rows_before as u64 + inserted - deleted;
    if rows_after as u64 != expected {
        bail!("row count mismatch: expected {}, found {}", expected, rows_after);
    }
    Ok(())
}

fn count_rows(db: &Database, table_id: TableId) -> Result<usize> {
    let txn = db.begin();
    let rows = txn.scan(table_id)?.collect::<StorageResult<Vec<_>>>()?;
    txn.commit()?;
    Ok(rows.len())
}

fn run_worker(
    db: &Database,
    table_id: TableId,
    worker: i32,
    ops: usize,
    seed: u64,
    stats: &Stats,
) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(seed);
    // Rows this worker inserted and committed, still present.
    let mut owned: Vec<Tuple> = Vec::new();
    let mut next_id = 0i32;

    for _ in 0..ops {
        let delete = !owned.is_empty() && rng.gen_bool(0.3);
        let victim = if delete {
            Some(rng.gen_range(0..owned.len()))
        } else {
            None
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let txn = db.begin();
            let outcome = match victim {
                Some(index) => txn.delete_tuple(&owned[index]).map(|()| None),
                None => {
                    let mut tuple = Tuple::new(vec![
                        Value::Int32(next_id),
                        Value::Int32(worker),
                        Value::String(format!("w{}-row{}", worker, next_id)),
                    ]);
                    txn.insert_tuple(table_id, &mut tuple).map(|_| Some(tuple))
                }
            };

            match outcome {
                Ok(inserted) => {
                    txn.commit()?;
                    stats.commits.fetch_add(1, Ordering::SeqCst);
                    match (inserted, victim) {
                        (Some(tuple), _) => {
                            debug!("worker {} inserted {:?}", worker, tuple.record_id());
                            owned.push(tuple);
                            next_id += 1;
                            stats.inserted.fetch_add(1, Ordering::SeqCst);
                        }
                        (None, Some(index)) => {
                            owned.swap_remove(index);
                            stats.deleted.fetch_add(1, Ordering::SeqCst);
                        }
                        (None, None) => {}
                    }
                    break;
                }
                Err(e) if e.is_abort() && attempt < MAX_ATTEMPTS => {
                    warn!("worker {} retrying after {}", worker, e);
                    txn.abort()?;
                    stats.aborts.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(rng.gen_range(1..=5) * attempt as u64));
                }
                Err(e) => {
                    txn.abort()?;
                    return Err(e).with_context(|| format!("worker {} failed", worker));
                }
            }
        }
    }

    info!("worker {} done, {} rows left", worker, owned.len());
    Ok(())
}
