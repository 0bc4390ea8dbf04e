//! # CLI - LevelKV Interactive Shell
//!
//! A REPL-style command-line interface for the LevelKV storage engine.
//! Reads commands from stdin, executes them against the engine, and prints
//! results to stdout. Logs go to stderr, so output can be piped and checked
//! by scripts.
//!
//! ## Commands
//!
//! ```text
//! PUT key value      Insert or update a key (SET is accepted too)
//! GET key            Look up a key (prints value or "(nil)")
//! DEL key            Delete a key (writes a tombstone)
//! SCAN [from]        Every live key >= from
//! RANGE from to      Live keys in [from, to)
//! FLUSH              Write the memtable to disk and wait for it
//! COMPACT            Run a compaction pass
//! STATS              Print engine counters
//! EXIT / QUIT        Flush and shut down
//! ```
//!
//! ## Configuration
//!
//! Settings are read by [`EngineConfig::from_env`]:
//!
//! ```text
//! LEVELKV_DATA_DIR              data directory            (default: "data")
//! LEVELKV_FLUSH_KB              flush threshold in KiB    (default: 4096)
//! LEVELKV_FLUSHER_THREADS       flush worker count        (default: 8)
//! LEVELKV_COMPACTION            "flat" | "leveled"        (default: "leveled")
//! LEVELKV_COMPACTION_KB         level-0 compaction trigger (default: 16384)
//! LEVELKV_TABLE_KB              target table size in KiB  (default: 4096)
//! LEVELKV_COMPACTION_PERIOD_MS  compactor wake-up period  (default: 1000)
//! RUST_LOG                      log filter                (default: "info")
//! ```
//!
//! ## Example
//!
//! ```text
//! $ cargo run -p cli
//! LevelKV started (dir=data, compaction=Leveled, flush=4096KiB, tables=0)
//! > PUT name Alice
//! OK
//! > GET name
//! Alice
//! > SCAN
//! name -> Alice
//! (1 entries)
//! > EXIT
//! bye
//! ```

use anyhow::Result;
use bytes::Bytes;
use config::EngineConfig;
use engine::Engine;
use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;

fn print_pairs(pairs: impl Iterator<Item = (Bytes, Bytes)>) {
    let mut count = 0usize;
    for (k, v) in pairs {
        println!(
            "{} -> {}",
            String::from_utf8_lossy(&k),
            String::from_utf8_lossy(&v)
        );
        count += 1;
    }
    if count == 0 {
        println!("(empty)");
    } else {
        println!("({} entries)", count);
    }
}

fn print_stats(engine: &Engine) {
    println!("data_dir:        {}", engine.data_dir().display());
    println!("compaction:      {:?}", engine.config().compaction);
    println!("memtable_size:   {}", engine.memtable_size());
    println!("memtable_count:  {}", engine.memtable_count());
    println!("pending_flushes: {}", engine.pending_flushes());
    println!("disk_size:       {}", engine.disk_size());
    println!("disk_count:      {}", engine.disk_count());
    println!("table_count:     {}", engine.table_count());
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let config = EngineConfig::from_env();
    let flush_kb = config.flush_threshold_bytes / 1024;
    let engine = Engine::open(config)?;

    println!(
        "LevelKV started (dir={}, compaction={:?}, flush={}KiB, tables={})",
        engine.data_dir().display(),
        engine.config().compaction,
        flush_kb,
        engine.table_count()
    );
    println!("Commands: PUT key value | GET key | DEL key | SCAN [from] | RANGE from to");
    println!("          FLUSH | COMPACT | STATS | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                "PUT" | "SET" => {
                    if let Some(k) = parts.next() {
                        let v: String = parts.collect::<Vec<&str>>().join(" ");
                        if v.is_empty() {
                            println!("ERR usage: PUT key value");
                        } else {
                            match engine.upsert(k.to_string(), v) {
                                Ok(()) => println!("OK"),
                                Err(e) => println!("ERR put failed: {}", e),
                            }
                        }
                    } else {
                        println!("ERR usage: PUT key value");
                    }
                }
                "GET" => {
                    if let Some(k) = parts.next() {
                        match engine.get(k.as_bytes()) {
                            Some(v) => println!("{}", String::from_utf8_lossy(&v)),
                            None => println!("(nil)"),
                        }
                    } else {
                        println!("ERR usage: GET key");
                    }
                }
                "DEL" => {
                    if let Some(k) = parts.next() {
                        match engine.remove(k.to_string()) {
                            Ok(()) => println!("OK"),
                            Err(e) => println!("ERR del failed: {}", e),
                        }
                    } else {
                        println!("ERR usage: DEL key");
                    }
                }
                "SCAN" => {
                    let from = parts.next().unwrap_or("");
                    print_pairs(engine.iter(from.as_bytes()));
                }
                "RANGE" => match (parts.next(), parts.next()) {
                    (Some(from), Some(to)) => {
                        print_pairs(engine.range(from.as_bytes(), to.as_bytes()))
                    }
                    _ => println!("ERR usage: RANGE from to"),
                },
                "FLUSH" => match engine.flush() {
                    Ok(()) => println!("OK (tables={})", engine.table_count()),
                    Err(e) => println!("ERR flush failed: {}", e),
                },
                "COMPACT" => match engine.compact() {
                    Ok(()) => println!(
                        "OK (tables={}, bytes={})",
                        engine.table_count(),
                        engine.disk_size()
                    ),
                    Err(e) => println!("ERR compact failed: {:#}", e),
                },
                "STATS" => print_stats(&engine),
                "EXIT" | "QUIT" => {
                    println!("bye");
                    break;
                }
                other => {
                    println!("unknown command: {}", other);
                }
            }
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    engine.close()
}
