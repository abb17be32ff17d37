//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `sillage_core` linkage end to end: open a store, initialize a
//!   session and print a short summary.
//!
//! Usage: `sillage_cli [DB_PATH]`. Without a path the store lives in memory.

use sillage_core::{
    EngineConfig, LayeringService, ProtocolFilter, ServiceError, SortKey, SqliteKvStore,
};
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("sillage_core ping={}", sillage_core::ping());
    println!("sillage_core version={}", sillage_core::core_version());

    match run(std::env::args().nth(1)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(db_path: Option<String>) -> Result<(), ServiceError> {
    let kv = match db_path.as_deref() {
        Some(path) => SqliteKvStore::open(path)?,
        None => SqliteKvStore::open_in_memory()?,
    };
    let mut service = LayeringService::with_builtin_catalog(kv, EngineConfig::default())?;

    let init = service.initialize(false)?;
    println!(
        "protocols={} items={} first_run={}",
        init.protocol_count, init.item_count, init.is_first_run
    );

    let filter = ProtocolFilter {
        sort: Some(SortKey::Savings),
        ..ProtocolFilter::default()
    };
    let page = service.paginate(1, 3, &filter)?;
    for protocol in &page.data {
        let analysis = protocol.cost_analysis();
        println!(
            "{} {} tier={:?} compatibility={} savings={} ({}%)",
            protocol.id(),
            protocol.name(),
            protocol.compatibility().tier,
            protocol.compatibility().score,
            analysis.savings,
            analysis.savings_percent
        );
    }

    let stats = service.stats()?;
    println!(
        "active={} alpha={} mean_compatibility={} storage_kb={}",
        stats.protocols.active,
        stats.protocols.alpha,
        stats.mean_compatibility,
        stats.storage.total_kb
    );
    Ok(())
}

