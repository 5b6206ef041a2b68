//! Several workers bump one counter that lives inside a query-text document
//! in a memory-mapped file.
//!
//! The document is written once:
//!
//! ```text
//! name=page%20views&views=!!atomic { locked: false, value: 0000000000 }&by_worker={ locked: false, ... }
//! ```
//!
//! Each worker then maps the file on its own, reads the document like any
//! other, binds the embedded records and updates them in place. Run it a
//! second time with the same path and the counts keep growing, because the
//! records persist in the file.
//!
//! ```text
//! RUST_LOG=querywire=trace cargo run --example shared_counter -- /tmp/views.qw
//! ```
#![allow(missing_docs)]

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    thread,
};

use querywire::{
    Bytes, BytesStore, IntValue, LongArrayValues, QueryWire, QueryWireOptions, Result, ValueIn, ValueOut, Wire,
    WireError,
};
use tracing::info;

const CAPACITY: usize = 4096;
const WORKERS: usize = 4;
const VISITS: i32 = 10_000;

fn open(path: &Path) -> Result<Arc<BytesStore>> {
    Ok(Arc::new(BytesStore::map_file(path, CAPACITY)?))
}

/// Writes the document unless the file already holds one, and returns its
/// length.
fn prepare(path: &Path) -> Result<usize> {
    let store = open(path)?;
    let existing = Bytes::readable(Arc::clone(&store), CAPACITY)?;
    if existing.peek_str_ignore_case("name=") {
        let text = existing.to_string();
        let len = text.trim_end_matches('\0').len();
        info!(len, "reusing existing document");
        return Ok(len);
    }

    let mut wire = QueryWire::wrap(Bytes::wrap(store), QueryWireOptions::default());
    wire.write("name").text(Some("page views"))?;
    wire.write("views").int32_for_binding(0)?;
    wire.write("by_worker").int64_array_for_binding(WORKERS)?;
    wire.bytes().store().flush()?;
    info!(document = %wire, "wrote document");
    Ok(wire.bytes().write_position())
}

fn worker(path: &Path, len: usize, id: usize) -> Result<()> {
    let mut wire = QueryWire::wrap(Bytes::readable(open(path)?, len)?, QueryWireOptions::default());
    let name = wire.read("name")?.text()?.unwrap_or_default();

    let (mut views, mut by_worker) = (None, None);
    wire.read("views")?.bound_int32(&mut views)?;
    wire.read("by_worker")?.bound_int64_array(&mut by_worker)?;
    let (Some(views), Some(by_worker)) = (views, by_worker) else {
        return Err(WireError::IllegalState("references were not bound".into()));
    };

    for _ in 0..VISITS {
        views.add_and_get(1)?;
        by_worker.add_at(id, 1)?;
    }
    info!(id, %name, total = views.get()?, "worker done");
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("shared_counter=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let path: PathBuf = std::env::args_os()
        .nth(1)
        .map_or_else(|| std::env::temp_dir().join("querywire-shared-counter.qw"), PathBuf::from);
    let len = prepare(&path)?;

    thread::scope(|scope| {
        let handles: Vec<_> = (0..WORKERS)
            .map(|id| {
                let path = path.as_path();
                scope.spawn(move || worker(path, len, id))
            })
            .collect();
        handles
            .into_iter()
            .try_for_each(|handle| handle.join().unwrap_or_else(|_| panic!("worker panicked")))
    })?;

    let mut wire = QueryWire::wrap(Bytes::readable(open(&path)?, len)?, QueryWireOptions::default());
    wire.read("name")?.text()?;
    let mut views = None;
    wire.read("views")?.bound_int32(&mut views)?;
    if let Some(views) = views {
        println!("{} views recorded in {}", views.get()?, path.display());
    }
    println!("{wire}");
    Ok(())
}
