//! Genome-wide insertion/deletion catalogue
//!
//! Stages, all running inside one thread scope:
//! - a reader pushes every record without the unmapped flag onto a bounded
//!   queue (capacity = threads),
//! - `threads` workers pull records and extract their indels,
//! - two aggregators, each the only owner of its map, drain the insertion and
//!   deletion queues.
//!
//! The occurrence senders live in the workers, so both occurrence queues close
//! once the last worker has exited. The first error from any stage is recorded
//! and cancels the shared token; every stage checks it and unwinds, and the
//! scope joins them all before the error is returned.

use crate::alignment_record::AlignmentRecord;
use crate::error::SamError;
use crate::indels::{
    extract_indels, Deletion, DeletionMap, Insertion, InsertionMap, Occurrence, OccurrenceMap,
    DELETION_COLUMN, INSERTION_COLUMN,
};
use crate::sam::SamReader;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{debug, info, warn};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Configuration for the indel pipeline
#[derive(Debug, Clone)]
pub struct IndelConfig {
    /// Number of extraction workers, also the record queue capacity
    pub threads: NonZeroUsize,
    /// Minimum number of supporting queries for a row to be reported
    pub threshold: usize,
}

impl Default for IndelConfig {
    fn default() -> Self {
        Self {
            threads: NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN),
            threshold: 1,
        }
    }
}

/// Shared flag telling every stage to stop
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// The two finished tallies of a run
#[derive(Debug, Default)]
pub struct IndelMaps {
    pub insertions: InsertionMap,
    pub deletions: DeletionMap,
}

fn report_failure(token: &CancellationToken, errors: &Sender<SamError>, e: SamError) {
    // Only the first error is returned; later ones still end up here as stages unwind
    debug!("Stage failed: {}", e);
    let _ = errors.send(e);
    token.cancel();
}

fn read_records<F, I>(
    open: F,
    records: Sender<AlignmentRecord>,
    token: &CancellationToken,
    errors: &Sender<SamError>,
) where
    F: FnOnce() -> Result<I, SamError>,
    I: Iterator<Item = Result<AlignmentRecord, SamError>>,
{
    let source = match open() {
        Ok(source) => source,
        Err(e) => return report_failure(token, errors, e),
    };

    let mut queued = 0usize;
    let mut skipped = 0usize;
    for result in source {
        if token.is_cancelled() {
            debug!("Reader cancelled after {} records", queued);
            return;
        }
        let record = match result {
            Ok(record) => record,
            Err(e) => return report_failure(token, errors, e),
        };
        // Only the flag is checked here; a negative start still fails extraction
        if record.is_flagged_unmapped() {
            warn!("skipping unmapped read: {}", record.name);
            skipped += 1;
            continue;
        }
        // Fails only when every worker has gone away
        if records.send(record).is_err() {
            return;
        }
        queued += 1;
    }

    info!(
        "Read {} mapped records ({} unmapped skipped)",
        queued, skipped
    );
}

fn extract_worker(
    id: usize,
    records: Receiver<AlignmentRecord>,
    insertions: Sender<Insertion>,
    deletions: Sender<Deletion>,
    token: &CancellationToken,
    errors: &Sender<SamError>,
) {
    let mut processed = 0usize;
    for record in records.iter() {
        if token.is_cancelled() {
            break;
        }
        let indels = match extract_indels(&record) {
            Ok(indels) => indels,
            Err(e) => {
                report_failure(token, errors, e);
                break;
            }
        };
        let delivered = indels
            .insertions
            .into_iter()
            .all(|ins| insertions.send(ins).is_ok())
            && indels
                .deletions
                .into_iter()
                .all(|del| deletions.send(del).is_ok());
        if !delivered {
            break;
        }
        processed += 1;
    }
    debug!("Worker {} finished after {} records", id, processed);
}

fn aggregate_until_closed<O: Occurrence>(
    occurrences: Receiver<O>,
    token: &CancellationToken,
) -> OccurrenceMap<O::Key> {
    let mut map = OccurrenceMap::new();
    for occurrence in occurrences.iter() {
        if token.is_cancelled() {
            break;
        }
        map.insert_occurrence(occurrence);
    }
    map
}

/// Run the concurrent extraction over the records produced by `open`.
///
/// `open` is called on the reader thread, so the record source itself does not
/// need to be `Send`.
pub fn collect_indels<F, I>(open: F, threads: NonZeroUsize) -> Result<IndelMaps, SamError>
where
    F: FnOnce() -> Result<I, SamError> + Send,
    I: Iterator<Item = Result<AlignmentRecord, SamError>>,
{
    let threads = threads.get();
    let token = CancellationToken::default();

    let (record_tx, record_rx) = bounded::<AlignmentRecord>(threads);
    let (ins_tx, ins_rx) = unbounded::<Insertion>();
    let (del_tx, del_rx) = unbounded::<Deletion>();
    let (err_tx, err_rx) = unbounded::<SamError>();

    let maps = thread::scope(|scope| {
        let token = &token;
        let err_tx = &err_tx;

        scope.spawn(move || read_records(open, record_tx, token, err_tx));

        let workers: Vec<_> = (0..threads)
            .map(|id| {
                let record_rx = record_rx.clone();
                let ins_tx = ins_tx.clone();
                let del_tx = del_tx.clone();
                scope.spawn(move || extract_worker(id, record_rx, ins_tx, del_tx, token, err_tx))
            })
            .collect();
        drop(record_rx);
        drop(ins_tx);
        drop(del_tx);

        let insertion_aggregator = scope.spawn(move || aggregate_until_closed(ins_rx, token));
        let deletion_aggregator = scope.spawn(move || aggregate_until_closed(del_rx, token));

        for worker in workers {
            if let Err(panic) = worker.join() {
                token.cancel();
                std::panic::resume_unwind(panic);
            }
        }
        debug!("All {} workers finished", threads);

        let insertions = insertion_aggregator
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
        let deletions = deletion_aggregator
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic));

        IndelMaps {
            insertions,
            deletions,
        }
    });

    drop(err_tx);
    if let Ok(e) = err_rx.try_recv() {
        return Err(e);
    }
    Ok(maps)
}

/// Tally indels in `sam_file` and write the insertion and deletion reports
pub fn run_indels(
    sam_file: &str,
    insertions_out: &str,
    deletions_out: &str,
    config: &IndelConfig,
) -> Result<(), SamError> {
    info!(
        "Collecting indels from {} with {} workers",
        sam_file, config.threads
    );

    let maps = collect_indels(|| SamReader::from_path(sam_file), config.threads)?;

    info!(
        "Found {} insertion and {} deletion occurrences at {} and {} distinct sites",
        maps.insertions.total_occurrences(),
        maps.deletions.total_occurrences(),
        maps.insertions.len(),
        maps.deletions.len()
    );

    maps.insertions
        .write_report_file(insertions_out, INSERTION_COLUMN, config.threshold)?;
    maps.deletions
        .write_report_file(deletions_out, DELETION_COLUMN, config.threshold)?;

    info!("Wrote {} and {}", insertions_out, deletions_out);
    Ok(())
}

/// `run_indels` with one worker per available CPU
pub fn indels(
    sam_file: &str,
    insertions_out: &str,
    deletions_out: &str,
    threshold: usize,
) -> Result<(), SamError> {
    let config = IndelConfig {
        threshold,
        ..IndelConfig::default()
    };
    run_indels(sam_file, insertions_out, deletions_out, &config)
}
