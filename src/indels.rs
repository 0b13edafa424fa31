//! Insertion and deletion tallies across reads
//!
//! Each record is walked once; every `I` operation yields an insertion at the
//! current reference position carrying the inserted bases, and every `D`
//! operation a deletion carrying its length. Occurrences are folded into maps
//! keyed by reference start and allele, listing the queries that support them.

use crate::alignment_record::AlignmentRecord;
use crate::cigar::{apply, query_slice, Cursor, OperatorKind};
use crate::error::SamError;
use crate::output::OutputFile;
use rustc_hash::FxHashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::io::{self, Write};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insertion {
    pub query: String,
    pub reference_start: usize,
    pub sequence: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deletion {
    pub query: String,
    pub reference_start: usize,
    pub length: usize,
}

/// Something that can be filed under `(reference_start, key)`
pub trait Occurrence {
    type Key: Eq + Hash + Ord + Display;

    fn into_entry(self) -> (usize, Self::Key, String);
}

impl Occurrence for Insertion {
    type Key = String;

    fn into_entry(self) -> (usize, String, String) {
        (self.reference_start, self.sequence, self.query)
    }
}

impl Occurrence for Deletion {
    type Key = usize;

    fn into_entry(self) -> (usize, usize, String) {
        (self.reference_start, self.length, self.query)
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecordIndels {
    pub insertions: Vec<Insertion>,
    pub deletions: Vec<Deletion>,
}

/// Walk one record's CIGAR and collect its insertions and deletions
pub fn extract_indels(record: &AlignmentRecord) -> Result<RecordIndels, SamError> {
    let mut cursor = Cursor::new(record.mapped_start()?);
    let mut indels = RecordIndels::default();

    for op in &record.cigar {
        match op.kind() {
            OperatorKind::Insertion => {
                let inserted = query_slice(&record.sequence, cursor.query, op.len())?;
                indels.insertions.push(Insertion {
                    query: record.name.clone(),
                    reference_start: cursor.reference,
                    sequence: String::from_utf8_lossy(inserted).into_owned(),
                });
            }
            OperatorKind::Deletion => indels.deletions.push(Deletion {
                query: record.name.clone(),
                reference_start: cursor.reference,
                length: op.len(),
            }),
            _ => {}
        }
        let (next, _) = apply(op, cursor, &record.sequence)?;
        cursor = next;
    }

    Ok(indels)
}

/// reference start -> allele -> supporting queries, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub struct OccurrenceMap<K: Eq + Hash> {
    sites: FxHashMap<usize, FxHashMap<K, Vec<String>>>,
}

pub type InsertionMap = OccurrenceMap<String>;
pub type DeletionMap = OccurrenceMap<usize>;

impl<K: Eq + Hash> Default for OccurrenceMap<K> {
    fn default() -> Self {
        Self {
            sites: FxHashMap::default(),
        }
    }
}

impl<K> OccurrenceMap<K>
where
    K: Eq + Hash + Ord + Display,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a query to the list at `(reference_start, key)`. Repeats are kept.
    pub fn add(&mut self, reference_start: usize, key: K, query: String) {
        self.sites
            .entry(reference_start)
            .or_default()
            .entry(key)
            .or_default()
            .push(query);
    }

    pub fn insert_occurrence<O: Occurrence<Key = K>>(&mut self, occurrence: O) {
        let (reference_start, key, query) = occurrence.into_entry();
        self.add(reference_start, key, query);
    }

    pub fn get(&self, reference_start: usize, key: &K) -> Option<&[String]> {
        self.sites
            .get(&reference_start)
            .and_then(|alleles| alleles.get(key))
            .map(Vec::as_slice)
    }

    /// Number of distinct `(reference_start, key)` entries
    pub fn len(&self) -> usize {
        self.sites.values().map(|alleles| alleles.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Number of occurrences folded in, across all entries
    pub fn total_occurrences(&self) -> usize {
        self.sites
            .values()
            .flat_map(|alleles| alleles.values())
            .map(Vec::len)
            .sum()
    }

    /// Entries supported by at least `threshold` queries, sorted by reference
    /// start and then by key
    pub fn rows(&self, threshold: usize) -> Vec<(usize, &K, &[String])> {
        let mut starts: Vec<&usize> = self.sites.keys().collect();
        starts.sort_unstable();

        let mut rows = Vec::new();
        for start in starts {
            let mut alleles: Vec<(&K, &Vec<String>)> = self.sites[start].iter().collect();
            alleles.sort_unstable_by(|a, b| a.0.cmp(b.0));
            rows.extend(
                alleles
                    .into_iter()
                    .filter(|(_, queries)| queries.len() >= threshold)
                    .map(|(key, queries)| (*start, key, queries.as_slice())),
            );
        }
        rows
    }

    /// Write the table: a header, then `start+1 <tab> key <tab> q1|q2|...` per row.
    /// Coordinates are written 1-based.
    pub fn write_report<W: Write>(
        &self,
        mut writer: W,
        key_column: &str,
        threshold: usize,
    ) -> io::Result<()> {
        writeln!(writer, "ref_start\t{}\tsamples", key_column)?;
        for (start, key, queries) in self.rows(threshold) {
            writeln!(writer, "{}\t{}\t{}", start + 1, key, queries.join("|"))?;
        }
        writer.flush()
    }

    pub fn write_report_file(
        &self,
        path: &str,
        key_column: &str,
        threshold: usize,
    ) -> Result<(), SamError> {
        let mut out = OutputFile::create(path)?;
        self.write_report(&mut out, key_column, threshold)
            .map_err(|e| SamError::SinkUnavailable(format!("Failed to write '{}': {}", path, e)))?;
        out.finish()
    }
}

/// Fold a stream of occurrences into a map
pub fn aggregate<O, I>(occurrences: I) -> OccurrenceMap<O::Key>
where
    O: Occurrence,
    I: IntoIterator<Item = O>,
{
    let mut map = OccurrenceMap::new();
    for occurrence in occurrences {
        map.insert_occurrence(occurrence);
    }
    map
}

pub const INSERTION_COLUMN: &str = "insertion";
pub const DELETION_COLUMN: &str = "length";
