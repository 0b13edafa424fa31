use crate::alignment_record::AlignmentRecord;
use crate::consensus::{consensus_for_query, Normalization};
use crate::error::SamError;
use crate::output::OutputFile;
use crate::partition::QueryBlocks;
use crate::sam::SamReader;
use log::{debug, info};
use rayon::prelude::*;
use std::io::Write;

/// Configuration for per-query reconstruction
#[derive(Debug, Clone)]
pub struct ConsensusConfig {
    /// Use this length for every reference instead of the header's
    pub reference_length: Option<usize>,
    /// How leftover placeholders are resolved; `None` keeps them as `*`
    pub normalization: Option<Normalization>,
    /// Queries resolved together in one parallel batch
    pub batch_size: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            reference_length: None,
            normalization: Some(Normalization::Unknown),
            batch_size: 1024,
        }
    }
}

/// The flattened, reference-length sequence of one query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryConsensus {
    pub name: String,
    pub sequence: Vec<u8>,
}

/// Group `records` by query, build one consensus per query and hand them to
/// `sink` in input order. Returns the number of queries emitted.
pub fn for_each_consensus<I, L, S>(
    records: I,
    reference_length: L,
    config: &ConsensusConfig,
    mut sink: S,
) -> Result<usize, SamError>
where
    I: Iterator<Item = Result<AlignmentRecord, SamError>>,
    L: Fn(&AlignmentRecord) -> Result<usize, SamError> + Sync,
    S: FnMut(QueryConsensus) -> Result<(), SamError>,
{
    let mut blocks = QueryBlocks::new(records);
    let batch_size = config.batch_size.max(1);
    let mut emitted = 0usize;

    loop {
        let batch: Vec<Vec<AlignmentRecord>> = blocks
            .by_ref()
            .take(batch_size)
            .collect::<Result<_, _>>()?;
        if batch.is_empty() {
            break;
        }

        let resolved: Vec<Result<QueryConsensus, SamError>> = batch
            .par_iter()
            .map(|group| {
                let mut sequence = consensus_for_query(group, &reference_length)?;
                if let Some(normalization) = config.normalization {
                    normalization.apply(&mut sequence);
                }
                Ok(QueryConsensus {
                    name: group.first().map(|r| r.name.clone()).unwrap_or_default(),
                    sequence,
                })
            })
            .collect();

        for consensus in resolved {
            sink(consensus?)?;
            emitted += 1;
        }
        debug!("Resolved {} queries so far", emitted);
    }

    Ok(emitted)
}

/// Resolve a record's reference length from the override or the header lengths
fn header_reference_length<'a>(
    lengths: &'a [usize],
    fixed: Option<usize>,
) -> impl Fn(&AlignmentRecord) -> Result<usize, SamError> + Sync + 'a {
    move |record| {
        if let Some(length) = fixed {
            return Ok(length);
        }
        usize::try_from(record.reference_id)
            .ok()
            .and_then(|id| lengths.get(id).copied())
            .ok_or_else(|| {
                SamError::UnknownReference(format!(
                    "read '{}' refers to reference id {} which the header does not declare",
                    record.name, record.reference_id
                ))
            })
    }
}

/// Reconstruct every query of `sam_file` against a reference of the given length.
/// Placeholders are kept as `*`.
pub fn reconstruct(sam_file: &str, reference_length: usize) -> Result<Vec<QueryConsensus>, SamError> {
    let config = ConsensusConfig {
        reference_length: Some(reference_length),
        normalization: None,
        ..ConsensusConfig::default()
    };
    let reader = SamReader::from_path(sam_file)?;
    let mut sequences = Vec::new();
    for_each_consensus(
        reader,
        header_reference_length(&[], config.reference_length),
        &config,
        |consensus| {
            sequences.push(consensus);
            Ok(())
        },
    )?;
    Ok(sequences)
}

/// Write one FASTA record per query of `sam_file` to `output` (`-` for stdout)
pub fn run_consensus(
    sam_file: &str,
    output: &str,
    config: &ConsensusConfig,
) -> Result<(), SamError> {
    info!("Reconstructing queries from {}", sam_file);

    let reader = SamReader::from_path(sam_file)?;
    let lengths = reader.reference_lengths().to_vec();
    if config.reference_length.is_none() && lengths.is_empty() {
        return Err(SamError::UnknownReference(format!(
            "'{}' declares no reference sequences; pass a reference length",
            sam_file
        )));
    }

    let mut out = OutputFile::create(output)?;
    let count = for_each_consensus(
        reader,
        header_reference_length(&lengths, config.reference_length),
        config,
        |consensus| write_fasta_record(&mut out, &consensus, output),
    )?;
    out.finish()?;

    info!("Wrote {} sequences to {}", count, output);
    Ok(())
}

fn write_fasta_record<W: Write>(
    writer: &mut W,
    consensus: &QueryConsensus,
    output: &str,
) -> Result<(), SamError> {
    writeln!(writer, ">{}", consensus.name)
        .and_then(|_| writer.write_all(&consensus.sequence))
        .and_then(|_| writeln!(writer))
        .map_err(|e| SamError::SinkUnavailable(format!("Failed to write '{}': {}", output, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, start: i64, seq: &str, cigar: &str) -> Result<AlignmentRecord, SamError> {
        AlignmentRecord::from_text(name, start, seq, cigar)
    }

    fn collect(
        records: Vec<Result<AlignmentRecord, SamError>>,
        config: &ConsensusConfig,
    ) -> Result<Vec<QueryConsensus>, SamError> {
        let mut out = Vec::new();
        for_each_consensus(records.into_iter(), |_| Ok(8), config, |c| {
            out.push(c);
            Ok(())
        })?;
        Ok(out)
    }

    #[test]
    fn test_one_consensus_per_query_in_order() {
        let records = vec![
            record("q1", 0, "ACGT", "4M"),
            record("q1", 4, "ACGT", "4M"),
            record("q2", 2, "TTT", "3M"),
            record("q3", 1, "GA", "1M1D1M"),
        ];
        let config = ConsensusConfig {
            normalization: None,
            batch_size: 2,
            ..ConsensusConfig::default()
        };

        let out = collect(records, &config).unwrap();
        let names: Vec<&str> = out.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["q1", "q2", "q3"]);
        assert_eq!(out[0].sequence, b"ACGTACGT");
        assert_eq!(out[1].sequence, b"**TTT***");
        assert_eq!(out[2].sequence, b"*G-A****");
    }

    #[test]
    fn test_normalization_is_applied() {
        let records = vec![record("q1", 2, "AC", "1M1N1M")];

        let unknown = collect(records.clone(), &ConsensusConfig::default()).unwrap();
        assert_eq!(unknown[0].sequence, b"NNA-CNNN");

        let config = ConsensusConfig {
            normalization: Some(Normalization::Boundary),
            ..ConsensusConfig::default()
        };
        let boundary = collect(records, &config).unwrap();
        assert_eq!(boundary[0].sequence, b"--A-C---");
    }

    #[test]
    fn test_unplaced_record_fails() {
        let records = vec![record("q1", 0, "ACGT", "4M"), record("q2", -1, "ACGT", "4M")];
        assert_eq!(
            collect(records, &ConsensusConfig::default()),
            Err(SamError::UnmappedRead("q2".to_string()))
        );
    }

    #[test]
    fn test_header_reference_length() {
        let lengths = [100, 250];
        let resolve = header_reference_length(&lengths, None);
        let on_second = AlignmentRecord::from_text("q", 0, "A", "1M")
            .unwrap()
            .with_reference_id(1);
        assert_eq!(resolve(&on_second), Ok(250));

        let unknown = on_second.clone().with_reference_id(5);
        assert!(matches!(resolve(&unknown), Err(SamError::UnknownReference(_))));

        let fixed = header_reference_length(&lengths, Some(42));
        assert_eq!(fixed(&unknown), Ok(42));
    }

    #[test]
    fn test_write_fasta_record() {
        let mut buf = Vec::new();
        let consensus = QueryConsensus {
            name: "q1".to_string(),
            sequence: b"NNACNN".to_vec(),
        };
        write_fasta_record(&mut buf, &consensus, "buffer").unwrap();
        assert_eq!(buf, b">q1\nNNACNN\n");
    }
}
