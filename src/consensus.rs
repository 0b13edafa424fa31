//! Reference-coordinate reconstruction of reads
//!
//! A record is expanded into a sequence exactly as long as its reference:
//! `*` where the read says nothing, `-` over deletions and skips, and the
//! read's bases elsewhere. Inserted bases are dropped from this view. When a
//! query has several records (secondary/supplementary mappings) their expanded
//! sequences are flattened column by column into a single consensus.

use crate::alignment_record::AlignmentRecord;
use crate::cigar::{apply, Cursor};
use crate::error::SamError;

/// Placeholder for a reference position the read has not covered
pub const PLACEHOLDER: u8 = b'*';
pub const GAP: u8 = b'-';
pub const UNKNOWN: u8 = b'N';

/// How leftover placeholders are resolved once a query's consensus is built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Normalization {
    /// Every placeholder becomes `N`
    #[default]
    Unknown,
    /// Placeholders outside the mapped extent become `-`, those inside become `N`
    Boundary,
}

impl Normalization {
    pub fn apply(self, seq: &mut [u8]) {
        match self {
            Normalization::Unknown => fill_unknown(seq),
            Normalization::Boundary => fill_boundaries(seq),
        }
    }
}

/// Expand one record into a sequence of length `reference_length`
pub fn expand_record(
    record: &AlignmentRecord,
    reference_length: usize,
) -> Result<Vec<u8>, SamError> {
    let start = record.mapped_start()?;
    if start > reference_length {
        return Err(SamError::MalformedOperatorSequence(format!(
            "read '{}' starts at {} beyond the reference length {}",
            record.name, start, reference_length
        )));
    }

    let mut expanded = Vec::with_capacity(reference_length);
    expanded.resize(start, PLACEHOLDER);

    let mut cursor = Cursor::new(start);
    for op in &record.cigar {
        let (next, emission) = apply(op, cursor, &record.sequence)?;
        emission.extend_into(&mut expanded);
        cursor = next;
    }

    if expanded.len() > reference_length {
        return Err(SamError::MalformedOperatorSequence(format!(
            "read '{}' extends to {} past the reference length {}",
            record.name,
            expanded.len(),
            reference_length
        )));
    }
    expanded.resize(reference_length, PLACEHOLDER);

    Ok(expanded)
}

/// Collapse one alignment column to a single byte.
///
/// Duplicated values count once. More than one distinct letter means the
/// mappings disagree and the column is `N`. Otherwise the largest byte wins,
/// so a base beats `-` and `*`, and `-` beats `*`.
pub fn resolve_site(site: &[u8]) -> u8 {
    let mut seen = [false; 256];
    let mut letters = 0;
    let mut max = 0u8;

    for &b in site {
        if seen[b as usize] {
            continue;
        }
        seen[b as usize] = true;
        if b.is_ascii_alphabetic() {
            letters += 1;
        }
        max = max.max(b);
    }

    if letters > 1 {
        UNKNOWN
    } else {
        max
    }
}

/// Flatten the expanded sequences of one query into a single sequence.
/// A single member is returned as is; members of differing lengths are rejected.
pub fn resolve_block(mut block: Vec<Vec<u8>>) -> Result<Vec<u8>, SamError> {
    if block.len() == 1 {
        return Ok(block.pop().unwrap_or_default());
    }

    let width = block.first().map_or(0, Vec::len);
    if let Some(ragged) = block.iter().find(|seq| seq.len() != width) {
        return Err(SamError::MalformedOperatorSequence(format!(
            "block members have lengths {} and {}",
            width,
            ragged.len()
        )));
    }

    let mut site = vec![0u8; block.len()];
    Ok((0..width)
        .map(|column| {
            for (slot, seq) in site.iter_mut().zip(&block) {
                *slot = seq[column];
            }
            resolve_site(&site)
        })
        .collect())
}

/// Expand every record of one query and flatten them.
/// `reference_length` resolves the length of the reference each record lies on.
pub fn consensus_for_query<F>(
    records: &[AlignmentRecord],
    reference_length: F,
) -> Result<Vec<u8>, SamError>
where
    F: Fn(&AlignmentRecord) -> Result<usize, SamError>,
{
    let mut block = Vec::with_capacity(records.len());
    let mut width = None;

    for record in records {
        record.mapped_start()?;
        let length = reference_length(record)?;
        match width {
            Some(w) if w != length => {
                return Err(SamError::MixedReferences(record.name.clone()));
            }
            _ => width = Some(length),
        }
        block.push(expand_record(record, length)?);
    }

    resolve_block(block)
}

/// Replace every remaining placeholder with `N`
pub fn fill_unknown(seq: &mut [u8]) {
    for b in seq.iter_mut().filter(|b| **b == PLACEHOLDER) {
        *b = UNKNOWN;
    }
}

/// Placeholders before the first or after the last base become gaps; those
/// between them become `N`. A sequence without any base is all gaps.
pub fn fill_boundaries(seq: &mut [u8]) {
    let first = seq.iter().position(u8::is_ascii_alphabetic);
    let last = seq.iter().rposition(u8::is_ascii_alphabetic);

    let (first, last) = match (first, last) {
        (Some(first), Some(last)) => (first, last),
        _ => {
            for b in seq.iter_mut().filter(|b| **b == PLACEHOLDER) {
                *b = GAP;
            }
            return;
        }
    };

    for (i, b) in seq.iter_mut().enumerate() {
        if *b != PLACEHOLDER {
            continue;
        }
        *b = if i < first || i > last { GAP } else { UNKNOWN };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(start: i64, seq: &str, cigar: &str) -> AlignmentRecord {
        AlignmentRecord::from_text("read1", start, seq, cigar).unwrap()
    }

    #[test]
    fn test_expand_single_match() {
        let expanded = expand_record(&record(3, "ACGTA", "5M"), 12).unwrap();
        assert_eq!(expanded.len(), 12);
        assert_eq!(&expanded[3..8], b"ACGTA");
        assert_eq!(expanded, b"***ACGTA****");
    }

    #[test]
    fn test_expand_with_indels_and_clips() {
        // Soft clip and insertion are dropped, deletion and skip become gaps
        let expanded = expand_record(&record(2, "TTACGGGTA", "2S2M2I1M2D1N2M3H"), 14).unwrap();
        assert_eq!(expanded, b"**ACG---TA****");
    }

    #[test]
    fn test_expand_is_deterministic() {
        let r = record(1, "ACGTTA", "3M1I2M");
        assert_eq!(expand_record(&r, 10).unwrap(), expand_record(&r, 10).unwrap());
    }

    #[test]
    fn test_expand_length_always_reference_length() {
        for (start, seq, cigar) in [
            (0, "ACGT", "4M"),
            (6, "ACGT", "4M"),
            (0, "ACGT", "2M3D2M"),
            (5, "ACGT", "4S"),
            (10, "", ""),
        ] {
            let expanded = expand_record(&record(start, seq, cigar), 10).unwrap();
            assert_eq!(expanded.len(), 10, "{} {}", start, cigar);
        }
    }

    #[test]
    fn test_expand_unmapped_read() {
        assert_eq!(
            expand_record(&record(-1, "ACGT", "4M"), 10),
            Err(SamError::UnmappedRead("read1".to_string()))
        );
    }

    #[test]
    fn test_expand_overruns() {
        // Runs past the reference end
        assert!(matches!(
            expand_record(&record(8, "ACGT", "4M"), 10),
            Err(SamError::MalformedOperatorSequence(_))
        ));
        // CIGAR asks for more bases than the read has
        assert!(matches!(
            expand_record(&record(0, "ACG", "4M"), 10),
            Err(SamError::MalformedOperatorSequence(_))
        ));
        // Insertion reads past the end of the query
        assert!(matches!(
            expand_record(&record(0, "ACG", "2M5I"), 10),
            Err(SamError::MalformedOperatorSequence(_))
        ));
        // Starts past the reference end
        assert!(matches!(
            expand_record(&record(11, "A", "1M"), 10),
            Err(SamError::MalformedOperatorSequence(_))
        ));
    }

    #[test]
    fn test_resolve_site() {
        assert_eq!(resolve_site(b"AC"), b'N');
        assert_eq!(resolve_site(b"A*"), b'A');
        assert_eq!(resolve_site(b"*-"), b'-');
        assert_eq!(resolve_site(b"AA*"), b'A');
        assert_eq!(resolve_site(b"A-"), b'A');
        assert_eq!(resolve_site(b"**"), b'*');
        // Duplicate letters do not count as conflicting evidence
        assert_eq!(resolve_site(b"GG"), b'G');
    }

    #[test]
    fn test_resolve_block() {
        let single = vec![b"**AC-*".to_vec()];
        assert_eq!(resolve_block(single).unwrap(), b"**AC-*");

        let block = vec![b"AC*-*T".to_vec(), b"CC-**T".to_vec()];
        assert_eq!(resolve_block(block).unwrap(), b"NC--*T");

        assert!(resolve_block(Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn test_resolve_block_rejects_ragged_members() {
        let block = vec![b"ACGT".to_vec(), b"AC".to_vec()];
        assert!(matches!(
            resolve_block(block),
            Err(SamError::MalformedOperatorSequence(_))
        ));
    }

    #[test]
    fn test_consensus_for_query() {
        let records = vec![
            record(0, "ACGT", "4M"),
            record(6, "GGA", "3M"),
            record(2, "TT", "2M"),
        ];
        let consensus = consensus_for_query(&records, |_| Ok(10)).unwrap();
        // Column 2 has G vs T, column 3 agrees on T
        assert_eq!(consensus, b"ACNT**GGA*");
    }

    #[test]
    fn test_consensus_rejects_mixed_references() {
        let records = vec![
            record(0, "ACGT", "4M"),
            record(0, "ACGT", "4M").with_reference_id(1),
        ];
        let lengths = [10, 12];
        let result = consensus_for_query(&records, |r| Ok(lengths[r.reference_id as usize]));
        assert_eq!(result, Err(SamError::MixedReferences("read1".to_string())));
    }

    #[test]
    fn test_fill_unknown() {
        let mut seq = b"**AC**".to_vec();
        fill_unknown(&mut seq);
        assert_eq!(seq, b"NNACNN");
    }

    #[test]
    fn test_fill_boundaries() {
        let mut seq = b"**AC**".to_vec();
        fill_boundaries(&mut seq);
        assert_eq!(seq, b"--AC--");

        let mut seq = b"*A*-*C*".to_vec();
        fill_boundaries(&mut seq);
        assert_eq!(seq, b"-AN-NC-");

        let mut seq = b"*-**".to_vec();
        fill_boundaries(&mut seq);
        assert_eq!(seq, b"----");
    }

    #[test]
    fn test_normalization_modes() {
        let mut unknown = b"*A**C*".to_vec();
        Normalization::Unknown.apply(&mut unknown);
        assert_eq!(unknown, b"NANNCN");

        let mut boundary = b"*A**C*".to_vec();
        Normalization::Boundary.apply(&mut boundary);
        assert_eq!(boundary, b"-ANNC-");
    }
}
