use crate::cigar::{parse_cigar, CigarOp, OperatorKind};
use crate::error::SamError;
use rust_htslib::bam::record::{Cigar, Record};

/// One alignment line, detached from the reader that produced it
///
/// ## Field interpretation:
/// - `reference_id`: index of the reference in the header, negative when absent
/// - `reference_start`: 0-based leftmost position, negative when unplaced
/// - `sequence`: fully expanded base calls (hard-clipped bases are absent)
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentRecord {
    pub name: String,
    pub reference_id: i32,
    pub reference_start: i64,
    pub sequence: Vec<u8>,
    pub cigar: Vec<CigarOp>,
    pub flags: u16,
}

impl AlignmentRecord {
    /// SAM flag bit marking a read as unmapped
    pub const UNMAPPED_FLAG: u16 = 0x4;

    pub fn new(name: &str, reference_start: i64, sequence: &[u8], cigar: Vec<CigarOp>) -> Self {
        Self {
            name: name.to_string(),
            reference_id: 0,
            reference_start,
            sequence: sequence.to_vec(),
            cigar,
            flags: 0,
        }
    }

    /// Build a record from textual SAM columns
    pub fn from_text(
        name: &str,
        reference_start: i64,
        sequence: &str,
        cigar: &str,
    ) -> Result<Self, SamError> {
        Ok(Self::new(
            name,
            reference_start,
            sequence.as_bytes(),
            parse_cigar(cigar)?,
        ))
    }

    pub fn with_flags(mut self, flags: u16) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_reference_id(mut self, reference_id: i32) -> Self {
        self.reference_id = reference_id;
        self
    }

    /// The indel reader skips records with this bit set. Both paths still
    /// reject a negative start through `mapped_start`.
    pub fn is_flagged_unmapped(&self) -> bool {
        (self.flags & Self::UNMAPPED_FLAG) != 0
    }

    /// The 0-based reference start, or `UnmappedRead` when the record was never placed
    pub fn mapped_start(&self) -> Result<usize, SamError> {
        usize::try_from(self.reference_start).map_err(|_| SamError::UnmappedRead(self.name.clone()))
    }

    /// Copy the fields we need out of an htslib record
    pub fn from_bam(record: &Record) -> Result<Self, SamError> {
        let cigar = record
            .cigar()
            .iter()
            .map(|op| {
                let (len, kind) = match *op {
                    Cigar::Match(len) => (len, OperatorKind::Match),
                    Cigar::Ins(len) => (len, OperatorKind::Insertion),
                    Cigar::Del(len) => (len, OperatorKind::Deletion),
                    Cigar::RefSkip(len) => (len, OperatorKind::Skip),
                    Cigar::SoftClip(len) => (len, OperatorKind::SoftClip),
                    Cigar::HardClip(len) => (len, OperatorKind::HardClip),
                    Cigar::Pad(len) => (len, OperatorKind::Padding),
                    Cigar::Equal(len) => (len, OperatorKind::SequenceMatch),
                    Cigar::Diff(len) => (len, OperatorKind::SequenceMismatch),
                };
                if len > CigarOp::MAX_LEN {
                    return Err(SamError::MalformedOperatorSequence(format!(
                        "operation length {} too large",
                        len
                    )));
                }
                Ok(CigarOp::new(len, kind))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: String::from_utf8_lossy(record.qname()).into_owned(),
            reference_id: record.tid(),
            reference_start: record.pos(),
            sequence: record.seq().as_bytes(),
            cigar,
            flags: record.flags(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapped_predicate() {
        let record = AlignmentRecord::from_text("read1", 10, "ACGT", "4M").unwrap();
        assert!(!record.is_flagged_unmapped());
        assert_eq!(record.mapped_start(), Ok(10));

        let flagged = record.clone().with_flags(AlignmentRecord::UNMAPPED_FLAG | 0x10);
        assert!(flagged.is_flagged_unmapped());
        // Flag alone does not stop the start from being usable
        assert_eq!(flagged.mapped_start(), Ok(10));

        let unplaced = AlignmentRecord::from_text("read2", -1, "ACGT", "4M").unwrap();
        assert!(!unplaced.is_flagged_unmapped());
        assert_eq!(
            unplaced.mapped_start(),
            Err(SamError::UnmappedRead("read2".to_string()))
        );
    }

    #[test]
    fn test_from_text_rejects_bad_cigar() {
        assert_eq!(
            AlignmentRecord::from_text("read1", 0, "ACGT", "4Z"),
            Err(SamError::UnrecognizedOperator('Z'))
        );
    }
}
