//! SAM/BAM/CRAM input
//!
//! Thin wrapper over the htslib reader that hands out `AlignmentRecord`s and
//! keeps the reference lengths declared in the header. Use `-` to read from stdin.

use crate::alignment_record::AlignmentRecord;
use crate::error::SamError;
use log::debug;
use rust_htslib::bam::{self, Read as BamRead};

pub struct SamReader {
    path: String,
    reader: bam::Reader,
    record: bam::Record,
    reference_lengths: Vec<usize>,
    failed: bool,
}

impl SamReader {
    pub fn from_path(path: &str) -> Result<Self, SamError> {
        let reader = if path == "-" {
            bam::Reader::from_stdin()
        } else {
            bam::Reader::from_path(path)
        }
        .map_err(|e| SamError::SourceUnavailable(format!("Failed to open '{}': {}", path, e)))?;

        let header = reader.header();
        let reference_lengths = (0..header.target_count())
            .map(|tid| header.target_len(tid).unwrap_or(0) as usize)
            .collect::<Vec<_>>();
        debug!(
            "Opened {} with {} reference sequence(s)",
            path,
            reference_lengths.len()
        );

        Ok(Self {
            path: path.to_string(),
            reader,
            record: bam::Record::new(),
            reference_lengths,
            failed: false,
        })
    }

    pub fn reference_lengths(&self) -> &[usize] {
        &self.reference_lengths
    }
}

impl Iterator for SamReader {
    type Item = Result<AlignmentRecord, SamError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        // Reuse one htslib record for the whole file
        match self.reader.read(&mut self.record) {
            Some(Ok(())) => Some(AlignmentRecord::from_bam(&self.record)),
            Some(Err(e)) => {
                self.failed = true;
                Some(Err(SamError::SourceUnavailable(format!(
                    "Failed to read record from '{}': {}",
                    self.path, e
                ))))
            }
            None => None,
        }
    }
}
