use std::io;

/// Errors raised while reconstructing or tallying alignments
#[derive(Debug, Clone, PartialEq)]
pub enum SamError {
    /// The record has a negative reference start and cannot be placed
    UnmappedRead(String),
    UnrecognizedOperator(char),
    SourceUnavailable(String),
    SinkUnavailable(String),
    MalformedOperatorSequence(String),
    /// A query name showed up again after its block was closed
    UnsortedInput(String),
    UnknownReference(String),
    /// Records of one query are placed on references of different lengths
    MixedReferences(String),
}

impl std::fmt::Display for SamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SamError::UnmappedRead(name) => write!(f, "unmapped read: {}", name),
            SamError::UnrecognizedOperator(op) => {
                write!(f, "Unrecognized CIGAR operation: {}", op)
            }
            SamError::SourceUnavailable(msg) => write!(f, "Input unavailable: {}", msg),
            SamError::SinkUnavailable(msg) => write!(f, "Output unavailable: {}", msg),
            SamError::MalformedOperatorSequence(msg) => {
                write!(f, "Malformed CIGAR: {}", msg)
            }
            SamError::UnsortedInput(name) => write!(
                f,
                "Records for query '{}' are not contiguous; input must be grouped by query name",
                name
            ),
            SamError::UnknownReference(msg) => write!(f, "Unknown reference: {}", msg),
            SamError::MixedReferences(name) => write!(
                f,
                "Records for query '{}' lie on references of different lengths",
                name
            ),
        }
    }
}

impl std::error::Error for SamError {}

impl From<SamError> for io::Error {
    fn from(e: SamError) -> Self {
        let kind = match e {
            SamError::SourceUnavailable(_) => io::ErrorKind::NotFound,
            SamError::SinkUnavailable(_) => io::ErrorKind::Other,
            _ => io::ErrorKind::InvalidData,
        };
        io::Error::new(kind, e)
    }
}
