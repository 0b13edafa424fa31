use crate::error::SamError;

/// The nine SAM CIGAR operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorKind {
    Match,
    Insertion,
    Deletion,
    Skip,
    SoftClip,
    HardClip,
    Padding,
    SequenceMatch,
    SequenceMismatch,
}

impl OperatorKind {
    pub fn from_char(op: char) -> Result<Self, SamError> {
        match op {
            'M' => Ok(OperatorKind::Match),
            'I' => Ok(OperatorKind::Insertion),
            'D' => Ok(OperatorKind::Deletion),
            'N' => Ok(OperatorKind::Skip),
            'S' => Ok(OperatorKind::SoftClip),
            'H' => Ok(OperatorKind::HardClip),
            'P' => Ok(OperatorKind::Padding),
            '=' => Ok(OperatorKind::SequenceMatch),
            'X' => Ok(OperatorKind::SequenceMismatch),
            _ => Err(SamError::UnrecognizedOperator(op)),
        }
    }

    pub fn as_char(self) -> char {
        match self {
            OperatorKind::Match => 'M',
            OperatorKind::Insertion => 'I',
            OperatorKind::Deletion => 'D',
            OperatorKind::Skip => 'N',
            OperatorKind::SoftClip => 'S',
            OperatorKind::HardClip => 'H',
            OperatorKind::Padding => 'P',
            OperatorKind::SequenceMatch => '=',
            OperatorKind::SequenceMismatch => 'X',
        }
    }

    fn code(self) -> u32 {
        match self {
            OperatorKind::Match => 0,
            OperatorKind::Insertion => 1,
            OperatorKind::Deletion => 2,
            OperatorKind::Skip => 3,
            OperatorKind::SoftClip => 4,
            OperatorKind::HardClip => 5,
            OperatorKind::Padding => 6,
            OperatorKind::SequenceMatch => 7,
            OperatorKind::SequenceMismatch => 8,
        }
    }

    fn from_code(code: u32) -> Self {
        match code {
            0 => OperatorKind::Match,
            1 => OperatorKind::Insertion,
            2 => OperatorKind::Deletion,
            3 => OperatorKind::Skip,
            4 => OperatorKind::SoftClip,
            5 => OperatorKind::HardClip,
            6 => OperatorKind::Padding,
            7 => OperatorKind::SequenceMatch,
            _ => OperatorKind::SequenceMismatch,
        }
    }

    pub fn consumes_query(self) -> bool {
        matches!(
            self,
            OperatorKind::Match
                | OperatorKind::Insertion
                | OperatorKind::SoftClip
                | OperatorKind::SequenceMatch
                | OperatorKind::SequenceMismatch
        )
    }

    pub fn consumes_reference(self) -> bool {
        matches!(
            self,
            OperatorKind::Match
                | OperatorKind::Deletion
                | OperatorKind::Skip
                | OperatorKind::SequenceMatch
                | OperatorKind::SequenceMismatch
        )
    }
}

/// A single CIGAR operation packed into one word: the upper 4 bits hold the
/// operation, the lower 28 bits its length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CigarOp {
    val: u32,
}

impl CigarOp {
    const LEN_BITS: u32 = 28;
    const LEN_MASK: u32 = (1 << Self::LEN_BITS) - 1;
    pub const MAX_LEN: u32 = Self::LEN_MASK;

    pub fn new(len: u32, kind: OperatorKind) -> Self {
        debug_assert!(len <= Self::MAX_LEN, "CIGAR length {len} does not fit");
        Self {
            val: (kind.code() << Self::LEN_BITS) | (len & Self::LEN_MASK),
        }
    }

    pub fn kind(&self) -> OperatorKind {
        OperatorKind::from_code(self.val >> Self::LEN_BITS)
    }

    pub fn op(&self) -> char {
        self.kind().as_char()
    }

    pub fn len(&self) -> usize {
        (self.val & Self::LEN_MASK) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Display for CigarOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.len(), self.op())
    }
}

/// Parse a textual CIGAR string such as `5M2I3M`
pub fn parse_cigar(cigar: &str) -> Result<Vec<CigarOp>, SamError> {
    let mut ops = Vec::new();
    let mut len: u32 = 0;
    let mut has_len = false;

    for c in cigar.chars() {
        if let Some(digit) = c.to_digit(10) {
            len = len
                .checked_mul(10)
                .and_then(|l| l.checked_add(digit))
                .filter(|&l| l <= CigarOp::MAX_LEN)
                .ok_or_else(|| {
                    SamError::MalformedOperatorSequence(format!(
                        "operation length overflows in '{cigar}'"
                    ))
                })?;
            has_len = true;
        } else {
            if !has_len {
                return Err(SamError::MalformedOperatorSequence(format!(
                    "operation '{c}' without a length in '{cigar}'"
                )));
            }
            ops.push(CigarOp::new(len, OperatorKind::from_char(c)?));
            len = 0;
            has_len = false;
        }
    }

    if has_len {
        return Err(SamError::MalformedOperatorSequence(format!(
            "trailing length without an operation in '{cigar}'"
        )));
    }

    Ok(ops)
}

pub fn cigar_to_string(ops: &[CigarOp]) -> String {
    ops.iter().map(|op| op.to_string()).collect()
}

/// Bytes produced by one operation in the reference-aligned view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emission<'a> {
    Bases(&'a [u8]),
    Gap(usize),
    Nothing,
}

impl Emission<'_> {
    pub const GAP: u8 = b'-';

    pub fn len(&self) -> usize {
        match self {
            Emission::Bases(bases) => bases.len(),
            Emission::Gap(len) => *len,
            Emission::Nothing => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn extend_into(&self, out: &mut Vec<u8>) {
        match self {
            Emission::Bases(bases) => out.extend_from_slice(bases),
            Emission::Gap(len) => out.resize(out.len() + len, Self::GAP),
            Emission::Nothing => {}
        }
    }
}

/// Query and reference positions while walking a CIGAR
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub query: usize,
    pub reference: usize,
}

impl Cursor {
    pub fn new(reference: usize) -> Self {
        Self {
            query: 0,
            reference,
        }
    }
}

/// Take `len` bases of the query sequence starting at `start`
pub fn query_slice(seq: &[u8], start: usize, len: usize) -> Result<&[u8], SamError> {
    start
        .checked_add(len)
        .and_then(|end| seq.get(start..end))
        .ok_or_else(|| {
            SamError::MalformedOperatorSequence(format!(
                "query cursor {}+{} overruns a sequence of length {}",
                start,
                len,
                seq.len()
            ))
        })
}

/// Advance the cursor over one operation and return what it contributes to the
/// reference-aligned sequence. Insertions and soft clips contribute nothing:
/// inserted bases only surface through indel extraction. Every query-consuming
/// operation must stay within `seq`.
pub fn apply<'a>(
    op: &CigarOp,
    cursor: Cursor,
    seq: &'a [u8],
) -> Result<(Cursor, Emission<'a>), SamError> {
    let len = op.len();
    let Cursor { query, reference } = cursor;
    let step = match op.kind() {
        OperatorKind::Match | OperatorKind::SequenceMatch | OperatorKind::SequenceMismatch => (
            Cursor {
                query: query + len,
                reference: reference + len,
            },
            Emission::Bases(query_slice(seq, query, len)?),
        ),
        OperatorKind::Insertion | OperatorKind::SoftClip => {
            query_slice(seq, query, len)?;
            (
                Cursor {
                    query: query + len,
                    reference,
                },
                Emission::Nothing,
            )
        }
        OperatorKind::Deletion | OperatorKind::Skip => (
            Cursor {
                query,
                reference: reference + len,
            },
            Emission::Gap(len),
        ),
        OperatorKind::HardClip | OperatorKind::Padding => (cursor, Emission::Nothing),
    };
    Ok(step)
}
