use crate::alignment_record::AlignmentRecord;
use crate::error::SamError;
use rustc_hash::FxHashSet;

/// Streams records and yields one group per run of records sharing a query name.
///
/// Input must already be grouped by name (e.g. `samtools sort -n`). Every
/// yielded group is non-empty and belongs to exactly one query. A name that
/// reappears after its group was yielded is reported as `UnsortedInput`
/// instead of silently producing a second group. The check keeps the name of
/// every closed group, so memory grows with the number of queries in the input.
pub struct QueryBlocks<I> {
    records: I,
    current: Vec<AlignmentRecord>,
    closed: FxHashSet<String>,
    done: bool,
}

impl<I> QueryBlocks<I>
where
    I: Iterator<Item = Result<AlignmentRecord, SamError>>,
{
    pub fn new(records: I) -> Self {
        Self {
            records,
            current: Vec::new(),
            closed: FxHashSet::default(),
            done: false,
        }
    }

    fn fail(&mut self, e: SamError) -> Option<Result<Vec<AlignmentRecord>, SamError>> {
        self.done = true;
        self.current.clear();
        Some(Err(e))
    }
}

impl<I> Iterator for QueryBlocks<I>
where
    I: Iterator<Item = Result<AlignmentRecord, SamError>>,
{
    type Item = Result<Vec<AlignmentRecord>, SamError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let record = match self.records.next() {
                Some(Ok(record)) => record,
                Some(Err(e)) => return self.fail(e),
                None => {
                    self.done = true;
                    if self.current.is_empty() {
                        return None;
                    }
                    return Some(Ok(std::mem::take(&mut self.current)));
                }
            };

            let same_query = match self.current.first() {
                Some(first) => first.name == record.name,
                None => true,
            };

            if same_query {
                self.current.push(record);
                continue;
            }

            if self.closed.contains(&record.name) {
                return self.fail(SamError::UnsortedInput(record.name));
            }

            let block = std::mem::replace(&mut self.current, vec![record]);
            self.closed.insert(block[0].name.clone());
            return Some(Ok(block));
        }
    }
}
