//! Group raw rows into logical transactions.
//!
//! Without a collapse key every row is its own group. With one, rows are
//! read in chunks of `chunk_size` and grouped by key inside each chunk:
//!
//! ```text
//! Rows (chunk of 4)              →  Groups (first-appearance order)
//! ┌──────────────────────┐          ┌────────────────────┐
//! │ id: T1, split: Food  │          │ T1: [Food, Cash]   │
//! │ id: T2, split: Rent  │    →     ├────────────────────┤
//! │ id: T1, split: Cash  │          │ T2: [Rent, Bank]   │
//! │ id: T2, split: Bank  │          └────────────────────┘
//! └──────────────────────┘
//! ```
//!
//! Memory stays bounded by the chunk size. A key whose rows straddle a chunk
//! boundary yields two groups; that case is reported with a warning.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::PipelineResult;
use crate::logs::log_warning;
use crate::mapping::FieldMapper;
use crate::models::{Group, Row};

/// Default number of rows grouped together
pub const DEFAULT_CHUNK_SIZE: usize = 1 << 14;

/// Lazy grouping iterator over rows.
pub struct Grouper<'a, I> {
    rows: I,
    mapper: FieldMapper<'a>,
    collapse: Option<String>,
    chunk_size: usize,
    pending: VecDeque<Group>,
    /// Keys seen in the previous chunk
    previous: HashSet<String>,
    exhausted: bool,
}

/// Group `rows` by the `collapse` key, `chunk_size` rows at a time.
pub fn group_rows<'a, I>(
    rows: I,
    mapper: FieldMapper<'a>,
    collapse: Option<&str>,
    chunk_size: usize,
) -> Grouper<'a, I::IntoIter>
where
    I: IntoIterator<Item = PipelineResult<Row>>,
{
    Grouper {
        rows: rows.into_iter(),
        mapper,
        collapse: collapse.map(str::to_string),
        chunk_size: chunk_size.max(1),
        pending: VecDeque::new(),
        previous: HashSet::new(),
        exhausted: false,
    }
}

impl<'a, I> Grouper<'a, I>
where
    I: Iterator<Item = PipelineResult<Row>>,
{
    fn fill_chunk(&mut self, key_name: &str) -> PipelineResult<()> {
        let mut groups: Vec<Group> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for _ in 0..self.chunk_size {
            let row = match self.rows.next() {
                Some(row) => row?,
                None => {
                    self.exhausted = true;
                    break;
                }
            };

            let key = self.mapper.resolve_key(key_name, &row)?;
            match index.get(&key) {
                Some(&pos) => groups[pos].rows.push(row),
                None => {
                    if self.previous.contains(&key) {
                        log_warning(format!(
                            "Rows for '{}' continue past a chunk boundary (row {}); \
                             they form a separate transaction. Raise --chunk-size to keep them together",
                            key,
                            row.ordinal()
                        ));
                    }
                    index.insert(key.clone(), groups.len());
                    groups.push(Group::keyed(key, row));
                }
            }
        }

        self.previous = index.into_keys().collect();
        self.pending.extend(groups);
        Ok(())
    }
}

impl<'a, I> Iterator for Grouper<'a, I>
where
    I: Iterator<Item = PipelineResult<Row>>,
{
    type Item = PipelineResult<Group>;

    fn next(&mut self) -> Option<Self::Item> {
        let Some(key_name) = self.collapse.clone() else {
            return self.rows.next().map(|row| row.map(Group::single));
        };

        loop {
            if let Some(group) = self.pending.pop_front() {
                return Some(Ok(group));
            }
            if self.exhausted {
                return None;
            }
            if let Err(e) = self.fill_chunk(&key_name) {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
    }
}
