//! Submodule defining the benchmark row and its deterministic source.

use crate::errors::Error;

/// Payload stored in every generated row.
pub const ROW_VALUE: &str = "val";

/// A single row of the target and staging tables.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Row {
    /// Primary key.
    pub id: i32,
    /// Text payload.
    pub value: String,
}

impl Row {
    /// Creates a row with the given identifier and payload.
    pub fn new(id: i32, value: impl Into<String>) -> Self {
        Self {
            id,
            value: value.into(),
        }
    }
}

/// Restartable iterator over `count` rows with identifiers `0..count` and the
/// constant [`ROW_VALUE`] payload.
///
/// Cloning a source restarts it from the same position, so two sources built
/// with the same count always yield identical rows.
#[derive(Debug, Clone)]
pub struct RowSource {
    next: i32,
    end: i32,
}

impl RowSource {
    /// Creates a source producing `count` rows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RowCount`] when `count` does not fit the `i32`
    /// identifier domain.
    pub fn new(count: usize) -> Result<Self, Error> {
        let end = i32::try_from(count).map_err(|_| Error::RowCount(count))?;
        Ok(Self { next: 0, end })
    }
}

impl Iterator for RowSource {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        if self.next >= self.end {
            return None;
        }
        let row = Row::new(self.next, ROW_VALUE);
        self.next += 1;
        Some(row)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.end - self.next).unwrap_or(0);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for RowSource {}

/// Generates the working set of `count` rows shared by both strategies.
///
/// # Errors
///
/// Returns [`Error::RowCount`] when `count` does not fit the `i32`
/// identifier domain.
pub fn generate_rows(count: usize) -> Result<Vec<Row>, Error> {
    Ok(RowSource::new(count)?.collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_rows_is_deterministic() {
        for n in [0, 1, 3, 1000] {
            assert_eq!(generate_rows(n).unwrap(), generate_rows(n).unwrap());
        }
    }

    #[test]
    fn test_ids_are_dense_and_ordered() {
        let rows = generate_rows(5).unwrap();
        let ids: Vec<i32> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert!(rows.iter().all(|r| r.value == ROW_VALUE));
    }

    #[test]
    fn test_source_restarts_when_cloned() {
        let mut source = RowSource::new(4).unwrap();
        let restart = source.clone();
        assert_eq!(source.next(), Some(Row::new(0, "val")));
        assert_eq!(source.len(), 3);
        assert_eq!(restart.len(), 4);
        assert_eq!(restart.collect::<Vec<_>>(), generate_rows(4).unwrap());
    }

    #[test]
    fn test_empty_source() {
        assert!(generate_rows(0).unwrap().is_empty());
    }

    #[test]
    fn test_row_count_overflow() {
        let too_many = usize::try_from(i32::MAX).unwrap() + 1;
        assert!(matches!(RowSource::new(too_many), Err(Error::RowCount(n)) if n == too_many));
    }
}
