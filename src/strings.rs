//! Interned string table.
//!
//! Event records refer to names and other strings by a small integer id
//! instead of repeating the text. [`StringTable`] assigns those ids densely,
//! in first-seen order, and serializes the set of strings as one blob of
//! null-terminated strings:
//!
//! ```text
//!   id:    0        1          2
//!        ┌────────┬──────────┬───────┬─────┐
//!        │ main\0 │ worker\0 │ tick\0│ pad │
//!        └────────┴──────────┴───────┴─────┘
//! ```
//!
//! The table is shared by every producer thread, so all access goes through
//! a single [`parking_lot::Mutex`]. Critical sections are short and bounded.

use std::collections::HashMap;
use std::fmt::{self, Debug};

use parking_lot::Mutex;

use crate::error::{Result, TraceError};
use crate::output::{part_length, OutputBuffer, PartHeader, PART_TYPE_STRING_TABLE};
use crate::part::Part;

#[derive(Default)]
struct Interned {
    ids: HashMap<String, u32>,
    strings: Vec<String>,
}

impl Interned {
    /// Serialized length: every string plus its terminator.
    fn raw_length(&self) -> usize {
        self.strings.iter().map(|s| s.len() + 1).sum()
    }
}

/// Thread-safe table mapping strings to stable, dense ids.
///
/// # Examples
///
/// ```rust
/// use tracciato::strings::StringTable;
///
/// let table = StringTable::new();
/// assert_eq!(table.get_string_id("main").unwrap(), 0);
/// assert_eq!(table.get_string_id("worker").unwrap(), 1);
/// assert_eq!(table.get_string_id("main").unwrap(), 0);
/// assert_eq!(table.len(), 2);
///
/// // The serialized table is null-terminated, so NUL bytes are rejected.
/// assert!(table.get_string_id("a\0b").is_err());
/// ```
///
/// Sharing between threads:
///
/// ```rust
/// use std::sync::Arc;
/// use std::thread;
/// use tracciato::strings::StringTable;
///
/// let table = Arc::new(StringTable::new());
/// let handles: Vec<_> = (0..4)
///     .map(|_| {
///         let table = Arc::clone(&table);
///         thread::spawn(move || table.get_string_id("shared").unwrap())
///     })
///     .collect();
///
/// for h in handles {
///     assert_eq!(h.join().unwrap(), 0);
/// }
/// ```
#[derive(Default)]
pub struct StringTable {
    inner: Mutex<Interned>,
}

impl StringTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id of `value`, assigning the next id if it is new.
    ///
    /// Fails with [`TraceError::InteriorNul`] if `value` contains a NUL byte,
    /// which would split it in the serialized table.
    pub fn get_string_id(&self, value: &str) -> Result<u32> {
        if let Some(position) = value.find('\0') {
            return Err(TraceError::InteriorNul {
                value: value.to_owned(),
                position,
            });
        }
        let mut inner = self.inner.lock();
        if let Some(&id) = inner.ids.get(value) {
            return Ok(id);
        }
        let id = inner.strings.len() as u32;
        inner.strings.push(value.to_owned());
        inner.ids.insert(value.to_owned(), id);
        Ok(id)
    }

    /// Returns the string assigned to `id`, if any.
    pub fn get(&self, id: u32) -> Option<String> {
        self.inner.lock().strings.get(id as usize).cloned()
    }

    /// Number of interned strings.
    pub fn len(&self) -> usize {
        self.inner.lock().strings.len()
    }

    /// Returns `true` if no string has been interned.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every string. Numbering restarts from zero.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.strings.clear();
        inner.ids.clear();
    }
}

impl Part for StringTable {
    fn populate_header(&self, header: &mut PartHeader) -> Result<()> {
        let raw_length = self.inner.lock().raw_length();
        *header = PartHeader::new(PART_TYPE_STRING_TABLE, part_length(raw_length)?);
        Ok(())
    }

    fn write_to(&self, header: &PartHeader, output: &mut OutputBuffer<'_>) -> Result<()> {
        let inner = self.inner.lock();

        let expected = header.length as usize;
        let mut raw_length = 0;
        for s in &inner.strings {
            raw_length += s.len() + 1;
            if raw_length > expected {
                return Err(TraceError::StringTableMismatch {
                    expected,
                    actual: inner.raw_length(),
                });
            }
            output.append_bytes(s.as_bytes())?;
            output.append_bytes(&[0])?;
        }
        if raw_length != expected {
            return Err(TraceError::StringTableMismatch {
                expected,
                actual: raw_length,
            });
        }
        output.align()
    }
}

impl Debug for StringTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_list().entries(inner.strings.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serialize(table: &StringTable, header: &PartHeader) -> Result<Vec<u8>> {
        let mut sink = Vec::new();
        let mut output = OutputBuffer::new(&mut sink);
        table.write_to(header, &mut output)?;
        Ok(sink)
    }

    #[test]
    fn test_ids_are_dense_and_stable() {
        let table = StringTable::new();
        assert_eq!(table.get_string_id("a").unwrap(), 0);
        assert_eq!(table.get_string_id("b").unwrap(), 1);
        assert_eq!(table.get_string_id("a").unwrap(), 0);
        assert_eq!(table.get_string_id("c").unwrap(), 2);
        assert_eq!(table.get_string_id("b").unwrap(), 1);
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(2).as_deref(), Some("c"));
        assert_eq!(table.get(3), None);
    }

    #[test]
    fn test_empty_string_is_interned() {
        let table = StringTable::new();
        assert_eq!(table.get_string_id("").unwrap(), 0);
        let mut header = PartHeader::default();
        table.populate_header(&mut header).unwrap();
        assert_eq!(header.length, 1);
    }

    #[test]
    fn test_populate_header() {
        let table = StringTable::new();
        table.get_string_id("main").unwrap();
        table.get_string_id("tick").unwrap();
        let mut header = PartHeader::default();
        table.populate_header(&mut header).unwrap();
        assert_eq!(header.part_type, PART_TYPE_STRING_TABLE);
        assert_eq!(header.offset, 0);
        assert_eq!(header.length, 10);
    }

    #[test]
    fn test_write_to_matches_header() {
        let table = StringTable::new();
        table.get_string_id("ab").unwrap();
        table.get_string_id("cde").unwrap();
        let mut header = PartHeader::default();
        table.populate_header(&mut header).unwrap();

        let bytes = serialize(&table, &header).unwrap();
        assert_eq!(&bytes[..header.length as usize], b"ab\0cde\0");
        assert_eq!(bytes.len(), 8);
        assert_eq!(bytes[7], 0);
    }

    #[test]
    fn test_write_to_empty_table() {
        let table = StringTable::new();
        let mut header = PartHeader::default();
        table.populate_header(&mut header).unwrap();
        assert_eq!(header.length, 0);
        assert!(serialize(&table, &header).unwrap().is_empty());
    }

    #[test]
    fn test_write_to_fails_after_growth() {
        let table = StringTable::new();
        table.get_string_id("first").unwrap();
        let mut header = PartHeader::default();
        table.populate_header(&mut header).unwrap();

        table.get_string_id("second").unwrap();
        let err = serialize(&table, &header).unwrap_err();
        assert!(matches!(
            err,
            TraceError::StringTableMismatch {
                expected: 6,
                actual: 13
            }
        ));
    }

    #[test]
    fn test_write_to_fails_when_first_string_is_new() {
        let table = StringTable::new();
        let mut header = PartHeader::default();
        table.populate_header(&mut header).unwrap();

        table.get_string_id("late").unwrap();
        assert!(serialize(&table, &header).is_err());
    }

    #[test]
    fn test_write_to_stops_before_overflowing() {
        let table = StringTable::new();
        table.get_string_id("abc").unwrap();
        let header = PartHeader::new(PART_TYPE_STRING_TABLE, 6);
        table.get_string_id("defgh").unwrap();

        let mut sink = Vec::new();
        let mut output = OutputBuffer::new(&mut sink);
        assert!(table.write_to(&header, &mut output).is_err());
        assert_eq!(sink, b"abc\0");
    }

    #[test]
    fn test_write_to_fails_after_clear() {
        let table = StringTable::new();
        table.get_string_id("gone").unwrap();
        let mut header = PartHeader::default();
        table.populate_header(&mut header).unwrap();

        table.clear();
        let err = serialize(&table, &header).unwrap_err();
        assert!(matches!(
            err,
            TraceError::StringTableMismatch {
                expected: 5,
                actual: 0
            }
        ));
    }

    #[test]
    fn test_interior_nul_is_rejected() {
        let table = StringTable::new();
        table.get_string_id("main").unwrap();
        let err = table.get_string_id("a\0b").unwrap_err();
        assert!(matches!(err, TraceError::InteriorNul { position: 1, .. }));
        assert_eq!(table.len(), 1);

        // Later ids still line up with the serialized table.
        assert_eq!(table.get_string_id("c").unwrap(), 1);
        let mut header = PartHeader::default();
        table.populate_header(&mut header).unwrap();
        let bytes = serialize(&table, &header).unwrap();
        assert_eq!(&bytes[..header.length as usize], b"main\0c\0");
    }

    #[test]
    fn test_clear_restarts_numbering() {
        let table = StringTable::new();
        table.get_string_id("a").unwrap();
        table.get_string_id("b").unwrap();
        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.get_string_id("x").unwrap(), 0);
        assert_eq!(table.get_string_id("a").unwrap(), 1);
    }

    #[test]
    fn test_concurrent_interning() {
        use std::sync::Arc;
        use std::thread;

        let table = Arc::new(StringTable::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let table = Arc::clone(&table);
                thread::spawn(move || {
                    for i in 0..100 {
                        table.get_string_id(&format!("s{}", (i + t * 25) % 100)).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(table.len(), 100);
        let mut ids: Vec<u32> = (0..100)
            .map(|i| table.get_string_id(&format!("s{i}")).unwrap())
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..100).collect::<Vec<u32>>());
    }

    #[test]
    fn test_debug() {
        let table = StringTable::new();
        table.get_string_id("x").unwrap();
        assert_eq!(format!("{:?}", table), r#"["x"]"#);
    }
}
