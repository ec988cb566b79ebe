//! String tables.
//!
//! A string table is a blob of NUL-terminated entries addressed by byte offset. Offset 0 is the
//! empty string, even for a zero-length table.

use std::borrow::Cow;
use std::collections::HashMap;

use crate::error::{BoundsError, WriteError};

/// Read-only view of a string table's bytes.
#[derive(Debug, Clone, Copy)]
pub struct StringTable<'a> {
    data: &'a [u8],
}

impl<'a> StringTable<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Text of the entry at `offset`, up to the next NUL.
    ///
    /// Invalid UTF-8 is replaced rather than rejected; a missing terminator is a bounds error.
    pub fn get(&self, offset: u32) -> Result<Cow<'a, str>, BoundsError> {
        let start = offset as usize;
        if start == 0 && self.data.is_empty() {
            return Ok(Cow::Borrowed(""));
        }
        let tail = self
            .data
            .get(start..)
            .filter(|tail| !tail.is_empty())
            .ok_or_else(|| BoundsError::new("string", u64::from(offset), 1, self.data.len()))?;
        let end = tail.iter().position(|&b| b == 0).ok_or_else(|| {
            BoundsError::new("string", u64::from(offset), tail.len() as u64 + 1, self.data.len())
        })?;
        Ok(String::from_utf8_lossy(&tail[..end]))
    }

    /// Offset of an entry (or entry suffix) equal to `text`.
    pub fn find(&self, text: &str) -> Option<u32> {
        let needle = text.as_bytes();
        if needle.contains(&0) {
            return None;
        }
        let width = needle.len() + 1;
        if self.data.len() < width {
            return None;
        }
        (0..=self.data.len() - width)
            .find(|&pos| {
                self.data[pos + needle.len()] == 0 && &self.data[pos..pos + needle.len()] == needle
            })
            .and_then(|pos| u32::try_from(pos).ok())
    }

    /// Every NUL-terminated entry with its offset. Bytes after the last NUL are ignored.
    pub fn entries(&self) -> impl Iterator<Item = (u32, Cow<'a, str>)> + 'a {
        let data = self.data;
        let mut pos = 0usize;
        std::iter::from_fn(move || {
            let tail = data.get(pos..)?;
            let end = tail.iter().position(|&b| b == 0)?;
            let offset = u32::try_from(pos).ok()?;
            let text = String::from_utf8_lossy(&tail[..end]);
            pos += end + 1;
            Some((offset, text))
        })
    }
}

/// Append `text` to a string table blob and return its offset.
///
/// With `dedup`, an existing entry or entry suffix equal to `text` is reused and the blob is
/// left untouched. An empty blob first receives the leading NUL that makes offset 0 the empty
/// string.
pub fn append_string(blob: &mut Vec<u8>, text: &str, dedup: bool) -> Result<u32, WriteError> {
    if dedup {
        if let Some(offset) = StringTable::new(blob).find(text) {
            return Ok(offset);
        }
    }
    if blob.is_empty() {
        blob.push(0);
        if text.is_empty() {
            return Ok(0);
        }
    }
    let offset = blob.len() as u64;
    let offset = u32::try_from(offset).map_err(|_| WriteError::ValueOverflow {
        field: "string table offset",
        value: offset,
    })?;
    blob.extend_from_slice(text.as_bytes());
    blob.push(0);
    Ok(offset)
}

/// Resolved strings keyed by (string table section, offset).
#[derive(Debug, Clone, Default)]
pub struct NameCache {
    entries: HashMap<(usize, u32), String>,
}

impl NameCache {
    pub fn get(&self, table: usize, offset: u32) -> Option<&str> {
        self.entries.get(&(table, offset)).map(String::as_str)
    }

    pub fn insert(&mut self, table: usize, offset: u32, text: String) {
        self.entries.insert((table, offset), text);
    }

    /// Drop every entry resolved through `table`.
    pub fn invalidate(&mut self, table: usize) {
        self.entries.retain(|&(t, _), _| t != table);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_string() {
        let table = StringTable::new(b"\0hello\0world\0");
        assert_eq!(table.get(0).unwrap(), "");
        assert_eq!(table.get(1).unwrap(), "hello");
        assert_eq!(table.get(7).unwrap(), "world");
        // suffix of an entry
        assert_eq!(table.get(9).unwrap(), "rld");
        assert!(table.get(100).is_err());
        assert!(table.get(13).is_err());
    }

    #[test]
    fn test_empty_table_offset_zero() {
        let table = StringTable::new(b"");
        assert_eq!(table.get(0).unwrap(), "");
        assert!(table.get(1).is_err());
    }

    #[test]
    fn test_missing_terminator() {
        let table = StringTable::new(b"\0abc");
        let err = table.get(1).unwrap_err();
        assert_eq!(err.offset, 1);
        assert_eq!(err.available, 4);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let table = StringTable::new(b"\0a\xffb\0");
        assert_eq!(table.get(1).unwrap(), "a\u{fffd}b");
    }

    #[test]
    fn test_append_with_and_without_dedup() {
        let mut blob = b"\0.rela.text\0".to_vec();
        assert_eq!(append_string(&mut blob, ".text", true).unwrap(), 6);
        assert_eq!(blob.len(), 12);
        assert_eq!(append_string(&mut blob, ".text", false).unwrap(), 12);
        assert_eq!(blob, b"\0.rela.text\0.text\0");
        assert_eq!(append_string(&mut blob, "", true).unwrap(), 0);
    }

    #[test]
    fn test_append_to_empty_blob() {
        let mut blob = Vec::new();
        assert_eq!(append_string(&mut blob, ".data", true).unwrap(), 1);
        assert_eq!(blob, b"\0.data\0");
    }

    #[test]
    fn test_entries() {
        let table = StringTable::new(b"\0a\0bc\0tail");
        let entries: Vec<_> = table.entries().map(|(o, s)| (o, s.into_owned())).collect();
        assert_eq!(
            entries,
            vec![(0, String::new()), (1, "a".into()), (3, "bc".into())]
        );
    }

    #[test]
    fn test_name_cache_invalidation() {
        let mut cache = NameCache::default();
        cache.insert(3, 1, "main".into());
        cache.insert(3, 6, "exit".into());
        cache.insert(7, 1, ".text".into());
        assert_eq!(cache.get(3, 1), Some("main"));
        cache.invalidate(3);
        assert_eq!(cache.get(3, 1), None);
        assert_eq!(cache.get(7, 1), Some(".text"));
        assert_eq!(cache.len(), 1);
    }
}
