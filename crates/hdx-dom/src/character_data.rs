//! Character data buffers
//!
//! Content of text, comment and CDATA nodes. Edits are recorded against the
//! last materialized string and folded into it on the first read, so a run of
//! appends or splices costs one rebuild instead of one per edit.
//!
//! Offsets and counts are in characters.

use std::cell::OnceCell;

use crate::{DomError, DomResult};

#[derive(Debug, Clone)]
enum Edit {
    Append(String),
    Insert(usize, String),
    Delete(usize, usize),
}

/// Buffered character data
#[derive(Debug, Clone, Default)]
pub struct CharacterData {
    base: String,
    pending: Vec<Edit>,
    /// Length in chars once every pending edit is applied
    len: usize,
    materialized: OnceCell<String>,
}

impl CharacterData {
    pub fn new(data: impl Into<String>) -> Self {
        let base = data.into();
        Self {
            len: base.chars().count(),
            base,
            pending: Vec::new(),
            materialized: OnceCell::new(),
        }
    }

    /// Current content, folding buffered edits if needed
    pub fn data(&self) -> &str {
        if self.pending.is_empty() {
            return &self.base;
        }
        self.materialized.get_or_init(|| {
            let mut out = self.base.clone();
            for edit in &self.pending {
                apply(&mut out, edit);
            }
            out
        })
    }

    /// Length in characters
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of edits not yet folded into the canonical string
    pub fn pending_edits(&self) -> usize {
        if self.materialized.get().is_some() {
            0
        } else {
            self.pending.len()
        }
    }

    /// Replace the whole content
    pub fn set(&mut self, data: impl Into<String>) {
        *self = Self::new(data);
    }

    pub fn append(&mut self, data: &str) {
        self.settle();
        self.len += data.chars().count();
        self.pending.push(Edit::Append(data.to_string()));
    }

    pub fn insert(&mut self, offset: usize, data: &str) -> DomResult<()> {
        self.check_offset(offset)?;
        self.settle();
        self.len += data.chars().count();
        self.pending.push(Edit::Insert(offset, data.to_string()));
        Ok(())
    }

    /// Delete up to `count` characters; a count running past the end is clamped
    pub fn delete(&mut self, offset: usize, count: usize) -> DomResult<()> {
        self.check_offset(offset)?;
        self.settle();
        let count = count.min(self.len - offset);
        self.len -= count;
        self.pending.push(Edit::Delete(offset, count));
        Ok(())
    }

    pub fn replace(&mut self, offset: usize, count: usize, data: &str) -> DomResult<()> {
        self.delete(offset, count)?;
        self.insert(offset, data)
    }

    pub fn substring(&self, offset: usize, count: usize) -> DomResult<String> {
        self.check_offset(offset)?;
        Ok(self.data().chars().skip(offset).take(count).collect())
    }

    fn check_offset(&self, offset: usize) -> DomResult<()> {
        if offset > self.len {
            return Err(DomError::IndexSize {
                offset,
                length: self.len,
            });
        }
        Ok(())
    }

    /// Adopt a materialized string as the new base before recording more edits
    fn settle(&mut self) {
        if let Some(done) = self.materialized.take() {
            self.base = done;
            self.pending.clear();
        }
    }
}

impl PartialEq for CharacterData {
    fn eq(&self, other: &Self) -> bool {
        self.data() == other.data()
    }
}

impl Eq for CharacterData {}

fn byte_offset(s: &str, chars: usize) -> usize {
    s.char_indices().nth(chars).map_or(s.len(), |(i, _)| i)
}

fn apply(out: &mut String, edit: &Edit) {
    match edit {
        Edit::Append(s) => out.push_str(s),
        Edit::Insert(at, s) => {
            let at = byte_offset(out, *at);
            out.insert_str(at, s);
        }
        Edit::Delete(at, count) => {
            let start = byte_offset(out, *at);
            let end = start + byte_offset(&out[start..], *count);
            out.replace_range(start..end, "");
        }
    }
}
