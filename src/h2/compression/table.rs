//! Header table with reference-set membership
//!
//! Entries are kept oldest first: index 0 is the next to be evicted and new
//! entries are appended at the end. The table never stores more than its byte
//! budget. Encoder and decoder run the same mutations in the same order, so
//! both ends hold identical tables after every block.

use super::HeaderField;
use std::collections::VecDeque;

/// Default entries of the table used for request headers
pub const REQUEST_DEFAULTS: &[(&str, &str)] = &[
    (":scheme", "http"),
    (":scheme", "https"),
    (":host", ""),
    (":path", "/"),
    (":method", "GET"),
    ("accept", ""),
    ("accept-charset", ""),
    ("accept-encoding", ""),
    ("accept-language", ""),
    ("cookie", ""),
    ("if-modified-since", ""),
    ("user-agent", ""),
    ("referer", ""),
    ("authorization", ""),
    ("allow", ""),
    ("cache-control", ""),
    ("connection", ""),
    ("content-length", ""),
    ("content-type", ""),
    ("date", ""),
    ("expect", ""),
    ("from", ""),
    ("if-match", ""),
    ("if-none-match", ""),
    ("if-range", ""),
    ("if-unmodified-since", ""),
    ("max-forwards", ""),
    ("proxy-authorization", ""),
    ("range", ""),
    ("via", ""),
];

/// Default entries of the table used for response headers
pub const RESPONSE_DEFAULTS: &[(&str, &str)] = &[
    (":status", "200"),
    ("age", ""),
    ("cache-control", ""),
    ("content-length", ""),
    ("content-type", ""),
    ("date", ""),
    ("etag", ""),
    ("expires", ""),
    ("last-modified", ""),
    ("server", ""),
    ("set-cookie", ""),
    ("vary", ""),
    ("via", ""),
    ("access-control-allow-origin", ""),
    ("accept-ranges", ""),
    ("allow", ""),
    ("connection", ""),
    ("content-disposition", ""),
    ("content-encoding", ""),
    ("content-language", ""),
    ("content-location", ""),
    ("content-range", ""),
    ("link", ""),
    ("location", ""),
    ("proxy-authenticate", ""),
    ("refresh", ""),
    ("retry-after", ""),
    ("strict-transport-security", ""),
    ("transfer-encoding", ""),
    ("www-authenticate", ""),
];

/// Which default list a table starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// Headers sent by the client
    Request,
    /// Headers sent by the server
    Response,
}

impl TableKind {
    fn defaults(self) -> &'static [(&'static str, &'static str)] {
        match self {
            TableKind::Request => REQUEST_DEFAULTS,
            TableKind::Response => RESPONSE_DEFAULTS,
        }
    }
}

/// One table slot
#[derive(Debug, Clone)]
pub struct TableEntry {
    /// Unique for the table's lifetime; survives index shifts
    pub id: u64,
    pub field: HeaderField,
    /// Member of the reference set
    pub referenced: bool,
}

/// Ordered, size-bounded header table
#[derive(Debug, Clone)]
pub struct HeaderTable {
    entries: VecDeque<TableEntry>,
    size: usize,
    max_size: usize,
    next_id: u64,
}

impl HeaderTable {
    /// Create a table pre-populated with the defaults for `kind`
    pub fn new(kind: TableKind, max_size: usize) -> Self {
        let mut table = HeaderTable {
            entries: VecDeque::new(),
            size: 0,
            max_size,
            next_id: 0,
        };
        for (name, value) in kind.defaults() {
            table.insert(HeaderField::new(*name, *value));
        }
        // defaults start outside the reference set
        table.clear_references();
        table
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bytes currently accounted to stored entries
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn get(&self, index: usize) -> Option<&TableEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> impl Iterator<Item = &TableEntry> {
        self.entries.iter()
    }

    /// Flip reference-set membership of the entry at `index`
    pub fn set_referenced(&mut self, index: usize, referenced: bool) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.referenced = referenced;
        }
    }

    pub fn clear_references(&mut self) {
        for entry in self.entries.iter_mut() {
            entry.referenced = false;
        }
    }

    /// First entry matching both name and value, with its index
    pub fn find_exact(&self, field: &HeaderField, referenced: bool) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.referenced == referenced && e.field == *field)
    }

    /// First entry with this name; `referenced` filters on membership when set
    pub fn find_name(&self, name: &str, referenced: Option<bool>) -> Option<usize> {
        self.entries.iter().position(|e| {
            e.field.name == name && referenced.map_or(true, |r| e.referenced == r)
        })
    }

    /// Append `field`, evicting oldest entries first; returns the new index,
    /// or `None` when the field exceeds the whole budget (table is emptied)
    pub fn insert(&mut self, field: HeaderField) -> Option<usize> {
        let needed = field.size();
        if needed > self.max_size {
            self.clear();
            return None;
        }

        while self.size + needed > self.max_size {
            self.evict_oldest();
        }

        let entry = self.new_entry(field);
        self.size += needed;
        self.entries.push_back(entry);
        Some(self.entries.len() - 1)
    }

    /// Replace the entry at `index` with `field`
    ///
    /// Eviction of oldest entries happens first. If the target itself gets
    /// evicted the field is inserted at index 0 instead. Returns the index
    /// of the stored field, or `None` when it exceeds the whole budget.
    pub fn substitute(&mut self, index: usize, field: HeaderField) -> Option<usize> {
        let needed = field.size();
        if needed > self.max_size {
            self.clear();
            return None;
        }

        let mut target = (index < self.entries.len()).then_some(index);
        loop {
            let replaced = target.map_or(0, |i| self.entries[i].field.size());
            if self.size - replaced + needed <= self.max_size {
                break;
            }
            self.evict_oldest();
            target = match target {
                Some(0) | None => None,
                Some(i) => Some(i - 1),
            };
        }

        let entry = self.new_entry(field);
        match target {
            Some(i) => {
                self.size = self.size - self.entries[i].field.size() + needed;
                self.entries[i] = entry;
                Some(i)
            }
            None => {
                self.size += needed;
                self.entries.push_front(entry);
                Some(0)
            }
        }
    }

    /// Drop every entry and reference
    pub fn clear(&mut self) {
        self.entries.clear();
        self.size = 0;
    }

    fn evict_oldest(&mut self) {
        if let Some(evicted) = self.entries.pop_front() {
            self.size -= evicted.field.size();
        }
    }

    fn new_entry(&mut self, field: HeaderField) -> TableEntry {
        let id = self.next_id;
        self.next_id += 1;
        TableEntry {
            id,
            field,
            referenced: true,
        }
    }
}
