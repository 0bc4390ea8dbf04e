use bytes::Bytes;
use std::cmp::Ordering;

/// Size of a length prefix (`u32`) in the on-disk encoding.
pub const LEN_BYTES: usize = 4;
/// Size of the timestamp field (`i64`) in the on-disk encoding.
pub const TS_BYTES: usize = 8;

/// A single versioned record: a live value or a tombstone for `key` at `ts`.
///
/// `value == None` signifies a tombstone (delete). Entries order by key
/// ascending, then timestamp **descending**, so the newest version of a key
/// is always met first by an ordered scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableEntry {
    key: Bytes,
    value: Option<Bytes>,
    ts: i64,
}

impl TableEntry {
    pub fn upsert(key: impl Into<Bytes>, value: impl Into<Bytes>, ts: i64) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
            ts,
        }
    }

    pub fn tombstone(key: impl Into<Bytes>, ts: i64) -> Self {
        Self {
            key: key.into(),
            value: None,
            ts,
        }
    }

    #[must_use]
    pub fn key(&self) -> &Bytes {
        &self.key
    }

    #[must_use]
    pub fn value(&self) -> Option<&Bytes> {
        self.value.as_ref()
    }

    #[must_use]
    pub fn ts(&self) -> i64 {
        self.ts
    }

    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// Number of bytes this entry occupies in a table file:
    /// `key_len + key + ts` and, when live, `value_len + value`.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        let head = LEN_BYTES + self.key.len() + TS_BYTES;
        match &self.value {
            Some(v) => head + LEN_BYTES + v.len(),
            None => head,
        }
    }

    /// Key/value pair for live entries, `None` for tombstones.
    pub fn into_live(self) -> Option<(Bytes, Bytes)> {
        let key = self.key;
        self.value.map(|v| (key, v))
    }

    /// Entry order: key ascending, then timestamp descending.
    #[must_use]
    pub fn order(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| other.ts.cmp(&self.ts))
    }
}

impl PartialOrd for TableEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TableEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order(other)
            .then_with(|| self.value.cmp(&other.value))
    }
}
