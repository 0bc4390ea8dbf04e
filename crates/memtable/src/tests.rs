use super::*;
use std::collections::HashSet;
use std::thread;

fn keys(iter: EntryIter) -> Vec<Vec<u8>> {
    iter.map(|e| e.key().to_vec()).collect()
}

// -------------------- TableEntry --------------------

#[test]
fn entries_order_by_key_then_newest_first() {
    let mut entries = vec![
        TableEntry::upsert("b", "1", 1),
        TableEntry::upsert("a", "old", 1),
        TableEntry::tombstone("a", 3),
        TableEntry::upsert("a", "mid", 2),
    ];
    entries.sort();

    let order: Vec<(&[u8], i64)> = entries.iter().map(|e| (e.key().as_ref(), e.ts())).collect();
    assert_eq!(
        order,
        vec![(b"a".as_ref(), 3), (b"a".as_ref(), 2), (b"a".as_ref(), 1), (b"b".as_ref(), 1)]
    );
}

#[test]
fn encoded_size_counts_value_only_when_live() {
    assert_eq!(TableEntry::upsert("key", "value", 1).encoded_size(), 4 + 3 + 8 + 4 + 5);
    assert_eq!(TableEntry::tombstone("key", 1).encoded_size(), 4 + 3 + 8);
    assert_eq!(TableEntry::upsert("", "", 1).encoded_size(), 16);
}

#[test]
fn tombstone_has_no_value() {
    let t = TableEntry::tombstone("k", 7);
    assert!(t.is_tombstone());
    assert!(t.value().is_none());
    assert!(t.into_live().is_none());

    let live = TableEntry::upsert("k", "v", 8);
    assert_eq!(live.into_live(), Some((Bytes::from("k"), Bytes::from("v"))));
}

// -------------------- LogicalClock --------------------

#[test]
fn clock_is_strictly_increasing() {
    let clock = LogicalClock::new();
    let mut last = 0;
    for _ in 0..10_000 {
        let ts = clock.now();
        assert!(ts > last, "{} should be greater than {}", ts, last);
        last = ts;
    }
}

#[test]
fn clock_is_unique_across_threads() {
    let clock = Arc::new(LogicalClock::new());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let clock = Arc::clone(&clock);
            thread::spawn(move || (0..1000).map(|_| clock.now()).collect::<Vec<_>>())
        })
        .collect();

    let mut seen = HashSet::new();
    for h in handles {
        for ts in h.join().unwrap() {
            assert!(ts > 0);
            assert!(seen.insert(ts), "duplicate timestamp {}", ts);
        }
    }
}

// -------------------- MemTable writes --------------------

#[test]
fn upsert_get_remove() {
    let m = MemTable::new();
    m.upsert("k1", "v1", 1);
    assert_eq!(m.count(), 1);
    assert_eq!(m.get(b"k1").unwrap().value().unwrap().as_ref(), b"v1");

    // newer put replaces
    m.upsert("k1", "v2", 2);
    assert_eq!(m.get(b"k1").unwrap().value().unwrap().as_ref(), b"v2");

    // remove leaves a tombstone behind
    m.remove("k1", 3);
    let e = m.get(b"k1").unwrap();
    assert!(e.is_tombstone());
    assert_eq!(e.ts(), 3);
    assert_eq!(m.count(), 1);

    assert!(m.get(b"missing").is_none());
}

#[test]
fn older_timestamp_never_overwrites_newer() {
    let m = MemTable::new();
    m.upsert("k", "new", 5);
    m.upsert("k", "old", 3);
    m.remove("k", 4);

    let e = m.get(b"k").unwrap();
    assert_eq!(e.ts(), 5);
    assert_eq!(e.value().unwrap().as_ref(), b"new");
}

#[test]
fn size_accumulates_every_accepted_write() {
    let m = MemTable::new();
    assert_eq!(m.size_in_bytes(), 0);

    m.upsert("a", "aaa", 1);
    assert_eq!(m.size_in_bytes(), 4 + 1 + 8 + 4 + 3);

    m.upsert("a", "bb", 2);
    assert_eq!(m.size_in_bytes(), 20 + 19);

    m.remove("a", 3);
    assert_eq!(m.size_in_bytes(), 20 + 19 + 13);

    // rejected stale write is not counted
    m.upsert("a", "zz", 1);
    assert_eq!(m.size_in_bytes(), 52);
}

// -------------------- MemTable iteration --------------------

#[test]
fn iter_from_starts_at_successor_of_absent_key() {
    let m = MemTable::new();
    for k in ["a", "c", "e"] {
        m.upsert(k, "v", 1);
    }

    assert_eq!(keys(m.iter_all()), vec![b"a".to_vec(), b"c".to_vec(), b"e".to_vec()]);
    assert_eq!(keys(m.iter_from(b"b")), vec![b"c".to_vec(), b"e".to_vec()]);
    assert_eq!(keys(m.iter_from(b"c")), vec![b"c".to_vec(), b"e".to_vec()]);
    assert!(keys(m.iter_from(b"f")).is_empty());
}

#[test]
fn range_has_exclusive_upper_bound() {
    let m = MemTable::new();
    for k in ["a", "b", "c", "d"] {
        m.upsert(k, "v", 1);
    }

    assert_eq!(keys(m.range(b"b", Some(b"d"))), vec![b"b".to_vec(), b"c".to_vec()]);
    assert!(keys(m.range(b"b", Some(b"b"))).is_empty());
    assert!(keys(m.range(b"d", Some(b"a"))).is_empty());
    assert_eq!(keys(m.range(b"c", None)), vec![b"c".to_vec(), b"d".to_vec()]);
}

#[test]
fn iterator_includes_tombstones() {
    let m = MemTable::new();
    m.upsert("a", "1", 1);
    m.remove("b", 2);

    let entries: Vec<TableEntry> = m.iter_all().collect();
    assert_eq!(entries.len(), 2);
    assert!(!entries[0].is_tombstone());
    assert!(entries[1].is_tombstone());
}

#[test]
fn iterator_sees_inserts_ahead_of_cursor() {
    let m = MemTable::new();
    m.upsert("a", "1", 1);
    m.upsert("m", "1", 1);

    let mut it = m.iter_all();
    assert_eq!(it.next().unwrap().key().as_ref(), b"a");
    m.upsert("c", "1", 2);
    assert_eq!(it.next().unwrap().key().as_ref(), b"c");
    assert_eq!(it.next().unwrap().key().as_ref(), b"m");
    assert!(it.next().is_none());
}

#[test]
fn concurrent_writers_do_not_lose_keys() {
    let m = Arc::new(MemTable::new());
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let m = Arc::clone(&m);
            thread::spawn(move || {
                for i in 0..500 {
                    m.upsert(format!("t{}-{:04}", t, i), "v", i + 1);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(m.count(), 2000);
    let all = keys(m.iter_all());
    let mut sorted = all.clone();
    sorted.sort();
    assert_eq!(all, sorted);
}
