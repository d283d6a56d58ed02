//! Tests for SSTable implementation
//!
//! These tests verify:
//! - Exact on-disk byte layout
//! - Round-trip from memtable to table
//! - Binary search for the first key >= target
//! - Scans from arbitrary positions
//! - Rejection of malformed files

use std::fs;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use lsmkv::memtable::MemTable;
use lsmkv::storage::sstable::serialize;
use lsmkv::storage::{SSTable, SSTableBuilder};
use lsmkv::{Cell, KvError, Table, Value};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_sstable() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("0.dat");
    (temp_dir, path)
}

fn live(key: &[u8], ts: u64, value: &[u8]) -> Cell {
    Cell::new(
        Bytes::copy_from_slice(key),
        Value::live(ts, Bytes::copy_from_slice(value)),
    )
}

fn dead(key: &[u8], ts: u64) -> Cell {
    Cell::new(Bytes::copy_from_slice(key), Value::tombstone(ts))
}

/// Create an SSTable with numbered entries
fn create_sstable_with_entries(path: &Path, count: usize) -> SSTable {
    // Keys must be added in sorted order
    let cells = (0..count).map(|i| {
        let key = format!("key{:05}", i); // Zero-padded for lexicographic order
        let value = format!("value{}", i);
        live(key.as_bytes(), i as u64 + 1, value.as_bytes())
    });
    serialize(path, cells, false).unwrap();
    SSTable::open(path).unwrap()
}

fn collect_from(table: &SSTable, from: &[u8]) -> Vec<Cell> {
    table.iter_from(from).unwrap().map(|r| r.unwrap()).collect()
}

// =============================================================================
// Byte Layout Tests
// =============================================================================

#[test]
fn test_layout_is_bit_exact() {
    let (_temp, path) = setup_temp_sstable();

    serialize(&path, vec![live(b"ab", 7, b"xyz"), dead(b"c", 9)], false).unwrap();

    let expected: Vec<u8> = [
        // row 0 @ 0: key_len, key, timestamp, flag, value_len, value
        &[0, 0, 0, 2][..],
        b"ab",
        &[0, 0, 0, 0, 0, 0, 0, 7],
        &[0],
        &[0, 0, 0, 3],
        b"xyz",
        // row 1 @ 22: key_len, key, timestamp, flag (no value)
        &[0, 0, 0, 1],
        b"c",
        &[0, 0, 0, 0, 0, 0, 0, 9],
        &[1],
        // offsets
        &[0, 0, 0, 0],
        &[0, 0, 0, 22],
        // row count
        &[0, 0, 0, 2],
    ]
    .concat();

    assert_eq!(fs::read(&path).unwrap(), expected);
}

#[test]
fn test_empty_table_is_just_a_row_count() {
    let (_temp, path) = setup_temp_sstable();

    let summary = serialize(&path, Vec::new(), false).unwrap();

    assert_eq!(summary.row_count, 0);
    assert_eq!(fs::read(&path).unwrap(), vec![0, 0, 0, 0]);

    let table = SSTable::open(&path).unwrap();
    assert_eq!(table.row_count(), 0);
    assert_eq!(table.data_region_size(), 0);
    assert!(collect_from(&table, b"").is_empty());
}

#[test]
fn test_reads_hand_built_file() {
    let (_temp, path) = setup_temp_sstable();

    // Written by hand: one live row, one tombstone
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&1u32.to_be_bytes());
    bytes.extend_from_slice(b"k");
    bytes.extend_from_slice(&42u64.to_be_bytes());
    bytes.push(0);
    bytes.extend_from_slice(&2u32.to_be_bytes());
    bytes.extend_from_slice(b"vv");
    let second = bytes.len() as u32;
    bytes.extend_from_slice(&1u32.to_be_bytes());
    bytes.extend_from_slice(b"m");
    bytes.extend_from_slice(&43u64.to_be_bytes());
    bytes.push(1);
    bytes.extend_from_slice(&0u32.to_be_bytes());
    bytes.extend_from_slice(&second.to_be_bytes());
    bytes.extend_from_slice(&2u32.to_be_bytes());
    fs::write(&path, &bytes).unwrap();

    let table = SSTable::open(&path).unwrap();
    let cells = collect_from(&table, b"");

    assert_eq!(cells, vec![live(b"k", 42, b"vv"), dead(b"m", 43)]);
}

// =============================================================================
// Builder Tests
// =============================================================================

#[test]
fn test_builder_reports_summary() {
    let (_temp, path) = setup_temp_sstable();

    let mut builder = SSTableBuilder::new(&path).unwrap().sync(false);
    builder.add(&live(b"apple", 1, b"1")).unwrap();
    builder.add(&dead(b"banana", 2)).unwrap();
    assert_eq!(builder.row_count(), 2);
    let summary = builder.finish().unwrap();

    assert_eq!(summary.row_count, 2);
    assert_eq!(summary.path, path);
    assert_eq!(summary.file_size, fs::metadata(&path).unwrap().len());
}

#[test]
fn test_builder_rejects_unsorted_keys() {
    let (_temp, path) = setup_temp_sstable();

    let mut builder = SSTableBuilder::new(&path).unwrap();
    builder.add(&live(b"b", 1, b"1")).unwrap();

    assert!(matches!(
        builder.add(&live(b"a", 2, b"2")),
        Err(KvError::Storage(_))
    ));
    assert!(matches!(
        builder.add(&live(b"b", 3, b"3")),
        Err(KvError::Storage(_))
    ));
}

// =============================================================================
// Round-Trip Tests
// =============================================================================

#[test]
fn test_memtable_round_trip() {
    let (_temp, path) = setup_temp_sstable();

    let mut memtable = MemTable::new();
    memtable.upsert(b"alpha", b"");
    memtable.upsert(&[0x00, 0xFF], &[0xDE, 0xAD, 0xBE, 0xEF]);
    memtable.remove(b"beta");
    memtable.upsert(b"gamma", &vec![0x42; 4096]);

    let expected: Vec<Cell> = memtable.iter_from(b"").collect();
    serialize(&path, memtable.iter_from(b""), false).unwrap();

    let table = SSTable::open(&path).unwrap();
    assert_eq!(collect_from(&table, b""), expected);
}

// =============================================================================
// Binary Search Tests
// =============================================================================

#[test]
fn test_find_exact_match() {
    let (_temp, path) = setup_temp_sstable();
    let table = create_sstable_with_entries(&path, 100);

    for i in [0usize, 1, 37, 50, 99] {
        let key = format!("key{:05}", i);
        assert_eq!(table.find_first_row_with_key_gte(key.as_bytes()).unwrap(), i);
    }
}

#[test]
fn test_find_between_keys() {
    let (_temp, path) = setup_temp_sstable();
    let table = create_sstable_with_entries(&path, 10);

    // "key00003x" sits between rows 3 and 4
    assert_eq!(table.find_first_row_with_key_gte(b"key00003x").unwrap(), 4);
    // Before everything
    assert_eq!(table.find_first_row_with_key_gte(b"").unwrap(), 0);
    assert_eq!(table.find_first_row_with_key_gte(b"a").unwrap(), 0);
    // Past the end
    assert_eq!(table.find_first_row_with_key_gte(b"zzz").unwrap(), 10);
}

#[test]
fn test_find_in_empty_table() {
    let (_temp, path) = setup_temp_sstable();
    let table = create_sstable_with_entries(&path, 0);

    assert_eq!(table.find_first_row_with_key_gte(b"anything").unwrap(), 0);
}

#[test]
fn test_key_at_and_row_at() {
    let (_temp, path) = setup_temp_sstable();
    let table = create_sstable_with_entries(&path, 5);

    assert_eq!(table.key_at(2).unwrap(), Bytes::from_static(b"key00002"));
    assert_eq!(table.row_at(4).unwrap(), live(b"key00004", 5, b"value4"));
}

#[test]
fn test_row_access_past_end_is_error() {
    let (_temp, path) = setup_temp_sstable();
    let table = create_sstable_with_entries(&path, 3);

    assert!(matches!(table.key_at(3), Err(KvError::Storage(_))));
    assert!(matches!(table.row_at(3), Err(KvError::Storage(_))));
    assert!(matches!(table.row_at(usize::MAX), Err(KvError::Storage(_))));
}

// =============================================================================
// Scan Tests
// =============================================================================

#[test]
fn test_scan_from_middle() {
    let (_temp, path) = setup_temp_sstable();
    let table = create_sstable_with_entries(&path, 20);

    let cells = collect_from(&table, b"key00015");

    assert_eq!(cells.len(), 5);
    assert_eq!(cells[0].key, Bytes::from_static(b"key00015"));
    assert_eq!(cells[4].key, Bytes::from_static(b"key00019"));
}

#[test]
fn test_scan_past_end_is_empty() {
    let (_temp, path) = setup_temp_sstable();
    let table = create_sstable_with_entries(&path, 20);

    assert!(collect_from(&table, b"zzz").is_empty());
}

#[test]
fn test_scan_is_restartable() {
    let (_temp, path) = setup_temp_sstable();
    let table = create_sstable_with_entries(&path, 8);

    let first = collect_from(&table, b"key00002");
    let second = collect_from(&table, b"key00002");

    assert_eq!(first, second);
    assert_eq!(first.len(), 6);
}

#[test]
fn test_scans_outlive_table_handle() {
    let (_temp, path) = setup_temp_sstable();
    let table = create_sstable_with_entries(&path, 3);

    let iter = table.scan_from(b"").unwrap();
    table.close();

    assert_eq!(iter.map(|r| r.unwrap()).count(), 3);
}

// =============================================================================
// Format Validation Tests
// =============================================================================

#[test]
fn test_open_rejects_short_file() {
    let (_temp, path) = setup_temp_sstable();
    fs::write(&path, [0u8, 1]).unwrap();

    assert!(matches!(SSTable::open(&path), Err(KvError::Format(_))));
}

#[test]
fn test_open_rejects_row_count_larger_than_file() {
    let (_temp, path) = setup_temp_sstable();
    // Claims 1000 rows in an 8-byte file
    let mut bytes = vec![0u8; 4];
    bytes.extend_from_slice(&1000u32.to_be_bytes());
    fs::write(&path, bytes).unwrap();

    assert!(matches!(SSTable::open(&path), Err(KvError::Format(_))));
}

#[test]
fn test_open_rejects_offset_outside_data_region() {
    let (_temp, path) = setup_temp_sstable();
    create_sstable_with_entries(&path, 2);

    // Point row 1 far past the data region
    let mut bytes = fs::read(&path).unwrap();
    let len = bytes.len();
    bytes[len - 8..len - 4].copy_from_slice(&5000u32.to_be_bytes());
    fs::write(&path, bytes).unwrap();

    assert!(matches!(SSTable::open(&path), Err(KvError::Format(_))));
}

#[test]
fn test_bad_tombstone_flag_fails_on_read() {
    let (_temp, path) = setup_temp_sstable();
    serialize(&path, vec![dead(b"k", 1)], false).unwrap();

    // Flag byte sits after key_len (4) + key (1) + timestamp (8)
    let mut bytes = fs::read(&path).unwrap();
    bytes[13] = 7;
    fs::write(&path, bytes).unwrap();

    let table = SSTable::open(&path).unwrap();
    let mut iter = table.iter_from(b"").unwrap();

    assert!(matches!(iter.next(), Some(Err(KvError::Format(_)))));
    assert!(iter.next().is_none());
}

#[test]
fn test_open_missing_file_is_io_error() {
    let (_temp, path) = setup_temp_sstable();

    assert!(matches!(SSTable::open(&path), Err(KvError::Io(_))));
}
