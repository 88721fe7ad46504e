// Fault Injection Tests for seglog
// These tests damage segment files on disk to check how the log reacts

use seglog::index::ENTRY_WIDTH;
use seglog::store::LEN_WIDTH;
use seglog::{Config, Error, Log, Record};
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use tempfile::TempDir;

fn write_records(dir: &Path, count: usize) {
    let log = Log::open(dir, Config::default()).unwrap();
    for i in 0..count {
        log.append(format!("record_{:04}", i).as_bytes()).unwrap();
    }
    log.close().unwrap();
}

/// Test a store whose last frame was cut short (torn write)
#[test]
fn test_torn_store_frame() {
    env_logger::try_init().ok();

    let dir = TempDir::new().unwrap();
    write_records(dir.path(), 3);

    let store_path = dir.path().join("0.store");
    let len = fs::metadata(&store_path).unwrap().len();
    let file = fs::OpenOptions::new().write(true).open(&store_path).unwrap();
    file.set_len(len - 5).unwrap();
    drop(file);

    let log = Log::open(dir.path(), Config::default()).unwrap();
    assert_eq!(log.read(1).unwrap().value, b"record_0001".to_vec());

    // The torn record is gone and its offset is handed out again
    assert!(matches!(log.read(2), Err(Error::OffsetNotFound { offset: 2 })));
    assert_eq!(log.highest_offset(), Some(1));
    assert_eq!(log.append(b"after tear").unwrap(), 2);
    assert_eq!(log.read(2).unwrap().value, b"after tear".to_vec());
    assert_eq!(log.append(b"and more").unwrap(), 3);

    // The store still reads front to back as whole frames
    let mut raw = Vec::new();
    log.reader().unwrap().read_to_end(&mut raw).unwrap();

    let mut cursor = &raw[..];
    let mut offsets = Vec::new();
    while !cursor.is_empty() {
        let len = u64::from_be_bytes(cursor[..LEN_WIDTH as usize].try_into().unwrap()) as usize;
        let frame = &cursor[LEN_WIDTH as usize..LEN_WIDTH as usize + len];
        offsets.push(Record::decode(frame).unwrap().offset);
        cursor = &cursor[LEN_WIDTH as usize + len..];
    }
    assert_eq!(offsets, vec![0, 1, 2, 3]);
}

/// Test a torn frame header with nothing else to recover
#[test]
fn test_torn_frame_header() {
    let dir = TempDir::new().unwrap();
    write_records(dir.path(), 1);

    let store_path = dir.path().join("0.store");
    let file = fs::OpenOptions::new().write(true).open(&store_path).unwrap();
    file.set_len(LEN_WIDTH - 2).unwrap();
    drop(file);

    let log = Log::open(dir.path(), Config::default()).unwrap();
    assert_eq!(log.highest_offset(), None);
    assert_eq!(log.append(b"fresh start").unwrap(), 0);
    assert_eq!(log.read(0).unwrap().value, b"fresh start".to_vec());
    log.close().unwrap();

    let expected = LEN_WIDTH + Record::new(b"fresh start".to_vec()).encode().unwrap().len() as u64;
    assert_eq!(fs::metadata(&store_path).unwrap().len(), expected);
}

/// Test a corrupted record body
#[test]
fn test_corrupted_record_body() {
    let dir = TempDir::new().unwrap();
    write_records(dir.path(), 2);

    // Overwrite the encoded value length of the first record
    let store_path = dir.path().join("0.store");
    let mut raw = fs::read(&store_path).unwrap();
    let start = LEN_WIDTH as usize;
    raw[start..start + 8].copy_from_slice(&[0xFF; 8]);
    fs::write(&store_path, &raw).unwrap();

    let log = Log::open(dir.path(), Config::default()).unwrap();
    assert!(matches!(log.read(0), Err(Error::Serialization(_))));
    assert_eq!(log.read(1).unwrap().value, b"record_0001".to_vec());
}

/// Test garbage appended to an index file
#[test]
fn test_garbage_index_tail() {
    env_logger::try_init().ok();

    let dir = TempDir::new().unwrap();
    write_records(dir.path(), 4);

    let index_path = dir.path().join("0.index");
    let mut file = fs::OpenOptions::new().append(true).open(&index_path).unwrap();
    file.write_all(&[0xFF; ENTRY_WIDTH as usize]).unwrap();
    file.write_all(b"junk").unwrap();
    file.sync_all().unwrap();
    drop(file);

    let log = Log::open(dir.path(), Config::default()).unwrap();
    assert_eq!(log.highest_offset(), Some(3));
    assert_eq!(log.append(b"clean").unwrap(), 4);
    log.close().unwrap();

    // The rewritten index holds exactly the real entries
    assert_eq!(fs::metadata(&index_path).unwrap().len(), 5 * ENTRY_WIDTH);
}

/// Test an index pointing at a store that was emptied
#[test]
fn test_index_without_store_data() {
    env_logger::try_init().ok();

    let dir = TempDir::new().unwrap();
    write_records(dir.path(), 3);

    fs::write(dir.path().join("0.store"), b"").unwrap();

    let log = Log::open(dir.path(), Config::default()).unwrap();
    assert_eq!(log.highest_offset(), None);
    assert_eq!(log.append(b"restart").unwrap(), 0);
    assert_eq!(log.read(0).unwrap().value, b"restart".to_vec());
}

/// Test an index file larger than the configured limit
#[test]
fn test_index_larger_than_limit() {
    let dir = TempDir::new().unwrap();
    write_records(dir.path(), 10);

    let result = Log::open(dir.path(), Config::new().max_index_bytes(ENTRY_WIDTH * 4));
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
}

/// Test handling of missing data directory
#[test]
fn test_missing_directory_handling() {
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("nonexistent").join("nested");

    // Should create directory if it doesn't exist
    let log = Log::open(&log_path, Config::default()).unwrap();
    assert!(log_path.exists());

    log.append(b"value").unwrap();
    assert_eq!(log.read(0).unwrap().value, b"value".to_vec());
}

/// Test that a file where the directory should be fails the open
#[test]
fn test_directory_is_a_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("occupied");
    fs::write(&path, b"not a directory").unwrap();

    let result = Log::open(&path, Config::default());
    assert!(matches!(result, Err(Error::Io(_))));
}
