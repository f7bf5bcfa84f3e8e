use std::ops::Range;

use embedded_storage::{ReadStorage, Storage};
use sdcard::{
    BlockDevice, CardCapacity, CardInfo, RamCard, SdCardVersion, SdDeviceError, StorageCard,
    SD_SECTOR_SIZE,
};

use super::{csv::parse_leading_int, SdSession};
use crate::{
    config::SdConfig, CsvRecord, FsError, ListedEntry, WalkControl, WalkEvent, SD_PATH_MAX,
};

const TEST_CARD_SECTORS: u32 = 4096;

type TestSession = SdSession<RamCard, Vec<String>>;

fn mounted_session() -> TestSession {
    mounted_with_config(SdConfig::default())
}

fn mounted_with_config(config: SdConfig) -> TestSession {
    let mut session =
        SdSession::with_config(RamCard::new(TEST_CARD_SECTORS), Vec::<String>::new(), config);
    session.format().unwrap();
    session.mount().unwrap();
    session.console_mut().clear();
    session
}

fn lines<D: BlockDevice>(session: &mut SdSession<D, Vec<String>>) -> Vec<String> {
    std::mem::take(session.console_mut())
}

#[test]
fn mount_reports_space_and_card_metadata() {
    let mut session = SdSession::with_console(RamCard::new(TEST_CARD_SECTORS), Vec::<String>::new());
    session.format().unwrap();
    session.mount().unwrap();

    let out = lines(&mut session);
    assert_eq!(out[0], "Format card: OK");
    assert_eq!(out[1], "Attempting mount at 0:/...");
    assert_eq!(out[2], "SD card mounted successfully at 0:/");
    assert!(out[3].starts_with("💾 Total: "), "{}", out[3]);
    assert_eq!(out[4], "Card Type: SDSC");
    assert_eq!(out[5], "Card Version: CARD_V2_X");
    assert_eq!(out[6], "Card Class: 1461");
    assert!(session.is_mounted());
    assert_eq!(
        session.card_info().map(|info| info.sector_count),
        Some(TEST_CARD_SECTORS)
    );
}

#[test]
fn mount_uses_card_reported_metadata() {
    let info = CardInfo {
        capacity: CardCapacity::High,
        version: SdCardVersion::V1,
        class: 0x1B5,
        sector_count: 0,
    };
    let card = RamCard::new(TEST_CARD_SECTORS).with_info(info);
    let mut session = SdSession::with_console(card, Vec::<String>::new());
    session.format().unwrap();
    session.mount().unwrap();

    let out = lines(&mut session);
    assert!(out.contains(&"Card Type: SDHC/SDXC".to_string()));
    assert!(out.contains(&"Card Version: CARD_V1_X".to_string()));
    assert!(out.contains(&"Card Class: 437".to_string()));
}

#[test]
fn mount_blank_card_reports_no_filesystem() {
    let mut session = SdSession::with_console(RamCard::new(64), Vec::<String>::new());
    assert_eq!(session.mount(), Err(FsError::NoFilesystem));
    assert_eq!(
        lines(&mut session),
        vec!["Attempting mount at 0:/...", "Mount failed with code: 13"]
    );
    assert!(!session.is_mounted());
}

#[test]
fn mount_without_card_reports_not_ready() {
    let mut card = RamCard::new(64);
    card.eject();
    let mut session = SdSession::with_console(card, Vec::<String>::new());
    assert_eq!(session.mount(), Err(FsError::NotReady));
    assert_eq!(lines(&mut session)[1], "Mount failed with code: 3");
}

#[test]
fn card_is_initialized_on_first_access() {
    let mut session = SdSession::with_console(RamCard::new(TEST_CARD_SECTORS), Vec::<String>::new());
    assert_eq!(session.with_device(|card| card.init_count()), Ok(0));
    session.format().unwrap();
    assert_eq!(session.with_device(|card| card.init_count()), Ok(1));
}

#[test]
fn unmount_forces_card_init_on_next_mount() {
    let mut session = mounted_session();
    assert_eq!(session.with_device(|card| card.init_count()), Ok(1));
    session.unmount().unwrap();
    session.mount().unwrap();
    assert_eq!(session.with_device(|card| card.init_count()), Ok(2));
}

#[test]
fn failed_mount_recovers_after_card_insert() {
    let mut card = RamCard::new(TEST_CARD_SECTORS);
    card.eject();
    let mut session = SdSession::with_console(card, Vec::<String>::new());
    assert_eq!(session.mount(), Err(FsError::NotReady));

    session.with_device(|card| card.insert()).unwrap();
    session.format().unwrap();
    assert_eq!(session.mount(), Ok(()));
}

#[test]
fn remount_replaces_the_previous_volume() {
    let mut session = mounted_session();
    session.write("keep.txt", "still here").unwrap();
    session.mount().unwrap();
    let mut buf = [0u8; 32];
    assert_eq!(session.read("keep.txt", &mut buf), Ok(10));
}

#[test]
fn unmount_twice_reports_not_enabled() {
    let mut session = mounted_session();
    assert_eq!(session.unmount(), Ok(()));
    assert_eq!(session.unmount(), Err(FsError::NotEnabled));
    assert_eq!(
        lines(&mut session),
        vec!["SD card unmounted: OK", "SD card unmounted: Failed"]
    );
    assert_eq!(session.card_info(), None);
}

#[test]
fn get_space_requires_mount() {
    let mut session = mounted_session();
    let space = session.get_space().unwrap();
    assert!(space.total_kb > 0);
    assert!(space.free_kb <= space.total_kb);
    session.unmount().unwrap();
    lines(&mut session);

    assert_eq!(session.get_space(), Err(FsError::NotEnabled));
    assert!(lines(&mut session).is_empty());
}

#[test]
fn get_space_tracks_allocation() {
    let mut session = mounted_session();
    let before = session.get_space().unwrap();
    session.write("big.bin", &"x".repeat(64 * 1024)).unwrap();
    let after = session.get_space().unwrap();
    assert_eq!(after.total_kb, before.total_kb);
    assert!(before.free_kb - after.free_kb >= 64);
}

#[test]
fn format_is_refused_while_mounted() {
    let mut session = mounted_session();
    assert_eq!(session.format(), Err(FsError::Denied));
    assert_eq!(lines(&mut session), vec!["Format card: Failed"]);
}

#[test]
fn write_then_read_round_trips() {
    let mut session = mounted_session();
    session.write("0:/notes.txt", "hello sd").unwrap();
    let mut buf = [0xAAu8; 64];
    assert_eq!(session.read("0:/notes.txt", &mut buf), Ok(8));
    assert_eq!(&buf[..8], b"hello sd");
    assert_eq!(buf[8], 0);
    assert_eq!(
        lines(&mut session),
        vec![
            "Write 8 bytes to 0:/notes.txt",
            "Read 8 bytes from 0:/notes.txt"
        ]
    );
}

#[test]
fn write_truncates_existing_content() {
    let mut session = mounted_session();
    session.write("a.txt", "a much longer first version").unwrap();
    session.write("a.txt", "short").unwrap();
    let mut buf = [0u8; 64];
    assert_eq!(session.read("a.txt", &mut buf), Ok(5));
    assert_eq!(&buf[..5], b"short");
}

#[test]
fn append_extends_and_creates() {
    let mut session = mounted_session();
    session.append("log.txt", "one,").unwrap();
    session.append("log.txt", "two").unwrap();
    let mut buf = [0u8; 16];
    assert_eq!(session.read("log.txt", &mut buf), Ok(7));
    assert_eq!(&buf[..7], b"one,two");
    assert_eq!(lines(&mut session)[1], "Appended 3 bytes to log.txt");
}

#[test]
fn read_truncates_to_capacity_minus_one() {
    let mut session = mounted_session();
    session.write("long.txt", "hello world").unwrap();
    let mut buf = [0xFFu8; 5];
    assert_eq!(session.read("long.txt", &mut buf), Ok(4));
    assert_eq!(&buf, b"hell\0");
}

#[test]
fn read_spanning_clusters_is_complete() {
    let mut session = mounted_session();
    let text: String = (0..5000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
    session.write("span.txt", &text).unwrap();
    let mut buf = vec![0u8; 6000];
    assert_eq!(session.read("span.txt", &mut buf), Ok(5000));
    assert_eq!(&buf[..5000], text.as_bytes());
}

#[test]
fn read_missing_file_leaves_buffer_untouched() {
    let mut session = mounted_session();
    let mut buf = [0x55u8; 8];
    assert_eq!(session.read("missing.txt", &mut buf), Err(FsError::NoFile));
    assert_eq!(buf, [0x55u8; 8]);
    assert_eq!(lines(&mut session), vec!["f_open failed with code: 4"]);
}

#[test]
fn read_with_empty_buffer_is_invalid_parameter() {
    let mut session = mounted_session();
    session.write("a.txt", "x").unwrap();
    assert_eq!(
        session.read("a.txt", &mut []),
        Err(FsError::InvalidParameter)
    );
}

#[test]
fn operations_need_a_mounted_volume() {
    let mut session = SdSession::with_console(RamCard::new(TEST_CARD_SECTORS), Vec::<String>::new());
    assert_eq!(session.write("a.txt", "x"), Err(FsError::NotEnabled));
    assert_eq!(session.delete("a.txt"), Err(FsError::NotEnabled));
    assert_eq!(session.read("a.txt", &mut [0u8; 4]), Err(FsError::NotEnabled));
    assert_eq!(session.create_directory("d"), Err(FsError::NotEnabled));
    let out = lines(&mut session);
    assert!(out.contains(&"Delete a.txt: Failed".to_string()));
    assert!(out.contains(&"f_open failed with code: 12".to_string()));
}

#[test]
fn foreign_drive_and_bad_names_are_rejected() {
    let mut session = mounted_session();
    assert_eq!(session.write("1:/a.txt", "x"), Err(FsError::InvalidDrive));
    assert_eq!(session.write("bad?.txt", "x"), Err(FsError::InvalidName));
    assert_eq!(session.write("0:/", "x"), Err(FsError::InvalidName));
}

#[test]
fn write_into_missing_directory_is_no_path() {
    let mut session = mounted_session();
    assert_eq!(session.write("nodir/a.txt", "x"), Err(FsError::NoPath));
}

#[test]
fn delete_missing_file_is_no_file() {
    let mut session = mounted_session();
    assert_eq!(session.delete("ghost.txt"), Err(FsError::NoFile));
    assert_eq!(lines(&mut session), vec!["Delete ghost.txt: Failed"]);
}

#[test]
fn delete_removes_files_and_empty_directories() {
    let mut session = mounted_session();
    session.write("a.txt", "x").unwrap();
    session.create_directory("empty").unwrap();
    assert_eq!(session.delete("a.txt"), Ok(()));
    assert_eq!(session.delete("empty"), Ok(()));
    assert_eq!(session.stat("a.txt"), Err(FsError::NoFile));
    assert_eq!(session.stat("empty"), Err(FsError::NoFile));
}

#[test]
fn delete_non_empty_directory_is_denied() {
    let mut session = mounted_session();
    session.create_directory("logs").unwrap();
    session.write("logs/a.txt", "x").unwrap();
    assert_eq!(session.delete("logs"), Err(FsError::Denied));
}

#[test]
fn rename_moves_and_reports_conflicts() {
    let mut session = mounted_session();
    session.write("old.txt", "data").unwrap();
    session.write("taken.txt", "other").unwrap();
    session.create_directory("archive").unwrap();

    assert_eq!(session.rename("old.txt", "taken.txt"), Err(FsError::Exist));
    assert_eq!(session.rename("ghost.txt", "new.txt"), Err(FsError::NoFile));
    assert_eq!(
        session.rename("old.txt", "nowhere/new.txt"),
        Err(FsError::NoPath)
    );
    assert_eq!(session.rename("old.txt", "archive/new.txt"), Ok(()));

    let mut buf = [0u8; 8];
    assert_eq!(session.read("archive/new.txt", &mut buf), Ok(4));
    assert_eq!(session.stat("old.txt"), Err(FsError::NoFile));
    assert!(lines(&mut session).contains(&"Rename old.txt to archive/new.txt: OK".to_string()));
}

#[test]
fn create_directory_reports_exist_and_missing_parent() {
    let mut session = mounted_session();
    assert_eq!(session.create_directory("data"), Ok(()));
    assert_eq!(session.create_directory("data"), Err(FsError::Exist));
    assert_eq!(session.create_directory("DATA"), Err(FsError::Exist));
    assert_eq!(session.create_directory("a/b"), Err(FsError::NoPath));
    assert_eq!(
        lines(&mut session),
        vec![
            "Create directory data: OK",
            "Create directory data: Failed",
            "Create directory DATA: Failed",
            "Create directory a/b: Failed",
        ]
    );
}

#[test]
fn stat_reports_files_and_directories() {
    let mut session = mounted_session();
    session.create_directory("logs").unwrap();
    session.write("logs/day1.csv", "a,b,3\n").unwrap();
    lines(&mut session);

    let file = session.stat("logs/DAY1.CSV").unwrap();
    assert_eq!(file.name.as_str(), "day1.csv");
    assert_eq!(file.size, 6);
    assert!(!file.is_dir);
    assert!(session.stat("0:/logs").unwrap().is_dir);
    assert!(session.stat("0:/").unwrap().is_dir);
    assert_eq!(session.stat("logs/none"), Err(FsError::NoFile));
    assert_eq!(
        lines(&mut session),
        vec![
            "Stat logs/DAY1.CSV: 6 bytes",
            "Stat 0:/logs: dir",
            "Stat 0:/: dir",
            "Stat logs/none: Failed",
        ]
    );
}

#[test]
fn write_protected_card_refuses_writes() {
    let mut session = mounted_session();
    session.write("before.txt", "ok").unwrap();
    session
        .with_device(|card| card.set_write_protected(true))
        .unwrap();

    assert_eq!(
        session.write("after.txt", "nope"),
        Err(FsError::WriteProtected)
    );
    let mut buf = [0u8; 8];
    assert_eq!(session.read("before.txt", &mut buf), Ok(2));
}

#[test]
fn csv_records_follow_line_policy() {
    let mut session = mounted_session();
    session.write("data.csv", "a,b,3\na,b\na\n").unwrap();
    lines(&mut session);

    let mut records: [CsvRecord; 4] = Default::default();
    records[1].value = 99;
    assert_eq!(session.read_csv("data.csv", &mut records), Ok(3));

    assert_eq!(records[0].field1.as_str(), "a");
    assert_eq!(records[0].field2.as_str(), "b");
    assert_eq!(records[0].value, 3);
    assert_eq!(records[1].field2.as_str(), "b");
    assert_eq!(records[1].value, 0);
    assert_eq!(records[2].field1.as_str(), "a");
    assert_eq!(records[2].field2.as_str(), "");
    assert_eq!(records[2].value, 0);
    assert_eq!(records[3], CsvRecord::default());

    assert_eq!(
        lines(&mut session),
        vec![
            "📄 Reading CSV: data.csv",
            "[0] a | b | 3",
            "[1] a | b | 0",
            "[2] a |  | 0",
        ]
    );
}

#[test]
fn csv_collapses_empty_tokens_and_skips_blank_lines() {
    let mut session = mounted_session();
    session
        .write("data.csv", "\r\n,,x,,y,,-12abc\r\n,,,\nt,u, 42\n")
        .unwrap();
    let mut records: [CsvRecord; 4] = Default::default();
    assert_eq!(session.read_csv("data.csv", &mut records), Ok(2));
    assert_eq!(records[0].field1.as_str(), "x");
    assert_eq!(records[0].field2.as_str(), "y");
    assert_eq!(records[0].value, -12);
    assert_eq!(records[1].field1.as_str(), "t");
    assert_eq!(records[1].value, 42);
}

#[test]
fn csv_stops_at_record_capacity() {
    let mut session = mounted_session();
    session.write("data.csv", "a,1,1\nb,2,2\nc,3,3\n").unwrap();
    let mut records: [CsvRecord; 2] = Default::default();
    assert_eq!(session.read_csv("data.csv", &mut records), Ok(2));
    assert_eq!(records[1].field1.as_str(), "b");
}

#[test]
fn csv_truncates_fields_and_continues_long_lines() {
    let mut session = mounted_session();
    let long_field = "f".repeat(40);
    let overflow = "a".repeat(130);
    let text = format!("{long_field},g,5\n{overflow},b,7\n");
    session.write("data.csv", &text).unwrap();

    let mut records: [CsvRecord; 8] = Default::default();
    assert_eq!(session.read_csv("data.csv", &mut records), Ok(3));
    assert_eq!(records[0].field1.len(), 32);
    assert_eq!(records[0].value, 5);
    // The first 127 bytes form one line, the rest continues as the next.
    assert_eq!(records[1].field1.as_str(), "a".repeat(32));
    assert_eq!(records[1].field2.as_str(), "");
    assert_eq!(records[2].field1.as_str(), "aaa");
    assert_eq!(records[2].field2.as_str(), "b");
    assert_eq!(records[2].value, 7);
}

#[test]
fn csv_open_failure_is_reported() {
    let mut session = mounted_session();
    let mut records: [CsvRecord; 2] = Default::default();
    assert_eq!(
        session.read_csv("none.csv", &mut records),
        Err(FsError::NoFile)
    );
    assert_eq!(lines(&mut session), vec!["Failed to open CSV: none.csv (4)"]);
}

#[test]
fn leading_int_parse_is_permissive() {
    assert_eq!(parse_leading_int(b"42"), 42);
    assert_eq!(parse_leading_int(b"  -7x"), -7);
    assert_eq!(parse_leading_int(b"+15"), 15);
    assert_eq!(parse_leading_int(b"abc"), 0);
    assert_eq!(parse_leading_int(b""), 0);
    assert_eq!(parse_leading_int(b"99999999999"), i32::MAX);
    assert_eq!(parse_leading_int(b"-99999999999"), i32::MIN);
}

fn build_tree(session: &mut TestSession) {
    session.create_directory("logs").unwrap();
    session.write("logs/day1.csv", "a,b,3\n").unwrap();
    session.create_directory("logs/old").unwrap();
    session.write("logs/old/x.txt", "xyz").unwrap();
    session.write("readme.txt", "hi").unwrap();
    lines(session);
}

#[test]
fn list_files_prints_tree_in_pre_order() {
    let mut session = mounted_session();
    build_tree(&mut session);

    session.list_files().unwrap();
    assert_eq!(
        lines(&mut session),
        vec![
            "📂 Files on SD Card:",
            "📁 logs",
            "  📄 day1.csv (6 bytes)",
            "  📁 old",
            "    📄 x.txt (3 bytes)",
            "📄 readme.txt (2 bytes)",
            "",
        ]
    );
}

#[test]
fn walk_visits_each_entry_once_with_depth() {
    let mut session = mounted_session();
    build_tree(&mut session);

    let mut seen: Vec<(String, usize)> = Vec::new();
    session
        .walk_directory("0:/", 0, |event| {
            if let WalkEvent::Entry(entry) = event {
                seen.push((entry.name.to_string(), entry.depth));
            }
            WalkControl::Continue
        })
        .unwrap();
    assert_eq!(
        seen,
        vec![
            ("logs".to_string(), 0),
            ("day1.csv".to_string(), 1),
            ("old".to_string(), 1),
            ("x.txt".to_string(), 2),
            ("readme.txt".to_string(), 0),
        ]
    );
}

#[test]
fn walk_stop_ends_traversal() {
    let mut session = mounted_session();
    build_tree(&mut session);

    let mut count = 0;
    session
        .walk_directory("0:/", 0, |_| {
            count += 1;
            if count == 2 {
                WalkControl::Stop
            } else {
                WalkControl::Continue
            }
        })
        .unwrap();
    assert_eq!(count, 2);
}

#[test]
fn listing_missing_directory_reports_open_failure() {
    let mut session = mounted_session();
    assert_eq!(
        session.list_directory_recursive("0:/nothing", 1),
        Err(FsError::NoFile)
    );
    assert_eq!(lines(&mut session), vec!["  [ERR] Cannot open: 0:/nothing"]);
}

#[test]
fn depth_limit_lists_but_does_not_enter() {
    let config = SdConfig {
        list_max_depth: Some(0),
        ..SdConfig::default()
    };
    let mut session = mounted_with_config(config);
    build_tree(&mut session);

    session.list_directory_recursive("0:/", 0).unwrap();
    assert_eq!(
        lines(&mut session),
        vec![
            "📁 logs",
            "  [SKIP] depth limit: 0:/logs",
            "📄 readme.txt (2 bytes)",
        ]
    );
}

#[test]
fn over_long_child_path_is_skipped() {
    let mut session = mounted_session();
    // Four 30-byte levels plus a short leaf fit as a relative path, but not
    // once the walk prefixes the mount point.
    let segment = "d".repeat(30);
    let mut path = String::new();
    for _ in 0..4 {
        if !path.is_empty() {
            path.push('/');
        }
        path.push_str(&segment);
        session.create_directory(&path).unwrap();
    }
    let leaf = format!("{path}/ee");
    assert!(leaf.len() <= SD_PATH_MAX);
    assert!(leaf.len() + "0:/".len() > SD_PATH_MAX);
    session.create_directory(&leaf).unwrap();
    lines(&mut session);

    let mut entries = 0usize;
    let mut skipped = Vec::new();
    session
        .walk_directory("0:/", 0, |event| {
            match event {
                WalkEvent::Entry(_) => entries += 1,
                WalkEvent::PathTooLong { name, depth, .. } => {
                    skipped.push((name.to_string(), depth));
                }
                _ => {}
            }
            WalkControl::Continue
        })
        .unwrap();
    assert_eq!(entries, 5);
    assert_eq!(skipped, vec![("ee".to_string(), 5)]);

    session.list_directory_recursive("0:/", 0).unwrap();
    let out = lines(&mut session);
    let last = out.last().cloned().unwrap_or_default();
    assert!(last.starts_with("          [ERR] Path too long: 0:/d"), "{last}");
    assert!(last.ends_with("/ee"), "{last}");
}

#[test]
fn listed_entry_names_are_bounded() {
    let entry = ListedEntry::from_fat(&"n".repeat(300), 10, false, 0);
    assert_eq!(entry.name.len(), crate::SD_NAME_MAX);
}

#[test]
fn into_device_unmounts_and_returns_card() {
    let mut session = mounted_session();
    session.write("a.txt", "persist").unwrap();
    let card = session.into_device().unwrap();

    let mut session = SdSession::with_console(card, Vec::<String>::new());
    session.mount().unwrap();
    let mut buf = [0u8; 16];
    assert_eq!(session.read("a.txt", &mut buf), Ok(7));
}

/// Card that fails reads of chosen sectors and, on demand, its flush.
struct FaultyCard {
    inner: RamCard,
    bad_reads: Range<u32>,
    flush_error: Option<SdDeviceError>,
}

impl BlockDevice for FaultyCard {
    fn init(&mut self) -> Result<(), SdDeviceError> {
        self.inner.init()
    }

    fn is_initialized(&self) -> bool {
        self.inner.is_initialized()
    }

    fn sector_count(&self) -> u32 {
        self.inner.sector_count()
    }

    fn read_sector(
        &mut self,
        lba: u32,
        out: &mut [u8; SD_SECTOR_SIZE],
    ) -> Result<(), SdDeviceError> {
        if self.bad_reads.contains(&lba) {
            return Err(SdDeviceError::Crc);
        }
        self.inner.read_sector(lba, out)
    }

    fn write_sector(
        &mut self,
        lba: u32,
        data: &[u8; SD_SECTOR_SIZE],
    ) -> Result<(), SdDeviceError> {
        self.inner.write_sector(lba, data)
    }

    fn card_info(&self) -> CardInfo {
        self.inner.card_info()
    }

    fn flush(&mut self) -> Result<(), SdDeviceError> {
        match self.flush_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn invalidate(&mut self) {
        self.inner.invalidate()
    }
}

type FaultySession = SdSession<FaultyCard, Vec<String>>;

fn mounted_faulty_session() -> FaultySession {
    let card = FaultyCard {
        inner: RamCard::new(TEST_CARD_SECTORS),
        bad_reads: 0..0,
        flush_error: None,
    };
    let mut session = SdSession::with_console(card, Vec::<String>::new());
    session.format().unwrap();
    session.mount().unwrap();
    session.console_mut().clear();
    session
}

/// First sector whose contents start with `marker`.
fn sector_starting_with(session: &mut FaultySession, marker: &[u8]) -> u32 {
    let index = session
        .with_device(|card| {
            card.inner
                .as_bytes()
                .chunks(SD_SECTOR_SIZE)
                .position(|sector| sector.starts_with(marker))
        })
        .unwrap()
        .expect("marker sector");
    index as u32
}

/// Sectors of the allocation tables, from the boot sector.
fn fat_sectors(session: &mut FaultySession) -> Range<u32> {
    session
        .with_device(|card| {
            let boot = &card.inner.as_bytes()[..SD_SECTOR_SIZE];
            let reserved = u16::from_le_bytes([boot[14], boot[15]]) as u32;
            let per_fat = u16::from_le_bytes([boot[22], boot[23]]) as u32;
            reserved..reserved + boot[16] as u32 * per_fat
        })
        .unwrap()
}

#[test]
fn read_failure_after_open_reports_f_read() {
    let mut session = mounted_faulty_session();
    session.write("data.bin", &"Q".repeat(1024)).unwrap();
    session.unmount().unwrap();
    let lba = sector_starting_with(&mut session, b"QQQQQQQQ");
    session
        .with_device(|card| card.bad_reads = lba..lba + 2)
        .unwrap();
    session.mount().unwrap();
    lines(&mut session);

    let mut buf = [0x55u8; 64];
    assert_eq!(session.read("data.bin", &mut buf), Err(FsError::DiskErr));
    assert_eq!(lines(&mut session), vec!["f_read failed with code: 1"]);
}

#[test]
fn close_failure_after_read_reports_f_close() {
    let mut session = mounted_faulty_session();
    session.write("data.txt", "payload").unwrap();
    session
        .with_device(|card| card.flush_error = Some(SdDeviceError::Timeout))
        .unwrap();
    lines(&mut session);

    let mut buf = [0u8; 16];
    assert_eq!(session.read("data.txt", &mut buf), Err(FsError::Timeout));
    assert_eq!(&buf[..8], b"payload\0");
    assert_eq!(lines(&mut session), vec!["f_close failed with code: 15"]);
}

#[test]
fn append_seek_failure_writes_nothing() {
    let mut session = mounted_faulty_session();
    session.write("big.log", &"a".repeat(64 * 1024)).unwrap();
    let fat = fat_sectors(&mut session);
    assert!(!fat.is_empty());
    session.with_device(|card| card.bad_reads = fat).unwrap();
    lines(&mut session);

    assert_eq!(session.append("big.log", "tail"), Err(FsError::DiskErr));
    assert!(lines(&mut session).is_empty());

    session.with_device(|card| card.bad_reads = 0..0).unwrap();
    assert_eq!(
        session.stat("big.log").map(|entry| entry.size),
        Ok(64 * 1024)
    );
}

#[test]
fn filling_the_volume_is_a_disk_error() {
    let mut session = SdSession::with_console(RamCard::new(256), Vec::<String>::new());
    session.format().unwrap();
    session.mount().unwrap();
    let free_kb = session.get_space().unwrap().free_kb;
    lines(&mut session);

    let text = "x".repeat(free_kb as usize * 1024 + 4096);
    assert_eq!(session.write("big.txt", &text), Err(FsError::DiskErr));
    let out = lines(&mut session);
    assert_eq!(out.len(), 1);
    assert!(out[0].starts_with("Write "), "{}", out[0]);
    assert_ne!(out[0], format!("Write {} bytes to big.txt", text.len()));

    assert_eq!(session.append("big.txt", "more"), Err(FsError::DiskErr));
}

struct EmptyBackend;

impl ReadStorage for EmptyBackend {
    type Error = &'static str;

    fn read(&mut self, _offset: u32, _bytes: &mut [u8]) -> Result<(), Self::Error> {
        Err("empty")
    }

    fn capacity(&self) -> usize {
        0
    }
}

impl Storage for EmptyBackend {
    fn write(&mut self, _offset: u32, _bytes: &[u8]) -> Result<(), Self::Error> {
        Err("empty")
    }
}

#[test]
fn mount_on_card_that_fails_init_is_not_ready() {
    let mut session =
        SdSession::with_console(StorageCard::new(EmptyBackend), Vec::<String>::new());
    assert_eq!(session.mount(), Err(FsError::NotReady));
    assert_eq!(
        lines(&mut session),
        vec!["Attempting mount at 0:/...", "Mount failed with code: 3"]
    );
    assert!(!session.is_mounted());
}
