use chrono::{DateTime, Local, TimeZone};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

use backsnap::backup::archiver;
use backsnap::backup::history;
use backsnap::backup::lock::RunLock;
use backsnap::backup::{BackupEngine, RunOutcome, ScratchDir, Stage};
use backsnap::common::config::{BackupConfig, BackupTarget, Depth, DEFAULT_SCHEDULE};
use backsnap::common::errors::BackupError;

/// Temp layout: `src/` holds source trees, `store/` is the destination,
/// `tmp/` is the parent of the working area
struct Fixture {
    _tmp: TempDir,
    src: PathBuf,
    store: PathBuf,
    temp: PathBuf,
}

fn fixture() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    let store = tmp.path().join("store");
    let temp = tmp.path().join("tmp");
    std::fs::create_dir_all(&src).unwrap();
    Fixture {
        _tmp: tmp,
        src,
        store,
        temp,
    }
}

fn write(path: &Path, contents: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

fn target(path: &Path, depth: Depth, filters: &[&str]) -> BackupTarget {
    BackupTarget {
        path: path.to_path_buf(),
        recursion_depth: depth,
        filters: filters.iter().map(|s| s.to_string()).collect(),
    }
}

fn config(fx: &Fixture, root: &Path, paths: Vec<BackupTarget>) -> BackupConfig {
    let config = BackupConfig {
        schedule: DEFAULT_SCHEDULE.to_string(),
        root_path: root.to_path_buf(),
        destination_path: fx.store.clone(),
        password: None,
        retention_days: 30,
        temp_path: fx.temp.clone(),
        paths,
    };
    config.validate().unwrap();
    config
}

fn at(sec: u32) -> DateTime<Local> {
    Local.with_ymd_and_hms(2024, 5, 1, 12, 0, sec).unwrap()
}

/// File entries (not directories) in an archive, sorted
fn archive_files(path: &Path) -> Vec<String> {
    let archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| !n.ends_with('/'))
        .map(|n| n.to_string())
        .collect();
    names.sort();
    names
}

fn store_entries(store: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(store)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

fn set_age_days(path: &Path, days: u64) {
    // An extra hour keeps the whole-day count stable while the test runs
    let when = SystemTime::now() - Duration::from_secs(days * 86_400 + 3_600);
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(when)
        .unwrap();
}

// ─── Traversal & filtering through a full run ────────────────────────────────

#[test]
fn test_depth_budget_scenario() {
    let fx = fixture();
    let data = fx.src.join("data");
    write(&data.join("a.txt"), "a");
    write(&data.join("sub/b.txt"), "b");
    write(&data.join("sub/deep/c.txt"), "c");

    let config = config(&fx, &data, vec![target(&data, Depth::Levels(1), &["\\.txt$"])]);
    let report = BackupEngine::new(&config).run_at(at(0));

    assert_eq!(report.outcome, RunOutcome::Succeeded);
    let archive = report.archive.clone().unwrap();
    assert_eq!(archive, fx.store.join("20240501120000.zip"));
    assert_eq!(archive_files(&archive), vec!["a.txt", "sub/b.txt"]);
    assert_eq!(report.files_staged, 2);
}

#[test]
fn test_empty_filters_stage_every_file() {
    let fx = fixture();
    let data = fx.src.join("data");
    write(&data.join("photo.jpg"), "jpg");
    write(&data.join("notes.txt"), "txt");
    write(&data.join("bin/tool"), "elf");

    let config = config(&fx, &fx.src, vec![target(&data, Depth::Unbounded, &[])]);
    let report = BackupEngine::new(&config).run_at(at(0));

    assert!(report.succeeded());
    assert_eq!(
        archive_files(report.archive.as_ref().unwrap()),
        vec!["data/bin/tool", "data/notes.txt", "data/photo.jpg"]
    );
}

#[test]
fn test_entries_are_relative_to_common_root() {
    let fx = fixture();
    write(&fx.src.join("home/alice/todo.md"), "- [ ] backups");
    write(&fx.src.join("etc/app.conf"), "key=value");

    let config = config(
        &fx,
        &fx.src,
        vec![
            target(&fx.src.join("home"), Depth::Unbounded, &[]),
            target(&fx.src.join("etc/app.conf"), Depth::Levels(-1), &[]),
        ],
    );
    let report = BackupEngine::new(&config).run_at(at(0));
    let archive = report.archive.unwrap();

    assert_eq!(archive_files(&archive), vec!["etc/app.conf", "home/alice/todo.md"]);

    let mut zip = zip::ZipArchive::new(File::open(&archive).unwrap()).unwrap();
    let mut contents = String::new();
    zip.by_name("home/alice/todo.md")
        .unwrap()
        .read_to_string(&mut contents)
        .unwrap();
    assert_eq!(contents, "- [ ] backups");
}

#[test]
fn test_negative_depth_directory_target_stages_nothing() {
    let fx = fixture();
    write(&fx.src.join("skip/a.txt"), "a");
    write(&fx.src.join("keep.txt"), "k");

    let config = config(
        &fx,
        &fx.src,
        vec![
            target(&fx.src.join("skip"), Depth::Levels(-1), &[]),
            target(&fx.src.join("keep.txt"), Depth::Levels(-1), &[]),
        ],
    );
    let report = BackupEngine::new(&config).run_at(at(0));

    assert_eq!(archive_files(report.archive.as_ref().unwrap()), vec!["keep.txt"]);
    assert_eq!(report.targets[0].files_staged, 0);
    assert_eq!(report.targets[1].files_staged, 1);
}

#[test]
fn test_missing_target_is_skipped() {
    let fx = fixture();
    write(&fx.src.join("present/a.txt"), "a");

    let config = config(
        &fx,
        &fx.src,
        vec![
            target(&fx.src.join("absent"), Depth::Unbounded, &[]),
            target(&fx.src.join("present"), Depth::Unbounded, &[]),
        ],
    );
    let report = BackupEngine::new(&config).run_at(at(0));

    assert_eq!(report.outcome, RunOutcome::Succeeded);
    assert!(report.targets[0].missing);
    assert!(!report.targets[1].missing);
    assert_eq!(archive_files(report.archive.as_ref().unwrap()), vec!["present/a.txt"]);
}

// ─── Idempotence & cleanup ───────────────────────────────────────────────────

#[test]
fn test_repeated_runs_produce_same_entries() {
    let fx = fixture();
    write(&fx.src.join("d/one.txt"), "1");
    write(&fx.src.join("d/x/two.txt"), "2");
    write(&fx.src.join("d/x/y/three.txt"), "3");

    let config = config(&fx, &fx.src, vec![target(&fx.src.join("d"), Depth::Unbounded, &[])]);
    let engine = BackupEngine::new(&config);
    let first = engine.run_at(at(0));
    let second = engine.run_at(at(1));

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(
        archive_files(first.archive.as_ref().unwrap()),
        archive_files(second.archive.as_ref().unwrap())
    );
    assert_eq!(store_entries(&fx.store).len(), 2);
}

#[test]
fn test_working_area_is_clean_after_success() {
    let fx = fixture();
    write(&fx.src.join("a.txt"), "a");

    let config = config(&fx, &fx.src, vec![target(&fx.src.join("a.txt"), Depth::Unbounded, &[])]);
    let report = BackupEngine::new(&config).run_at(at(0));
    assert!(report.succeeded());

    let work = config.work_area();
    assert!(!work.join(&report.run_id).exists());
    assert!(RunLock::acquire(&config.lock_path()).is_ok());
    assert!(config.history_path().exists());
}

#[cfg(unix)]
#[test]
fn test_copy_failure_leaves_store_untouched() {
    let fx = fixture();
    write(&fx.src.join("d/ok.txt"), "ok");
    std::os::unix::fs::symlink(fx.src.join("d/vanished"), fx.src.join("d/broken")).unwrap();
    write(&fx.store.join("20240101000000.zip"), "old archive");

    let config = config(&fx, &fx.src, vec![target(&fx.src.join("d"), Depth::Unbounded, &[])]);
    let report = BackupEngine::new(&config).run_at(at(0));

    assert!(
        matches!(report.outcome, RunOutcome::Failed { stage: Stage::Staging, .. }),
        "unexpected outcome: {:?}",
        report.outcome
    );
    assert!(report.archive.is_none());
    assert!(report.prune.is_none());
    assert_eq!(store_entries(&fx.store), vec!["20240101000000.zip"]);
    assert_eq!(
        std::fs::read_to_string(fx.store.join("20240101000000.zip")).unwrap(),
        "old archive"
    );
    assert!(!config.work_area().join(&report.run_id).exists());
}

#[test]
fn test_archive_failure_still_removes_staging() {
    let tmp = TempDir::new().unwrap();
    let staging = ScratchDir::create(tmp.path().join("run/files")).unwrap();
    write(&staging.path().join("a.txt"), "a");
    let staging_path = staging.path().to_path_buf();

    let result = archiver::compress(staging, &tmp.path().join("no/such/dir/out.zip"), None);

    assert!(matches!(result, Err(BackupError::Archive { .. })));
    assert!(!staging_path.exists());
}

// ─── Encryption ──────────────────────────────────────────────────────────────

#[test]
fn test_password_protected_archive() {
    let fx = fixture();
    write(&fx.src.join("secret.txt"), "launch codes");

    let mut config = config(&fx, &fx.src, vec![target(&fx.src.join("secret.txt"), Depth::Unbounded, &[])]);
    config.password = Some("correct horse".to_string());
    let report = BackupEngine::new(&config).run_at(at(0));
    let archive = report.archive.unwrap();

    let mut zip = zip::ZipArchive::new(File::open(&archive).unwrap()).unwrap();
    assert!(zip.by_index_raw(0).unwrap().encrypted());

    let mut contents = String::new();
    zip.by_name_decrypt("secret.txt", b"correct horse")
        .unwrap()
        .read_to_string(&mut contents)
        .unwrap();
    assert_eq!(contents, "launch codes");
}

#[test]
fn test_unencrypted_without_password() {
    let fx = fixture();
    write(&fx.src.join("plain.txt"), "hello");

    let config = config(&fx, &fx.src, vec![target(&fx.src.join("plain.txt"), Depth::Unbounded, &[])]);
    let report = BackupEngine::new(&config).run_at(at(0));

    let mut zip = zip::ZipArchive::new(File::open(report.archive.unwrap()).unwrap()).unwrap();
    assert!(!zip.by_index_raw(0).unwrap().encrypted());
}

// ─── Retention ───────────────────────────────────────────────────────────────

#[test]
fn test_retention_prunes_only_expired_archives() {
    let fx = fixture();
    write(&fx.src.join("a.txt"), "a");
    for (name, days) in [("d01.zip", 1), ("d05.zip", 5), ("d10.zip", 10), ("d31.zip", 31)] {
        let path = fx.store.join(name);
        write(&path, name);
        set_age_days(&path, days);
    }

    let config = config(&fx, &fx.src, vec![target(&fx.src.join("a.txt"), Depth::Unbounded, &[])]);
    let report = BackupEngine::new(&config).run_at(at(0));

    assert!(report.succeeded());
    let prune = report.prune.unwrap();
    assert_eq!(prune.pruned.len(), 1);
    assert_eq!(prune.pruned[0].path, fx.store.join("d31.zip"));
    assert_eq!(
        store_entries(&fx.store),
        vec!["20240501120000.zip", "d01.zip", "d05.zip", "d10.zip"]
    );
}

#[test]
fn test_prune_dry_run_keeps_files() {
    let fx = fixture();
    let old = fx.store.join("old.zip");
    write(&old, "old");
    set_age_days(&old, 40);

    let report = backsnap::backup::prune(&fx.store, 30, true).unwrap();

    assert_eq!(report.pruned.len(), 1);
    assert!(old.exists());
}

#[test]
fn test_age_equal_to_window_is_kept() {
    let fx = fixture();
    let edge = fx.store.join("edge.zip");
    write(&edge, "edge");
    set_age_days(&edge, 30);

    let report = backsnap::backup::prune(&fx.store, 30, false).unwrap();

    assert!(report.pruned.is_empty());
    assert!(edge.exists());
}

// ─── Run identity & locking ──────────────────────────────────────────────────

#[test]
fn test_run_id_collision_never_overwrites() {
    let fx = fixture();
    write(&fx.src.join("a.txt"), "a");

    let config = config(&fx, &fx.src, vec![target(&fx.src.join("a.txt"), Depth::Unbounded, &[])]);
    let engine = BackupEngine::new(&config);
    let first = engine.run_at(at(0));
    let archive = first.archive.unwrap();
    let before = std::fs::read(&archive).unwrap();

    let second = engine.run_at(at(0));

    assert!(matches!(second.outcome, RunOutcome::Failed { stage: Stage::Start, .. }));
    assert_eq!(std::fs::read(&archive).unwrap(), before);
}

#[test]
fn test_concurrent_trigger_is_skipped() {
    let fx = fixture();
    write(&fx.src.join("a.txt"), "a");

    let config = config(&fx, &fx.src, vec![target(&fx.src.join("a.txt"), Depth::Unbounded, &[])]);
    let _held = RunLock::acquire(&config.lock_path()).unwrap();

    let report = BackupEngine::new(&config).run_at(at(0));

    assert!(matches!(report.outcome, RunOutcome::Skipped { .. }));
    assert!(report.archive.is_none());
    assert!(!fx.store.join("20240501120000.zip").exists());
}

#[test]
fn test_history_records_runs_newest_first() {
    let fx = fixture();
    write(&fx.src.join("a.txt"), "a");

    let config = config(&fx, &fx.src, vec![target(&fx.src.join("a.txt"), Depth::Unbounded, &[])]);
    let engine = BackupEngine::new(&config);
    engine.run_at(at(0));
    engine.run_at(at(5));

    let runs = history::read_recent(&config.history_path(), 10).unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].run_id, "20240501120005");
    assert_eq!(runs[1].run_id, "20240501120000");

    let store = history::list_store(&config.destination_path).unwrap();
    assert_eq!(store.len(), 2);
    assert!(store.iter().all(|a| !a.partial));
}
