//! Incremental zip backup engine
//!
//! For every configured, still-reachable destination the engine decides
//! which archives are stale (the database archive plus one archive per
//! numbered audio directory) and rebuilds only those. Staleness is
//! derived purely from timestamps and archive structure; there is no
//! manifest. Destinations are processed sequentially in slot order to
//! bound resource use; the per-directory rebuilds inside one destination
//! fan out as concurrent blocking tasks.
//!
//! Failure isolation follows a strict taxonomy: a scan failure aborts the
//! run, an unreachable destination is dropped from the run, and an archive
//! failure is confined to its own artifact. No error crosses a task
//! boundary as anything but a report value.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use memprime_core::{retry_with_policy, BackupSlot, Error, Result, RetryPolicy};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

use crate::archive::{entries_for_files, write_archive, ArchiveEntry};
use crate::feedback::Feedback;
use crate::inventory::{self, SourceInventory};
use crate::locations::LocationRegistry;
use crate::storage::{modified_millis, StorageNode, TreeProvider};
use crate::validate::is_valid_zip;

/// Current-generation database archive name
pub const DATABASE_ARCHIVE_NAME: &str = "database.zip";

/// One-generation-back rotated database archive name
pub const DATABASE_ARCHIVE_ROTATED_NAME: &str = "database.zip.last";

const ZIP_MIME_TYPE: &str = "application/zip";

/// Handle to the live database connection owned by the host application.
///
/// The engine closes it before scanning so the backing file is in a
/// consistent, unlocked state on disk when it gets archived.
pub trait DatabaseHandle: Send + Sync {
    fn close(&self);
}

/// Caller-supplied run parameters.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Emit spoken-style progress feedback (no effect on correctness)
    pub announce: bool,

    /// Validate existing archives' entry streams as an extra staleness
    /// signal (trades IO cost for stronger detection)
    pub deep_validation: bool,
}

/// Services the engine depends on, injected by the host.
pub struct BackupServices {
    pub registry: LocationRegistry,
    pub trees: Arc<dyn TreeProvider>,
    pub feedback: Arc<dyn Feedback>,
    pub database: Option<Arc<dyn DatabaseHandle>>,
}

/// What happened to a single archive artifact during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactOutcome {
    /// Built fresh where nothing usable existed
    Created,

    /// A stale or corrupt previous generation was replaced
    Rebuilt,

    /// The existing archive was current; nothing written
    UpToDate,

    /// The artifact could not be produced this run
    Failed(String),
}

impl ArtifactOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, ArtifactOutcome::Failed(_))
    }
}

/// Outcome for one audio directory at one destination.
#[derive(Debug, Clone)]
pub struct DirectoryReport {
    pub name: String,
    pub outcome: ArtifactOutcome,
}

/// Outcome for one destination.
#[derive(Debug, Clone)]
pub struct DestinationReport {
    pub slot: BackupSlot,
    pub database: ArtifactOutcome,
    pub directories: Vec<DirectoryReport>,
}

impl DestinationReport {
    pub fn fully_succeeded(&self) -> bool {
        !self.database.is_failure() && !self.directories.iter().any(|d| d.outcome.is_failure())
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Reports for the destinations that were processed
    pub destinations: Vec<DestinationReport>,

    /// Slots whose destination was configured but not reachable this run
    pub skipped: Vec<BackupSlot>,
}

impl RunSummary {
    /// True when the run ended early because there was nothing to do,
    /// which is distinct from failure.
    pub fn nothing_to_do(&self) -> bool {
        self.destinations.is_empty()
    }

    /// True when every processed destination produced every artifact.
    pub fn fully_succeeded(&self) -> bool {
        self.destinations.iter().all(|d| d.fully_succeeded())
    }
}

/// Completion signal delivered when a spawned job finishes.
pub type CompletionCallback = Box<dyn FnOnce(bool) + Send>;

/// Handle to a backup run executing in the background.
///
/// `abort` cancels at the next await point only: an in-flight blocking
/// archive write always runs to completion, so aborting cannot leave a
/// half-written archive behind a completed write boundary.
pub struct BackupJob {
    handle: JoinHandle<Result<RunSummary>>,
}

impl BackupJob {
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the run to finish and collect its summary.
    pub async fn wait(self) -> Result<RunSummary> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(Error::interrupted(e.to_string())),
        }
    }
}

/// The engine itself. Construct once per storage root and reuse.
pub struct IncrementalBackupEngine {
    storage_root: PathBuf,
    services: BackupServices,
    retry: RetryPolicy,
}

impl IncrementalBackupEngine {
    pub fn new(storage_root: impl Into<PathBuf>, services: BackupServices) -> Self {
        Self {
            storage_root: storage_root.into(),
            services,
            retry: RetryPolicy::immediate(3),
        }
    }

    /// Override the sink-creation retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Submit a run as a background job and return immediately.
    ///
    /// The optional callback receives the overall success flag once every
    /// destination has been processed.
    pub fn spawn(self: Arc<Self>, options: RunOptions, on_finished: Option<CompletionCallback>) -> BackupJob {
        let handle = tokio::spawn(async move {
            let result = self.run(options).await;
            if let Some(callback) = on_finished {
                let success = result
                    .as_ref()
                    .map(|summary| summary.fully_succeeded())
                    .unwrap_or(false);
                callback(success);
            }
            result
        });
        BackupJob { handle }
    }

    /// Execute a full run: filter destinations, scan the source, then back
    /// up each reachable destination in slot order.
    pub async fn run(&self, options: RunOptions) -> Result<RunSummary> {
        let feedback = &self.services.feedback;

        let configured = self.services.registry.configured()?;
        if configured.is_empty() {
            if options.announce {
                feedback.speak("no backup needed");
            }
            return Ok(RunSummary::default());
        }

        if options.announce {
            feedback.speak("starting backup");
        }

        // Revoked or unplugged destinations are expected; they are dropped
        // from this run, never escalated.
        let mut valid: Vec<(BackupSlot, Arc<dyn StorageNode>)> = Vec::new();
        let mut skipped = Vec::new();
        for (slot, identifier) in configured {
            match self.services.trees.open(&identifier) {
                Some(root) if root.exists() && root.is_directory() => valid.push((slot, root)),
                _ => {
                    if options.announce {
                        feedback.speak(&format!("missing directory for {slot}"));
                    }
                    debug!("skipping unreachable destination {}: {}", slot, identifier);
                    skipped.push(slot);
                }
            }
        }

        if options.announce {
            feedback.speak(&format!("backups needed {}", valid.len()));
        }
        if valid.is_empty() {
            return Ok(RunSummary {
                destinations: Vec::new(),
                skipped,
            });
        }

        // The backing file must be quiescent on disk before it is archived.
        if let Some(database) = &self.services.database {
            database.close();
        }

        let inventory = match inventory::scan(&self.storage_root) {
            Ok(inventory) => inventory,
            Err(e) => {
                feedback.error(&e.to_string());
                return Err(e);
            }
        };
        debug!(
            "inventory: database modified {} ms, {} audio directories",
            inventory.database_modified,
            inventory.audio_files.len()
        );

        if inventory.audio_files.is_empty() {
            // The scanner rejects an empty audio parent, but a parent
            // holding only stray files still yields an empty mapping.
            if options.announce {
                feedback.speak("nothing to back up");
            }
            return Ok(RunSummary {
                destinations: Vec::new(),
                skipped,
            });
        }

        let inventory = Arc::new(inventory);
        let mut destinations = Vec::with_capacity(valid.len());
        for (slot, root) in valid {
            let report = self
                .backup_destination(slot, root, Arc::clone(&inventory), &options)
                .await;
            if options.announce {
                feedback.speak(&format!("backup finished for {slot}"));
            }
            destinations.push(report);
        }

        Ok(RunSummary {
            destinations,
            skipped,
        })
    }

    /// Back up one destination: database artifact first, then every audio
    /// directory as its own concurrent task. The destination is finished
    /// only when all of its tasks have completed.
    async fn backup_destination(
        &self,
        slot: BackupSlot,
        root: Arc<dyn StorageNode>,
        inventory: Arc<SourceInventory>,
        options: &RunOptions,
    ) -> DestinationReport {
        let database = self.backup_database(slot, root.as_ref(), &inventory).await;

        let mut tasks: JoinSet<DirectoryReport> = JoinSet::new();
        for (name, files) in &inventory.audio_files {
            let task = DirectoryTask {
                root: Arc::clone(&root),
                name: name.clone(),
                files: files.clone(),
                recorded_modified: inventory.recorded_modified(name),
                deep_validation: options.deep_validation,
                feedback: Arc::clone(&self.services.feedback),
            };
            tasks.spawn_blocking(move || task.run());
        }

        let mut directories = Vec::with_capacity(inventory.audio_files.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => directories.push(report),
                Err(e) => warn!("audio directory task did not complete: {}", e),
            }
        }
        directories.sort_by(|a, b| a.name.cmp(&b.name));

        DestinationReport {
            slot,
            database,
            directories,
        }
    }

    /// Rotate-and-rebuild of the database archive. The previous generation
    /// survives as `database.zip.last` until the fresh archive is fully
    /// written, and only ever on failure afterwards.
    async fn backup_database(
        &self,
        slot: BackupSlot,
        root: &dyn StorageNode,
        inventory: &SourceInventory,
    ) -> ArtifactOutcome {
        let feedback = &self.services.feedback;

        match root.find_child(DATABASE_ARCHIVE_ROTATED_NAME) {
            Ok(Some(stale_rotation)) => {
                stale_rotation.delete();
            }
            Ok(None) => {}
            Err(e) => debug!("rotated archive lookup failed for {}: {}", slot, e),
        }

        let rotated = match root.find_child(DATABASE_ARCHIVE_NAME) {
            Ok(Some(current)) => current.rename(DATABASE_ARCHIVE_ROTATED_NAME),
            Ok(None) => false,
            Err(e) => {
                debug!("database archive lookup failed for {}: {}", slot, e);
                false
            }
        };

        let attempts = AtomicU32::new(0);
        let created = retry_with_policy(&self.retry, "database archive creation", || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                root.create_file(ZIP_MIME_TYPE, DATABASE_ARCHIVE_NAME)
                    .inspect_err(|_| {
                        feedback.error(&format!("Database backup create failed. Try {attempt}"));
                    })
            }
        })
        .await;

        let sink_node = match created {
            Ok(node) => node,
            Err(e) => {
                feedback.error(&format!("Database backup failed repeatedly for {slot}"));
                debug!("database sink creation exhausted: {}", e);
                return ArtifactOutcome::Failed("could not create database archive".to_string());
            }
        };

        let sink = match sink_node.open_write() {
            Ok(sink) => sink,
            Err(e) => {
                feedback.error(&format!("Database zipping failed for missing file {slot}"));
                return ArtifactOutcome::Failed(e.to_string());
            }
        };

        let entries: Vec<ArchiveEntry> = match ArchiveEntry::from_path(&inventory.database) {
            Some(entry) => vec![entry],
            None => {
                return ArtifactOutcome::Failed("database file has no archivable name".to_string())
            }
        };

        let written = tokio::task::spawn_blocking(move || write_archive(&entries, sink))
            .await
            .unwrap_or(false);
        if !written {
            // The rotated previous generation stays put; it is the only
            // good copy this destination still has.
            feedback.error(&format!("Database zipping failed for {slot}"));
            return ArtifactOutcome::Failed("archive write failed".to_string());
        }

        if rotated {
            if let Ok(Some(previous)) = root.find_child(DATABASE_ARCHIVE_ROTATED_NAME) {
                previous.delete();
            }
        }
        debug!("backed up database for {}", slot);
        ArtifactOutcome::Created
    }
}

enum Staleness {
    Current,
    Stale(&'static str),
}

/// One audio directory's rebuild decision and execution, run as a blocking
/// task. Owns everything it needs so sibling tasks share nothing mutable.
struct DirectoryTask {
    root: Arc<dyn StorageNode>,
    name: String,
    files: Vec<PathBuf>,
    recorded_modified: Option<i64>,
    deep_validation: bool,
    feedback: Arc<dyn Feedback>,
}

impl DirectoryTask {
    fn run(self) -> DirectoryReport {
        let outcome = self.execute();
        DirectoryReport {
            name: self.name,
            outcome,
        }
    }

    fn execute(&self) -> ArtifactOutcome {
        let archive_name = format!("{}.zip", self.name);

        let mut replaced_previous = false;
        match self.root.find_child(&archive_name) {
            Ok(Some(previous)) => match self.staleness_of(previous.as_ref()) {
                Staleness::Current => {
                    debug!("archive {} is current, skipping", archive_name);
                    return ArtifactOutcome::UpToDate;
                }
                Staleness::Stale(reason) => {
                    debug!("rebuilding {}: {}", archive_name, reason);
                    previous.delete();
                    replaced_previous = true;
                }
            },
            Ok(None) => {}
            Err(e) => {
                self.feedback
                    .error(&format!("Couldn't read backup state for {}", self.name));
                return ArtifactOutcome::Failed(e.to_string());
            }
        }

        if self.build_fresh(&archive_name) {
            if replaced_previous {
                ArtifactOutcome::Rebuilt
            } else {
                ArtifactOutcome::Created
            }
        } else {
            ArtifactOutcome::Failed("archive write failed".to_string())
        }
    }

    /// The staleness ladder: zero-length, then optional deep validation,
    /// then the timestamp rules.
    fn staleness_of(&self, previous: &dyn StorageNode) -> Staleness {
        if previous.length() == 0 {
            self.feedback.toast(&format!("Empty {}", self.name));
            return Staleness::Stale("zero-length archive");
        }

        if self.deep_validation && !self.passes_deep_validation(previous) {
            self.feedback.toast(&format!("Extra validation {}", self.name));
            return Staleness::Stale("deep validation mismatch");
        }

        let archive_modified = previous.last_modified();
        match self.recorded_modified {
            // Recorded source time not newer than the archive: current.
            Some(recorded) if recorded <= archive_modified => Staleness::Current,
            Some(_) => Staleness::Stale("source directory newer than archive"),
            // No recorded time: fall back to the per-file scan.
            None => {
                let any_newer = self.files.iter().any(|file| {
                    modified_millis(file)
                        .map(|modified| modified >= archive_modified)
                        .unwrap_or(true)
                });
                if any_newer {
                    Staleness::Stale("source file at or after archive time")
                } else {
                    Staleness::Current
                }
            }
        }
    }

    fn passes_deep_validation(&self, previous: &dyn StorageNode) -> bool {
        match previous.open_read() {
            Ok(reader) => is_valid_zip(reader, self.files.len()),
            Err(e) => {
                debug!("could not open {}.zip for validation: {}", self.name, e);
                false
            }
        }
    }

    fn build_fresh(&self, archive_name: &str) -> bool {
        let created = match self.root.create_file(ZIP_MIME_TYPE, archive_name) {
            Ok(node) => node,
            Err(e) => {
                self.feedback
                    .error(&format!("Couldn't create audio backup file {}", self.name));
                debug!("create failed for {}: {}", archive_name, e);
                return false;
            }
        };

        let sink = match created.open_write() {
            Ok(sink) => sink,
            Err(e) => {
                self.feedback
                    .error(&format!("Couldn't create audio backup file {}", self.name));
                debug!("open for write failed for {}: {}", archive_name, e);
                return false;
            }
        };

        if write_archive(&entries_for_files(&self.files), sink) {
            self.feedback.toast(&format!("backed up {}", self.name));
            true
        } else {
            self.feedback
                .error(&format!("zip write failed audio backup file {}", self.name));
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::testing::RecordingFeedback;
    use crate::inventory::{
        mark_directory_updated, AUDIO_MEMO_DIR_NAME, DATA_DIR_NAME, DATABASE_FILE_NAME,
    };
    use crate::storage::{LocalNode, LocalTreeProvider, StorageError, StorageResult};
    use crate::validate::is_valid_zip;
    use std::fs::{self, File};
    use std::path::Path;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn seed_source() -> TempDir {
        let root = TempDir::new().unwrap();
        let data = root.path().join(DATA_DIR_NAME);
        let audio = data.join(AUDIO_MEMO_DIR_NAME);
        fs::create_dir_all(audio.join("1")).unwrap();
        fs::create_dir_all(audio.join("2")).unwrap();
        fs::write(data.join(DATABASE_FILE_NAME), b"sqlite3 payload").unwrap();
        fs::write(audio.join("1").join("a.mp3"), b"aaa").unwrap();
        fs::write(audio.join("1").join("b.mp3"), b"bbbb").unwrap();
        fs::write(audio.join("2").join("c.mp3"), b"ccccc").unwrap();
        root
    }

    fn audio_dir(source: &TempDir, name: &str) -> std::path::PathBuf {
        source
            .path()
            .join(DATA_DIR_NAME)
            .join(AUDIO_MEMO_DIR_NAME)
            .join(name)
    }

    struct Fixture {
        source: TempDir,
        dest: TempDir,
        _registry_dir: TempDir,
        registry: LocationRegistry,
        feedback: Arc<RecordingFeedback>,
    }

    impl Fixture {
        fn new() -> Self {
            let registry_dir = TempDir::new().unwrap();
            let registry = LocationRegistry::open(registry_dir.path().join("locations.json"));
            let dest = TempDir::new().unwrap();
            registry
                .register(BackupSlot::Location1, dest.path().to_str().unwrap())
                .unwrap();
            Self {
                source: seed_source(),
                dest,
                _registry_dir: registry_dir,
                registry,
                feedback: Arc::new(RecordingFeedback::new()),
            }
        }

        fn engine(&self) -> IncrementalBackupEngine {
            self.engine_with_trees(Arc::new(LocalTreeProvider))
        }

        fn engine_with_trees(&self, trees: Arc<dyn TreeProvider>) -> IncrementalBackupEngine {
            let services = BackupServices {
                registry: self.registry.clone(),
                trees,
                feedback: Arc::clone(&self.feedback) as Arc<dyn Feedback>,
                database: None,
            };
            IncrementalBackupEngine::new(self.source.path(), services)
        }

        fn dest_file(&self, name: &str) -> std::path::PathBuf {
            self.dest.path().join(name)
        }
    }

    fn entry_count(path: &Path) -> usize {
        ZipArchive::new(File::open(path).unwrap()).unwrap().len()
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(time).unwrap();
    }

    fn hour() -> Duration {
        Duration::from_secs(3_600)
    }

    fn directory_outcome(report: &DestinationReport, name: &str) -> ArtifactOutcome {
        report
            .directories
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.outcome.clone())
            .unwrap()
    }

    #[tokio::test]
    async fn backs_up_valid_destination_and_skips_invalid() {
        let fixture = Fixture::new();
        fixture
            .registry
            .register(BackupSlot::Location2, "/nonexistent/memprime-dest")
            .unwrap();

        let summary = fixture.engine().run(RunOptions::default()).await.unwrap();

        assert_eq!(summary.destinations.len(), 1);
        assert_eq!(summary.destinations[0].slot, BackupSlot::Location1);
        assert_eq!(summary.skipped, vec![BackupSlot::Location2]);
        assert!(summary.fully_succeeded());

        // Database archive holds exactly the backing file.
        assert!(is_valid_zip(
            File::open(fixture.dest_file(DATABASE_ARCHIVE_NAME)).unwrap(),
            1
        ));
        assert!(!fixture.dest_file(DATABASE_ARCHIVE_ROTATED_NAME).exists());

        // Each audio archive holds the directory's files plus its marker.
        assert_eq!(entry_count(&fixture.dest_file("1.zip")), 3);
        assert_eq!(entry_count(&fixture.dest_file("2.zip")), 2);
    }

    #[tokio::test]
    async fn unchanged_directories_are_not_rewritten() {
        let fixture = Fixture::new();
        let engine = fixture.engine();
        engine.run(RunOptions::default()).await.unwrap();

        // Pin the archives into the future so any rewrite is detectable.
        let future = SystemTime::now() + hour();
        set_mtime(&fixture.dest_file("1.zip"), future);
        set_mtime(&fixture.dest_file("2.zip"), future);

        let summary = engine.run(RunOptions::default()).await.unwrap();
        let report = &summary.destinations[0];
        assert_eq!(directory_outcome(report, "1"), ArtifactOutcome::UpToDate);
        assert_eq!(directory_outcome(report, "2"), ArtifactOutcome::UpToDate);

        let kept = fs::metadata(fixture.dest_file("1.zip"))
            .unwrap()
            .modified()
            .unwrap();
        assert!(kept > SystemTime::now() + Duration::from_secs(1_800));
    }

    #[tokio::test]
    async fn new_recording_triggers_rebuild() {
        let fixture = Fixture::new();
        let engine = fixture.engine();
        engine.run(RunOptions::default()).await.unwrap();

        // Directory 1 gains a recording and a marker touch; its archive is
        // aged so the recorded time is strictly newer. Directory 2 stays
        // pinned in the future.
        set_mtime(&fixture.dest_file("1.zip"), SystemTime::now() - hour());
        set_mtime(&fixture.dest_file("2.zip"), SystemTime::now() + hour());
        let dir1 = audio_dir(&fixture.source, "1");
        fs::write(dir1.join("d.mp3"), b"dddd").unwrap();
        mark_directory_updated(&dir1).unwrap();

        let summary = engine.run(RunOptions::default()).await.unwrap();
        let report = &summary.destinations[0];
        assert_eq!(directory_outcome(report, "1"), ArtifactOutcome::Rebuilt);
        assert_eq!(directory_outcome(report, "2"), ArtifactOutcome::UpToDate);

        // a.mp3, b.mp3, d.mp3 plus the marker
        assert_eq!(entry_count(&fixture.dest_file("1.zip")), 4);
        assert!(is_valid_zip(
            File::open(fixture.dest_file("1.zip")).unwrap(),
            4
        ));
    }

    #[tokio::test]
    async fn zero_length_archive_is_always_replaced() {
        let fixture = Fixture::new();

        // An empty archive pinned far into the future would survive every
        // timestamp rule; the zero-length check must replace it anyway.
        fs::write(fixture.dest_file("1.zip"), b"").unwrap();
        set_mtime(&fixture.dest_file("1.zip"), SystemTime::now() + hour());

        let summary = fixture.engine().run(RunOptions::default()).await.unwrap();
        let report = &summary.destinations[0];
        assert_eq!(directory_outcome(report, "1"), ArtifactOutcome::Rebuilt);
        assert!(fs::metadata(fixture.dest_file("1.zip")).unwrap().len() > 0);
    }

    #[tokio::test]
    async fn missing_database_aborts_before_any_write() {
        let fixture = Fixture::new();
        fs::remove_file(
            fixture
                .source
                .path()
                .join(DATA_DIR_NAME)
                .join(DATABASE_FILE_NAME),
        )
        .unwrap();

        let err = fixture
            .engine()
            .run(RunOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DatabaseMissing { .. }));

        // No partial artifacts at the destination.
        assert_eq!(fs::read_dir(fixture.dest.path()).unwrap().count(), 0);
        assert!(fixture
            .feedback
            .error_messages()
            .iter()
            .any(|m| m.contains("database file not found")));
    }

    struct FlakyNode {
        inner: LocalNode,
        create_failures: Arc<AtomicU32>,
        create_attempts: Arc<AtomicU32>,
    }

    impl StorageNode for FlakyNode {
        fn name(&self) -> String {
            self.inner.name()
        }
        fn exists(&self) -> bool {
            self.inner.exists()
        }
        fn is_directory(&self) -> bool {
            self.inner.is_directory()
        }
        fn length(&self) -> u64 {
            self.inner.length()
        }
        fn last_modified(&self) -> i64 {
            self.inner.last_modified()
        }
        fn find_child(&self, name: &str) -> StorageResult<Option<Arc<dyn StorageNode>>> {
            self.inner.find_child(name)
        }
        fn create_file(&self, mime_type: &str, name: &str) -> StorageResult<Arc<dyn StorageNode>> {
            if name == DATABASE_ARCHIVE_NAME {
                self.create_attempts.fetch_add(1, Ordering::SeqCst);
                if self.create_failures.load(Ordering::SeqCst) > 0 {
                    self.create_failures.fetch_sub(1, Ordering::SeqCst);
                    return Err(StorageError::create_failed(name, "simulated outage"));
                }
            }
            self.inner.create_file(mime_type, name)
        }
        fn create_directory(&self, name: &str) -> StorageResult<Arc<dyn StorageNode>> {
            self.inner.create_directory(name)
        }
        fn delete(&self) -> bool {
            self.inner.delete()
        }
        fn rename(&self, new_name: &str) -> bool {
            self.inner.rename(new_name)
        }
        fn open_read(&self) -> StorageResult<Box<dyn crate::storage::ReadSeek>> {
            self.inner.open_read()
        }
        fn open_write(&self) -> StorageResult<Box<dyn crate::storage::WriteSeek>> {
            self.inner.open_write()
        }
    }

    struct FlakyProvider {
        create_failures: Arc<AtomicU32>,
        create_attempts: Arc<AtomicU32>,
    }

    impl TreeProvider for FlakyProvider {
        fn open(&self, identifier: &str) -> Option<Arc<dyn StorageNode>> {
            Some(Arc::new(FlakyNode {
                inner: LocalNode::new(identifier),
                create_failures: Arc::clone(&self.create_failures),
                create_attempts: Arc::clone(&self.create_attempts),
            }))
        }
    }

    #[tokio::test]
    async fn database_sink_creation_recovers_within_retry_budget() {
        let fixture = Fixture::new();
        let failures = Arc::new(AtomicU32::new(2));
        let attempts = Arc::new(AtomicU32::new(0));
        let engine = fixture.engine_with_trees(Arc::new(FlakyProvider {
            create_failures: Arc::clone(&failures),
            create_attempts: Arc::clone(&attempts),
        }));

        let summary = engine.run(RunOptions::default()).await.unwrap();
        let report = &summary.destinations[0];
        assert_eq!(report.database, ArtifactOutcome::Created);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(is_valid_zip(
            File::open(fixture.dest_file(DATABASE_ARCHIVE_NAME)).unwrap(),
            1
        ));
    }

    #[tokio::test]
    async fn database_failure_still_backs_up_audio_directories() {
        let fixture = Fixture::new();
        let failures = Arc::new(AtomicU32::new(u32::MAX));
        let attempts = Arc::new(AtomicU32::new(0));
        let engine = fixture.engine_with_trees(Arc::new(FlakyProvider {
            create_failures: Arc::clone(&failures),
            create_attempts: Arc::clone(&attempts),
        }));

        let summary = engine.run(RunOptions::default()).await.unwrap();
        let report = &summary.destinations[0];
        assert!(report.database.is_failure());
        assert!(!summary.fully_succeeded());
        // The budget is three creation attempts, never more.
        assert_eq!(attempts.load(Ordering::SeqCst), 3);

        assert_eq!(directory_outcome(report, "1"), ArtifactOutcome::Created);
        assert_eq!(directory_outcome(report, "2"), ArtifactOutcome::Created);
        assert!(fixture
            .feedback
            .error_messages()
            .iter()
            .any(|m| m.contains("Database backup failed repeatedly")));
    }

    #[tokio::test]
    async fn deep_validation_rebuilds_a_miscounted_archive() {
        let fixture = Fixture::new();
        let engine = fixture.engine();
        engine.run(RunOptions::default()).await.unwrap();

        // Replace 1.zip with an archive of the wrong entry count, pinned
        // into the future so the timestamp fast path would keep it.
        let bogus_source = TempDir::new().unwrap();
        fs::write(bogus_source.path().join("only.mp3"), b"x").unwrap();
        let sink = File::create(fixture.dest_file("1.zip")).unwrap();
        assert!(write_archive(
            &entries_for_files(&[bogus_source.path().join("only.mp3")]),
            Box::new(sink),
        ));
        set_mtime(&fixture.dest_file("1.zip"), SystemTime::now() + hour());
        set_mtime(&fixture.dest_file("2.zip"), SystemTime::now() + hour());

        // Without deep validation the mismatch goes unnoticed.
        let summary = engine.run(RunOptions::default()).await.unwrap();
        assert_eq!(
            directory_outcome(&summary.destinations[0], "1"),
            ArtifactOutcome::UpToDate
        );

        let summary = engine
            .run(RunOptions {
                deep_validation: true,
                ..RunOptions::default()
            })
            .await
            .unwrap();
        let report = &summary.destinations[0];
        assert_eq!(directory_outcome(report, "1"), ArtifactOutcome::Rebuilt);
        assert_eq!(entry_count(&fixture.dest_file("1.zip")), 3);
    }

    #[tokio::test]
    async fn database_rotation_leaves_a_single_generation() {
        let fixture = Fixture::new();
        let engine = fixture.engine();

        engine.run(RunOptions::default()).await.unwrap();
        let summary = engine.run(RunOptions::default()).await.unwrap();

        assert_eq!(summary.destinations[0].database, ArtifactOutcome::Created);
        assert!(fixture.dest_file(DATABASE_ARCHIVE_NAME).exists());
        assert!(!fixture.dest_file(DATABASE_ARCHIVE_ROTATED_NAME).exists());
    }

    #[tokio::test]
    async fn empty_registry_is_nothing_to_do() {
        let registry_dir = TempDir::new().unwrap();
        let source = seed_source();
        let feedback = Arc::new(RecordingFeedback::new());
        let services = BackupServices {
            registry: LocationRegistry::open(registry_dir.path().join("locations.json")),
            trees: Arc::new(LocalTreeProvider),
            feedback: Arc::clone(&feedback) as Arc<dyn Feedback>,
            database: None,
        };
        let engine = IncrementalBackupEngine::new(source.path(), services);

        let summary = engine
            .run(RunOptions {
                announce: true,
                ..RunOptions::default()
            })
            .await
            .unwrap();
        assert!(summary.nothing_to_do());
        assert!(summary
            .fully_succeeded());
        assert!(feedback
            .spoken_messages()
            .contains(&"no backup needed".to_string()));
    }

    struct ClosingHandle {
        closed: AtomicU32,
    }

    impl DatabaseHandle for ClosingHandle {
        fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn database_handle_is_closed_before_scanning() {
        let fixture = Fixture::new();
        let handle = Arc::new(ClosingHandle {
            closed: AtomicU32::new(0),
        });
        let services = BackupServices {
            registry: fixture.registry.clone(),
            trees: Arc::new(LocalTreeProvider),
            feedback: Arc::clone(&fixture.feedback) as Arc<dyn Feedback>,
            database: Some(Arc::clone(&handle) as Arc<dyn DatabaseHandle>),
        };
        let engine = IncrementalBackupEngine::new(fixture.source.path(), services);

        engine.run(RunOptions::default()).await.unwrap();
        assert_eq!(handle.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn announcements_cover_the_run_lifecycle() {
        let fixture = Fixture::new();
        fixture
            .engine()
            .run(RunOptions {
                announce: true,
                ..RunOptions::default()
            })
            .await
            .unwrap();

        let spoken = fixture.feedback.spoken_messages();
        assert!(spoken.contains(&"starting backup".to_string()));
        assert!(spoken.contains(&"backups needed 1".to_string()));
        assert!(spoken.contains(&"backup finished for location 1".to_string()));
    }

    #[tokio::test]
    async fn spawn_returns_immediately_and_signals_completion() {
        let fixture = Fixture::new();
        let engine = Arc::new(fixture.engine());
        let (tx, rx) = tokio::sync::oneshot::channel();

        let job = engine.spawn(
            RunOptions::default(),
            Some(Box::new(move |success| {
                let _ = tx.send(success);
            })),
        );

        let summary = job.wait().await.unwrap();
        assert!(summary.fully_succeeded());
        assert!(rx.await.unwrap());
        assert!(fixture.dest_file(DATABASE_ARCHIVE_NAME).exists());
    }
}
