//! List persistence.
//!
//! Block and allow lists are mirrored to flat JSON-lines files by a
//! background writer task. Mutating paths hand the writer a point-in-time
//! snapshot over an unbounded channel; the writer serializes to a temp
//! file and renames it into place, retrying transient failures with a
//! backoff before surrendering. Enforcement never waits on a write.
//!
//! Loading tolerates damage: a missing file means an empty list, and an
//! unreadable line is skipped rather than failing the load.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write as _};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::PersistConfig;
use crate::error::SentryResult;
use crate::lists::{Blacklist, BlacklistEntry, Whitelist};

/// File name of the persisted deny list.
pub const BLACKLIST_FILE: &str = "blacklist.json";

/// File name of the persisted allow list.
pub const WHITELIST_FILE: &str = "whitelist.json";

/// One snapshot queued for the writer task.
#[derive(Debug, Clone)]
pub enum PersistJob {
    /// Full deny-list snapshot.
    Blacklist(Vec<BlacklistEntry>),
    /// Full allow-list snapshot.
    Whitelist(Vec<Uuid>),
}

/// Mirrors list snapshots to disk off the enforcement path.
#[derive(Debug)]
pub struct ListStore {
    dir: PathBuf,
    retry_attempts: u32,
    retry_backoff: Duration,
    tx: RwLock<Option<UnboundedSender<PersistJob>>>,
}

impl ListStore {
    /// Create a store from configuration.
    #[must_use]
    pub fn from_config(config: &PersistConfig) -> Self {
        Self {
            dir: config.dir.clone(),
            retry_attempts: config.retry_attempts.max(1),
            retry_backoff: config.retry_backoff,
            tx: RwLock::new(None),
        }
    }

    /// Load both lists from disk.
    ///
    /// Returns how many records were installed into each list. Missing or
    /// unreadable files yield empty lists, never an error.
    pub fn load(&self, blacklist: &Blacklist, whitelist: &Whitelist) -> (usize, usize) {
        let banned = blacklist.load_records(self.read_lines(BLACKLIST_FILE));
        let allowed = whitelist.load_players(self.read_lines(WHITELIST_FILE));
        info!(banned, allowed, dir = %self.dir.display(), "persisted lists loaded");
        (banned, allowed)
    }

    /// Spawn the writer task and open the job queue.
    ///
    /// The task drains jobs until [`Self::stop_writer`] closes the queue,
    /// then exits. Must run inside a tokio runtime.
    pub fn start_writer(self: &Arc<Self>) -> JoinHandle<()> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        *self.tx.write() = Some(tx);
        let store = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                store.write_with_retry(&job).await;
            }
            debug!("list writer drained and stopped");
        })
    }

    /// Close the job queue. Already-queued snapshots still get written.
    pub fn stop_writer(&self) {
        self.tx.write().take();
    }

    /// Queue a deny-list snapshot for writing.
    pub fn enqueue_blacklist(&self, entries: Vec<BlacklistEntry>) {
        self.enqueue(PersistJob::Blacklist(entries));
    }

    /// Queue an allow-list snapshot for writing.
    pub fn enqueue_whitelist(&self, players: Vec<Uuid>) {
        self.enqueue(PersistJob::Whitelist(players));
    }

    /// Write both lists inline, bypassing the queue. Used at shutdown.
    pub fn flush(&self, blacklist: &Blacklist, whitelist: &Whitelist) -> SentryResult<()> {
        self.write_lines(BLACKLIST_FILE, &blacklist.entries())?;
        self.write_lines(WHITELIST_FILE, &whitelist.players())?;
        Ok(())
    }

    fn enqueue(&self, job: PersistJob) {
        let guard = self.tx.read();
        match guard.as_ref() {
            Some(tx) => {
                if tx.send(job).is_err() {
                    warn!("list writer gone, snapshot dropped");
                }
            }
            None => warn!("list writer not running, snapshot dropped"),
        }
    }

    async fn write_with_retry(&self, job: &PersistJob) {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.write_job(job) {
                Ok(()) => return,
                Err(err) if attempt < self.retry_attempts => {
                    warn!(attempt, error = %err, "list write failed, retrying");
                    tokio::time::sleep(self.retry_backoff).await;
                }
                Err(err) => {
                    error!(attempts = attempt, error = %err, "list write surrendered");
                    return;
                }
            }
        }
    }

    fn write_job(&self, job: &PersistJob) -> SentryResult<()> {
        match job {
            PersistJob::Blacklist(entries) => self.write_lines(BLACKLIST_FILE, entries),
            PersistJob::Whitelist(players) => self.write_lines(WHITELIST_FILE, players),
        }
    }

    /// Serialize records one JSON object per line, temp file then rename.
    fn write_lines<T: Serialize>(&self, name: &str, records: &[T]) -> SentryResult<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(name);
        let tmp = self.dir.join(format!("{name}.tmp"));
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            for record in records {
                let line = serde_json::to_string(record)?;
                writeln!(writer, "{line}")?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp, &path)?;
        debug!(path = %path.display(), records = records.len(), "list written");
        Ok(())
    }

    fn read_lines<T: DeserializeOwned>(&self, name: &str) -> Vec<T> {
        let path = self.dir.join(name);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no persisted list, starting empty");
                return Vec::new();
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "persisted list unreadable, starting empty");
                return Vec::new();
            }
        };

        let mut records = Vec::new();
        let mut skipped = 0_usize;
        for line in BufReader::new(file).lines() {
            let Ok(line) = line else {
                skipped += 1;
                continue;
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(record) => records.push(record),
                Err(_) => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(path = %path.display(), skipped, "damaged list lines skipped");
        }
        records
    }
}
