//! Board collaborators: program storage writer, persistent storage,
//! restart and status LED.
//!
//! The pipeline and factory reset only see the traits. `MemoryFlash` and
//! `SimulatedSystem` back the tests and the host simulator; `DirSystem`
//! treats a directory as the persistent storage partition.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::update::layout::UpdateTarget;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlashError {
    #[error("No update in progress")]
    NotStarted,

    #[error("Update already in progress")]
    Busy,

    #[error("Image of {requested} bytes does not fit into {capacity} bytes")]
    TooLarge { requested: usize, capacity: usize },

    #[error("Write failed: {0}")]
    Write(String),

    #[error("Commit failed: {0}")]
    Commit(String),
}

/// Program storage update transaction.
pub trait FlashWriter {
    /// Open a transaction for `size` bytes of `target`.
    fn begin(&mut self, target: UpdateTarget, size: usize) -> Result<(), FlashError>;

    /// Append bytes. Returns how many were accepted; anything short of
    /// `data.len()` leaves the transaction unusable.
    fn write(&mut self, data: &[u8]) -> Result<usize, FlashError>;

    /// Verify and activate what was written.
    fn end(&mut self) -> Result<(), FlashError>;

    /// Drop the open transaction, if any.
    fn abort(&mut self);
}

#[derive(Debug, Default)]
struct MemoryFlashState {
    open: Option<(UpdateTarget, usize)>,
    staged: Vec<u8>,
    committed: HashMap<UpdateTarget, Vec<u8>>,
    /// Sizes of accepted writes, in order.
    writes: Vec<usize>,
    aborts: usize,
    fail_after: Option<usize>,
    fail_commit: bool,
}

/// In-memory program storage.
///
/// Clones share state so a test can inspect what the pipeline wrote.
#[derive(Debug, Clone)]
pub struct MemoryFlash {
    capacity: usize,
    state: Arc<Mutex<MemoryFlashState>>,
}

impl MemoryFlash {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Arc::new(Mutex::new(MemoryFlashState::default())),
        }
    }

    /// Accept only `bytes` more bytes in total, then write short.
    pub fn fail_after(&self, bytes: usize) {
        self.state.lock().unwrap().fail_after = Some(bytes);
    }

    /// Make the next `end` fail.
    pub fn fail_commit(&self) {
        self.state.lock().unwrap().fail_commit = true;
    }

    pub fn committed(&self, target: UpdateTarget) -> Option<Vec<u8>> {
        self.state.lock().unwrap().committed.get(&target).cloned()
    }

    /// Bytes of the open transaction.
    pub fn staged(&self) -> Vec<u8> {
        self.state.lock().unwrap().staged.clone()
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().unwrap().open.is_some()
    }

    pub fn write_sizes(&self) -> Vec<usize> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn abort_count(&self) -> usize {
        self.state.lock().unwrap().aborts
    }
}

impl FlashWriter for MemoryFlash {
    fn begin(&mut self, target: UpdateTarget, size: usize) -> Result<(), FlashError> {
        let mut state = self.state.lock().unwrap();
        if state.open.is_some() {
            return Err(FlashError::Busy);
        }
        if size > self.capacity {
            return Err(FlashError::TooLarge {
                requested: size,
                capacity: self.capacity,
            });
        }
        state.open = Some((target, size));
        state.staged.clear();
        state.writes.clear();
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, FlashError> {
        let mut state = self.state.lock().unwrap();
        let Some((_, size)) = state.open else {
            return Err(FlashError::NotStarted);
        };

        let room = size.saturating_sub(state.staged.len());
        let mut accepted = data.len().min(room);
        if let Some(budget) = state.fail_after.as_mut() {
            accepted = accepted.min(*budget);
            *budget -= accepted;
        }

        state.staged.extend_from_slice(&data[..accepted]);
        state.writes.push(accepted);
        Ok(accepted)
    }

    fn end(&mut self) -> Result<(), FlashError> {
        let mut state = self.state.lock().unwrap();
        let Some((target, _)) = state.open.take() else {
            return Err(FlashError::NotStarted);
        };
        if state.fail_commit {
            state.fail_commit = false;
            state.staged.clear();
            return Err(FlashError::Commit("image verification failed".into()));
        }
        let image = std::mem::take(&mut state.staged);
        debug!(image = %target, len = image.len(), "Committed image");
        state.committed.insert(target, image);
        Ok(())
    }

    fn abort(&mut self) {
        let mut state = self.state.lock().unwrap();
        if state.open.take().is_some() {
            state.staged.clear();
            state.aborts += 1;
        }
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage is not mounted")]
    NotMounted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Board services the factory reset and the restart tasks need.
pub trait System {
    /// Erase all persistent storage.
    fn format_storage(&mut self) -> Result<(), StorageError>;

    /// Restart the controller. On hardware this does not return.
    fn restart(&mut self);

    /// Start blinking the status LED. Returns false if the board has none.
    fn start_status_led(&mut self) -> bool;
}

#[derive(Debug, Default)]
struct SimulatedState {
    formats: usize,
    restarts: usize,
    led_blinking: bool,
    has_led: bool,
    storage_broken: bool,
}

/// Records what the controller asked the board to do.
#[derive(Debug, Clone, Default)]
pub struct SimulatedSystem {
    state: Arc<Mutex<SimulatedState>>,
}

impl SimulatedSystem {
    pub fn new(has_led: bool) -> Self {
        let system = Self::default();
        system.state.lock().unwrap().has_led = has_led;
        system
    }

    /// Make `format_storage` fail.
    pub fn break_storage(&self) {
        self.state.lock().unwrap().storage_broken = true;
    }

    pub fn format_count(&self) -> usize {
        self.state.lock().unwrap().formats
    }

    pub fn restart_count(&self) -> usize {
        self.state.lock().unwrap().restarts
    }

    pub fn led_blinking(&self) -> bool {
        self.state.lock().unwrap().led_blinking
    }
}

impl System for SimulatedSystem {
    fn format_storage(&mut self) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap();
        if state.storage_broken {
            return Err(StorageError::NotMounted);
        }
        state.formats += 1;
        Ok(())
    }

    fn restart(&mut self) {
        self.state.lock().unwrap().restarts += 1;
    }

    fn start_status_led(&mut self) -> bool {
        let mut state = self.state.lock().unwrap();
        state.led_blinking = state.has_led;
        state.has_led
    }
}

/// Persistent storage backed by a host directory.
#[derive(Debug, Clone)]
pub struct DirSystem {
    root: PathBuf,
    restarted: bool,
}

impl DirSystem {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            restarted: false,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn restarted(&self) -> bool {
        self.restarted
    }
}

impl System for DirSystem {
    fn format_storage(&mut self) -> Result<(), StorageError> {
        if !self.root.is_dir() {
            return Err(StorageError::NotMounted);
        }
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.is_dir() {
                std::fs::remove_dir_all(&path)?;
            } else {
                std::fs::remove_file(&path)?;
            }
        }
        info!(root = %self.root.display(), "Storage formatted");
        Ok(())
    }

    fn restart(&mut self) {
        warn!("Restarting");
        self.restarted = true;
    }

    fn start_status_led(&mut self) -> bool {
        false
    }
}
