//! Background polling thread driving `BackupScheduler::tick`.

use super::{BackupResult, BackupScheduler};
use chrono::Utc;
use log::{debug, warn};
use parking_lot::Mutex;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Polls the scheduler every `period` until dropped.
///
/// The scheduler lock is held only for one tick. Tick failures are logged
/// and retried on the next period.
#[derive(Debug)]
pub struct BackupTimer {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl BackupTimer {
    pub fn spawn(scheduler: Arc<Mutex<BackupScheduler>>, period: Duration) -> BackupResult<Self> {
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("oeannotator-backup".to_string())
            .spawn(move || loop {
                match stopped.recv_timeout(period) {
                    Err(RecvTimeoutError::Timeout) => {
                        let mut scheduler = scheduler.lock();
                        match scheduler.tick(Utc::now()) {
                            Ok(Some(entry)) => debug!(
                                "event=backup_tick module=backup status=ok file={}",
                                entry.file_name()
                            ),
                            Ok(None) => {}
                            Err(err) => warn!(
                                "event=backup_tick module=backup status=error error={}",
                                err
                            ),
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;
        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
        })
    }
}

impl Drop for BackupTimer {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("event=backup_timer_stop module=backup status=error error=worker_panicked");
            }
        }
    }
}
