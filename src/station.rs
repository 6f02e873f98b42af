//! Shared state between the poller and the HTTP handlers.
//!
//! The latest reading and the recording session live behind a single lock, so a
//! reader never sees one updated without the other, and stopping a session can
//! never close the file while the poller is appending to it.

use std::io;

use chrono::{DateTime, Local, NaiveDateTime};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::archive::Archive;

pub mod session;

pub use session::Session;

#[derive(Debug, thiserror::Error)]
pub enum RecordingError {
    #[error("failed to create recording file: {0}")]
    Io(#[from] io::Error),
    #[error("recording file {0} already exists")]
    Exists(String),
    #[error("not recording")]
    NotRecording,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Changed,
    /// the session was already in the requested state
    Unchanged,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RecordingStatus {
    pub recording: bool,
    pub paused: bool,
    pub file: Option<String>,
    pub started_at: Option<String>,
}

#[derive(Debug, Default)]
struct Inner {
    reading: Option<String>,
    session: Option<Session>,
}

#[derive(Debug)]
pub struct Station {
    inner: Mutex<Inner>,
    archive: Archive,
}

impl Station {
    pub fn new(archive: Archive) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            archive,
        }
    }

    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    pub async fn latest(&self) -> Option<String> {
        self.inner.lock().await.reading.clone()
    }

    /// Replace the published reading, and record it if a session is active.
    ///
    /// An absent reading (failed poll) is published but never recorded
    pub async fn publish(&self, reading: Option<String>) {
        self.publish_at(reading, Local::now().naive_local()).await
    }

    pub(crate) async fn publish_at(&self, reading: Option<String>, at: NaiveDateTime) {
        let mut inner = self.inner.lock().await;
        inner.reading = reading;
        let Inner { reading, session } = &mut *inner;
        if let (Some(reading), Some(session)) =
            (reading.as_deref(), session.as_mut().filter(|s| !s.paused))
        {
            // the lock is held until the row is on disk
            if let Err(e) = session.append(at, reading).await {
                error!(file = session.file_name(), "failed to record reading: {e}");
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn start_recording(&self) -> Result<Transition, RecordingError> {
        self.start_recording_at(Local::now()).await
    }

    pub(crate) async fn start_recording_at(
        &self,
        at: DateTime<Local>,
    ) -> Result<Transition, RecordingError> {
        let mut inner = self.inner.lock().await;
        if inner.session.is_some() {
            debug!("already recording");
            return Ok(Transition::Unchanged);
        }
        inner.session = Some(Session::create(&self.archive, at).await?);
        Ok(Transition::Changed)
    }

    #[instrument(skip(self))]
    pub async fn stop_recording(&self) -> Transition {
        let session = self.inner.lock().await.session.take();
        match session {
            Some(session) => {
                let name = session.file_name().to_owned();
                if let Err(e) = session.close().await {
                    warn!(file = %name, "error closing recording file: {e}");
                }
                Transition::Changed
            }
            None => {
                debug!("not recording");
                Transition::Unchanged
            }
        }
    }

    pub async fn set_paused(&self, paused: bool) -> Result<Transition, RecordingError> {
        let mut inner = self.inner.lock().await;
        let session = inner
            .session
            .as_mut()
            .ok_or(RecordingError::NotRecording)?;
        if session.paused == paused {
            return Ok(Transition::Unchanged);
        }
        session.paused = paused;
        info!(file = session.file_name(), paused, "recording pause state changed");
        Ok(Transition::Changed)
    }

    pub async fn recording_status(&self) -> RecordingStatus {
        let inner = self.inner.lock().await;
        match &inner.session {
            Some(session) => RecordingStatus {
                recording: true,
                paused: session.paused,
                file: Some(session.file_name().to_owned()),
                started_at: Some(session.started_at().to_rfc3339()),
            },
            None => RecordingStatus {
                recording: false,
                paused: false,
                file: None,
                started_at: None,
            },
        }
    }

    /// best-effort close of any open session, called on shutdown
    pub async fn close(&self) {
        if self.stop_recording().await == Transition::Changed {
            info!("closed active recording session on shutdown");
        }
    }
}
