use std::io;

use chrono::{DateTime, Local, NaiveDateTime};
use tokio::{
    fs::{File, OpenOptions},
    io::AsyncWriteExt,
};

use crate::archive::{self, Archive};

use super::RecordingError;

/// One recording session, backed by exactly one CSV file
#[derive(Debug)]
pub struct Session {
    file_name: String,
    file: File,
    started_at: DateTime<Local>,
    last_row: Option<NaiveDateTime>,
    rows: u64,
    /// a previous append failed, possibly leaving a partial line behind
    torn: bool,
    pub paused: bool,
}

impl Session {
    /// Create the session file and write the header row
    #[instrument(skip(archive))]
    pub async fn create(archive: &Archive, started_at: DateTime<Local>) -> Result<Self, RecordingError> {
        archive.dir().ensure_exists().await?;
        let file_name = archive::session_file_name(&started_at);
        let path = archive.dir().path(&file_name);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => RecordingError::Exists(file_name.clone()),
                _ => RecordingError::Io(e),
            })?;
        file.write_all(&archive::encode_record(archive::HEADER)?)
            .await?;
        file.flush().await?;
        file.sync_data().await?;
        info!(?path, "started recording session");
        Ok(Self {
            file_name,
            file,
            started_at,
            last_row: None,
            rows: 0,
            torn: false,
            paused: false,
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// Append one row and force it to disk before returning.
    ///
    /// Row timestamps within a session are strictly increasing: if the clock went
    /// backwards (or did not move) the row is stamped 1µs after the previous one.
    /// After a failed append the next row starts on a fresh line
    pub async fn append(&mut self, at: NaiveDateTime, reading: &str) -> io::Result<()> {
        let at = match self.last_row {
            Some(last) if at <= last => last + chrono::Duration::microseconds(1),
            _ => at,
        };
        let mut row = archive::encode_record([
            archive::format_timestamp(&at).as_str(),
            reading,
        ])?;
        if self.torn {
            row.insert(0, b'\n');
        }
        self.torn = true;
        self.file.write_all(&row).await?;
        self.file.flush().await?;
        self.file.sync_data().await?;
        self.torn = false;
        self.last_row = Some(at);
        self.rows += 1;
        Ok(())
    }

    pub async fn close(mut self) -> io::Result<()> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        info!(
            file = %self.file_name,
            rows = self.rows,
            "closed recording session"
        );
        Ok(())
    }
}
