//! The set of recorded sessions on disk. The directory listing is the only index

use std::{io, path::PathBuf};

use chrono::{DateTime, Local, NaiveDateTime};

use crate::misc::RecordsPath;

pub const HEADER: [&str; 2] = ["Timestamp", "Reading"];
const EXTENSION: &str = "csv";

/// Fixed width, so lexicographic order is chronological order
pub fn format_timestamp(at: &NaiveDateTime) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

pub fn session_file_name(started_at: &DateTime<Local>) -> String {
    started_at.format("%Y%m%d_%H%M%S.csv").to_string()
}

/// encode a single CSV record (including the line terminator)
pub fn encode_record<I, T>(fields: I) -> io::Result<Vec<u8>>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut wr = csv::Writer::from_writer(Vec::new());
    wr.write_record(fields)?;
    wr.into_inner().map_err(|e| e.into_error())
}

#[derive(Debug, Clone)]
pub struct Archive {
    dir: RecordsPath,
}

impl Archive {
    pub fn new(dir: RecordsPath) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &RecordsPath {
        &self.dir
    }

    /// Names of all session files, sorted. Creates the directory if it does not exist yet
    #[instrument(skip(self))]
    pub async fn list(&self) -> io::Result<Vec<String>> {
        self.dir.ensure_exists().await?;
        let mut entries = tokio::fs::read_dir(self.dir.dir()).await?;
        let mut files = vec![];
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                warn!(name = ?entry.file_name(), "skipping non UTF-8 file name");
                continue;
            };
            if is_session_file(&name) {
                files.push(name);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Resolve an untrusted file name to an existing session file inside the archive.
    ///
    /// Anything that is not a plain session file name directly inside the directory
    /// (including symlinks leading out of it) resolves to `None`
    pub async fn locate(&self, name: &str) -> Option<PathBuf> {
        if !is_session_file(name) {
            return None;
        }
        let path = self.dir.checked_path(name)?;
        let (Ok(real), Ok(root)) = (
            tokio::fs::canonicalize(&path).await,
            tokio::fs::canonicalize(self.dir.dir()).await,
        ) else {
            return None;
        };
        if !real.starts_with(&root) {
            warn!(?path, "refusing to serve file outside of the data directory");
            return None;
        }
        match tokio::fs::metadata(&real).await {
            Ok(meta) if meta.is_file() => Some(real),
            _ => None,
        }
    }
}

fn is_session_file(name: &str) -> bool {
    name.len() > EXTENSION.len() + 1
        && name
            .rsplit_once('.')
            .is_some_and(|(_, ext)| ext == EXTENSION)
}

#[cfg(test)]
pub(crate) mod test {
    use std::path::PathBuf;

    use chrono::{NaiveDate, TimeZone};
    use tracing_test::traced_test;

    use super::*;

    /// a fresh, not yet existing, directory under the system temp dir
    pub fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("sensord-test-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn file_name_from_start_time() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(session_file_name(&at), "20240309_070501.csv");
    }

    #[test]
    fn timestamps_are_fixed_width() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let whole = d.and_hms_opt(7, 5, 1).unwrap();
        let frac = d.and_hms_micro_opt(7, 5, 1, 250).unwrap();
        assert_eq!(format_timestamp(&whole), "2024-03-09T07:05:01.000000");
        assert_eq!(format_timestamp(&frac), "2024-03-09T07:05:01.000250");
        assert!(format_timestamp(&whole) < format_timestamp(&frac));
    }

    #[test]
    fn records_are_quoted() {
        assert_eq!(encode_record(HEADER).unwrap(), b"Timestamp,Reading\n");
        assert_eq!(
            encode_record(["t", "1,5"]).unwrap(),
            b"t,\"1,5\"\n".to_vec()
        );
        assert_eq!(encode_record(["t", ""]).unwrap(), b"t,\n");
    }

    #[tokio::test]
    #[traced_test]
    async fn list_creates_missing_dir() {
        let dir = scratch_dir();
        let archive = Archive::new(RecordsPath::new(dir.clone()));
        assert!(archive.list().await.unwrap().is_empty());
        assert!(dir.is_dir());
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    #[traced_test]
    async fn list_filters_session_files() {
        let dir = scratch_dir();
        std::fs::create_dir_all(dir.join("nested.csv")).unwrap();
        std::fs::write(dir.join("20240101_000002.csv"), "").unwrap();
        std::fs::write(dir.join("20240101_000001.csv"), "").unwrap();
        std::fs::write(dir.join("notes.txt"), "").unwrap();
        let archive = Archive::new(RecordsPath::new(dir.clone()));
        assert_eq!(
            archive.list().await.unwrap(),
            vec!["20240101_000001.csv", "20240101_000002.csv"]
        );
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    #[traced_test]
    async fn locate_stays_inside_archive() {
        let root = scratch_dir();
        let dir = root.join("data");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("20240101_000001.csv"), "x").unwrap();
        std::fs::write(root.join("outside.csv"), "secret").unwrap();
        std::fs::write(dir.join("notes.txt"), "").unwrap();
        let archive = Archive::new(RecordsPath::new(dir.clone()));

        assert!(archive.locate("20240101_000001.csv").await.is_some());
        assert!(archive.locate("missing.csv").await.is_none());
        assert!(archive.locate("../outside.csv").await.is_none());
        assert!(archive.locate("notes.txt").await.is_none());
        assert!(archive.locate("../../etc/passwd").await.is_none());

        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(root.join("outside.csv"), dir.join("link.csv")).unwrap();
            assert!(archive.locate("link.csv").await.is_none());
        }
        std::fs::remove_dir_all(root).unwrap();
    }
}
