use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use serde::Deserialize;

#[cfg(test)]
#[test]
fn load_example_config() {
    let cfg = from_str(include_str!("../../config.example.toml")).unwrap();
    assert_eq!(cfg.directory.data, PathBuf::from("data"));
    assert_eq!(cfg.serial.device, "/dev/ttyUSB0");
    assert_eq!(cfg.serial.baud_rate, 9600);
    assert_eq!(cfg.serial.timeout(), Duration::from_secs(1));
    assert_eq!(cfg.http.port, 5000);
    assert_eq!(cfg.poll.interval(), Duration::from_secs(1));
}

#[cfg(test)]
#[test]
fn missing_sections_use_defaults() {
    let cfg = from_str(
        r#"
        [directory]
        data = "/var/lib/sensord"
        run = "/run/sensord"

        [serial]
        device = "/dev/ttyACM0"
        "#,
    )
    .unwrap();
    assert_eq!(cfg.serial.device, "/dev/ttyACM0");
    assert_eq!(cfg.serial.baud_rate, 9600);
    assert_eq!(cfg.http, Http::default());
    assert_eq!(cfg.poll, Poll::default());
}

#[cfg(test)]
#[test]
fn directory_is_required() {
    assert!(from_str("[http]\nport = 8080\n").is_err());
}

pub fn from_str(source: &str) -> Result<self::Config> {
    let settings = config::Config::builder()
        .add_source(config::File::from_str(source, config::FileFormat::Toml))
        .build()?
        .try_deserialize()?;
    Ok(settings)
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// directories to store various things
    pub directory: Directories,
    /// the sensor's serial link
    #[serde(default)]
    pub serial: Serial,
    /// the HTTP control surface
    #[serde(default)]
    pub http: Http,
    #[serde(default)]
    pub poll: Poll,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Directories {
    /// the directory recorded sessions are written to
    pub data: PathBuf,
    /// the directory to store runtime information (must be
    /// able to delete this *between* server runs, with no consequence)
    ///
    /// e.g. log files, daemon PID files
    pub run: PathBuf,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Serial {
    pub device: String,
    pub baud_rate: u32,
    /// read timeout of the link, in milliseconds
    pub timeout_ms: u64,
}

impl Serial {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for Serial {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            timeout_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Http {
    pub host: String,
    pub port: u16,
}

impl Default for Http {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Poll {
    /// time between sensor queries, in milliseconds
    pub interval_ms: u64,
}

impl Poll {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for Poll {
    fn default() -> Self {
        Self { interval_ms: 1000 }
    }
}
