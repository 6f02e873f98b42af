//! The background task that queries the sensor and publishes its readings

use std::{sync::Arc, time::Duration};

use tokio::{
    select,
    time::{interval, MissedTickBehavior},
};

use crate::{core::shutdown::ShutdownHandle, station::Station};

pub mod link;

pub use link::{SensorLink, SerialLink};

/// marks a query, and may be echoed back in replies
pub const SENTINEL: char = 'Z';
pub const QUERY: &[u8] = b"Z\r\n";
pub const MAX_REPLY_LEN: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("no reply before timeout")]
    Timeout,
    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("reply was not valid text: {0}")]
    Decode(#[from] std::string::FromUtf8Error),
    #[error("exchange task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Turn a raw reply into a reading: surrounding whitespace and every sentinel are removed.
///
/// A reply made up of only sentinels and whitespace is an empty reading, not an error
pub fn decode_reply(raw: Vec<u8>) -> Result<String, PollError> {
    if raw.is_empty() {
        return Err(PollError::Timeout);
    }
    let text = String::from_utf8(raw)?;
    Ok(text.trim().replace(SENTINEL, "").trim().to_owned())
}

pub struct Poller<L: SensorLink> {
    link: Option<L>,
    station: Arc<Station>,
    every: Duration,
}

impl<L: SensorLink> Poller<L> {
    pub fn new(link: L, station: Arc<Station>, every: Duration) -> Self {
        Self {
            link: Some(link),
            station,
            every,
        }
    }

    /// Query the sensor once and publish the result
    pub async fn poll_once(&mut self) {
        let reading = match self.query().await {
            Ok(reading) => {
                trace!(%reading, "received reading");
                Some(reading)
            }
            Err(e) => {
                warn!("failed to read sensor: {e}");
                None
            }
        };
        self.station.publish(reading).await;
    }

    async fn query(&mut self) -> Result<String, PollError> {
        let Some(mut link) = self.link.take() else {
            // a previous exchange panicked and took the link with it
            return Err(PollError::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "sensor link lost",
            )));
        };
        let (link, raw) = tokio::task::spawn_blocking(move || {
            let raw = link.exchange(QUERY, MAX_REPLY_LEN);
            (link, raw)
        })
        .await?;
        self.link = Some(link);
        decode_reply(raw?)
    }

    /// Poll until shutdown. Individual poll failures are logged and never end the loop
    pub async fn run(mut self, mut shutdown: ShutdownHandle) {
        info!("polling sensor every {:?}", self.every);
        let mut ticker = interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            select! {
                _ = shutdown.wait_for_shutdown() => break,
                _ = ticker.tick() => self.poll_once().await,
            }
        }
        debug!("poller stopped");
    }
}
