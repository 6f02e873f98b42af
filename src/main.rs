#[macro_use]
extern crate tracing;
#[macro_use]
extern crate anyhow;

use std::sync::Arc;

use anyhow::{Context, Result};

mod archive;
mod core;
mod http;
mod misc;
mod poller;
mod station;

use crate::core::{config::Config, shutdown::Shutdown};
use archive::Archive;
use misc::RecordsPath;
use poller::{Poller, SerialLink};
use station::Station;

fn main() -> Result<()> {
    crate::core::rt::stage0_delegate()
}

async fn async_main(cfg: Config, shutdown: &mut Shutdown, records_dir: RecordsPath) -> Result<()> {
    crate::core::shutdown::trap_signals(shutdown.handle())?;

    // nothing to do without a sensor, so this one is fatal
    let link = SerialLink::open(
        &cfg.serial.device,
        cfg.serial.baud_rate,
        cfg.serial.timeout(),
    )
    .with_context(|| format!("failed to open serial port {}", cfg.serial.device))?;

    let station = Arc::new(Station::new(Archive::new(records_dir)));
    let poller = Poller::new(link, station.clone(), cfg.poll.interval());
    let poller_task = tokio::spawn(poller.run(shutdown.handle()));

    info!("running -- press ctrl+c to exit");
    let result = http::serve(&cfg.http, station.clone(), shutdown.handle()).await;

    // the server only returns on shutdown or failure, either way everything else stops too
    shutdown.trigger_shutdown();
    if let Err(e) = poller_task.await {
        error!("poller task failed: {e}");
    }
    station.close().await;
    result
}
