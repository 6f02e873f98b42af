//! Shutdown coordination between the main task and the long running tasks it spawns
//!
//! Every task holds a [`ShutdownHandle`]. [`Shutdown::wait_for_completion`] returns once
//! all handles have been dropped.

use tokio::{
    select,
    signal::{
        ctrl_c,
        unix::{signal, SignalKind},
    },
    sync::{broadcast, mpsc},
};

use crate::misc::Take;

#[derive(Debug)]
pub struct ShutdownHandle {
    #[allow(unused)]
    inner: mpsc::Sender<()>,
    listener: broadcast::Receiver<()>,
    trigger: broadcast::Sender<()>,
}

impl ShutdownHandle {
    pub async fn wait_for_shutdown(&mut self) {
        let _ = self.listener.recv().await;
    }

    pub fn trigger_shutdown(&mut self) {
        let _ = self.trigger.send(());
    }
}

pub struct Shutdown {
    tx: Take<mpsc::Sender<()>>,
    rx: mpsc::Receiver<()>,
    trigger: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        let (trigger, _) = broadcast::channel(1);
        Self {
            tx: Take::new(tx),
            rx,
            trigger,
        }
    }

    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            inner: self.tx.clone(),
            listener: self.trigger.subscribe(),
            trigger: self.trigger.clone(),
        }
    }

    /// waits for every handle to be dropped.
    ///
    /// no new handles may be created after this is called
    pub async fn wait_for_completion(&mut self) {
        if !self.tx.is_taken() {
            drop(self.tx.take());
        }
        self.rx.recv().await;
    }

    pub fn trigger_shutdown(&self) {
        let _ = self.trigger.send(());
    }
}

/// Trigger shutdown on SIGINT (ctrl+c, `sensord kill`) or SIGTERM (service managers)
pub fn trap_signals(mut handle: ShutdownHandle) -> std::io::Result<()> {
    let mut term = signal(SignalKind::terminate())?;
    tokio::spawn(async move {
        select! {
            res = ctrl_c() => {
                if res.is_err() {
                    error!("Failed to listen for ctrl_c signal - triggering shutdown");
                }
                info!("SIGINT received, shutting down");
                handle.trigger_shutdown();
            }
            _ = term.recv() => {
                info!("SIGTERM received, shutting down");
                handle.trigger_shutdown();
            }
            _ = handle.wait_for_shutdown() => {}
        }
    });
    Ok(())
}
