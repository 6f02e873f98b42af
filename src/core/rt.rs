use std::{
    path::{Path, PathBuf},
    process,
};

use anyhow::Result;
use clap::Parser;
use nix::{
    sys::signal::{kill, Signal},
    unistd::{daemon, Pid},
};
use tokio::runtime;

use crate::{
    core::{
        self,
        args::{ArgsParser, Cmd, RunArgs},
        config::Config,
        shutdown::Shutdown,
    },
    misc::RecordsPath,
};

const PID_FILE: &str = "daemon.lock";

fn read_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        bail!("config file {path:?} not found");
    }
    let buf = std::fs::read_to_string(path)?;
    core::config::from_str(&buf)
}

fn run_dir(cfg: &Config) -> Result<RecordsPath> {
    let dir = RecordsPath::new(cfg.directory.run.clone());
    dir.ensure_exists_blocking()?;
    Ok(dir)
}

/// The `daemon.lock` file recording the PID of the running instance.
/// `None` when safeguards are disabled, in which case it is neither checked nor written
struct PidFile(Option<PathBuf>);

impl PidFile {
    fn claim(run_dir: &RecordsPath, no_safeguards: bool) -> Result<Self> {
        let path = run_dir.path(PID_FILE);
        if !path.try_exists()? {
            return Ok(Self((!no_safeguards).then_some(path)));
        }
        if no_safeguards {
            return Ok(Self(None));
        }
        eprintln!("sensord appears to be running already ({path:?} exists)");
        eprintln!("delete that file if the previous instance is gone, then retry");
        bail!("refusing to start a second instance");
    }

    fn write(&self) -> Result<()> {
        if let Some(path) = &self.0 {
            debug!(?path, "writing PID file");
            std::fs::write(path, process::id().to_string())?;
        }
        Ok(())
    }

    fn release(self) -> Result<()> {
        if let Some(path) = self.0 {
            debug!(?path, "removing PID file");
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

pub fn stage0_delegate() -> Result<()> {
    match ArgsParser::parse().cmd {
        Cmd::Run { args } => stage1_daemon(args),
        Cmd::Kill { config } => {
            let _guard = core::init_logging_no_file()?;
            stop_daemon(&config)
        }
    }
}

/// Ask a daemonized instance to shut down. The instance removes its own PID file on exit
fn stop_daemon(config: &Path) -> Result<()> {
    info!(?config, "loading config");
    let cfg = read_config(config)?;
    let pid_file = run_dir(&cfg)?.path(PID_FILE);
    if !pid_file.try_exists()? {
        warn!("no PID file at {pid_file:?}, nothing to stop");
        return Ok(());
    }
    let pid = std::fs::read_to_string(&pid_file)?
        .trim()
        .parse::<i32>()
        .map_err(|e| anyhow!("PID file {pid_file:?} is corrupt: {e}"))?;
    info!(pid, "sending SIGINT");
    kill(Pid::from_raw(pid), Some(Signal::SIGINT))?;
    Ok(())
}

pub fn stage1_daemon(args: RunArgs) -> Result<()> {
    if args.daemonize && args.no_safeguards {
        bail!("--daemonize cannot be combined with --no-safeguards");
    }
    println!("loading config from {:?}", args.config);
    let cfg = read_config(&args.config)?;

    let records_dir = RecordsPath::new(cfg.directory.data.clone());
    records_dir.ensure_exists_blocking()?;
    let run_dir = run_dir(&cfg)?;
    let log_dir = RecordsPath::new(run_dir.path("log"));
    log_dir.ensure_exists_blocking()?;

    let pid_file = PidFile::claim(&run_dir, args.no_safeguards)?;

    if args.daemonize {
        println!("detaching into the background");
        daemon(true, true)?;
    }

    let guard = core::init_logging_with_file(log_dir.dir().to_path_buf())?;
    if args.no_safeguards {
        warn!("safeguards disabled: no PID file is checked or written");
    }
    pid_file.write()?;

    let result = std::panic::catch_unwind(move || stage2_async(cfg, records_dir));
    pid_file.release()?;

    match result {
        Ok(inner) => {
            drop(guard);
            inner
        }
        Err(err) => {
            error!("runtime thread panicked: {err:?}");
            bail!("runtime thread panicked");
        }
    }
}

pub fn stage2_async(cfg: Config, records_dir: RecordsPath) -> Result<()> {
    debug!("starting tokio runtime");
    let runtime = runtime::Builder::new_multi_thread().enable_all().build()?;
    let mut shutdown = Shutdown::new();
    runtime.block_on(async {
        let result = crate::async_main(cfg, &mut shutdown, records_dir).await;
        if let Err(e) = &result {
            error!("sensord stopped with an error: {e:?}");
        }
        shutdown.trigger_shutdown();
        info!("waiting for tasks to finish");
        shutdown.wait_for_completion().await;
        result
    })
}
