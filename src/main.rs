// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2026 ironftpd contributors

use std::{
    process::ExitCode,
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result};
use ironftpd::{
    acl::{GroupCache, UserCache},
    cfg::{Config, cli, logger},
    db::{InMemoryStore, StoreProxy},
    server::{Listener, SessionRegistry, SessionServices, TaskQueue},
};
use tracing::{error, info};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ironftpd: {e:#}");
            ExitCode::from(1)
        },
    }
}

fn run() -> Result<()> {
    let args = cli::Args::parse(std::env::args().skip(1)).context("failed to parse arguments")?;
    let config_path = cli::resolve_config_path(&args.config).context("failed to resolve config path")?;
    let config_path = config_path.to_string_lossy().into_owned();

    let config = Config::load_from_file(&config_path).context("failed to load configuration")?;

    let _logger_guard = match logger::init_logger("ironftpd_logger.yaml") {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("ironftpd: logging disabled, falling back to stderr: {e:#}");
            None
        },
    };

    if !args.foreground {
        info!("starting in background mode (daemonization left to the process supervisor)");
    }

    let store = Arc::new(StoreProxy::new(Arc::new(InMemoryStore::default())));
    let users = Arc::new(UserCache::new(store.clone()));
    let groups = Arc::new(GroupCache::new(store));
    users.initialize().context("failed to load users from persistent store")?;
    groups.initialize().context("failed to load groups from persistent store")?;

    let services = Arc::new(SessionServices {
        users,
        groups,
        config: Arc::new(Mutex::new(Arc::new(config.clone()))),
        config_path: config_path.clone(),
        tasks: Arc::new(TaskQueue::new()),
        slots: Arc::new(Default::default()),
        owners: Arc::new(Default::default()),
    });

    let registry = Arc::new(SessionRegistry::new());
    let listener = Arc::new(
        Listener::initialise(&config, registry, services)
            .with_context(|| format!("failed to bind listener on {:?}:{}", config.listen.ips, config.listen.port))?,
    );

    listener.start();
    info!(
        ips = ?config.listen.ips,
        port = config.listen.port,
        "ironftpd listening"
    );

    install_signal_shutdown(listener.clone());

    listener.join();
    info!("shutdown complete");
    Ok(())
}

/// Wires `SIGINT`/`SIGTERM` to a graceful `SetShutdown`, mirroring
/// spec.md §4.1's "Shutdown ... via the self-pipe" from an external
/// signal rather than an admin `SITE SHUTDOWN`/`Task::Exit`. Blocks both
/// signals process-wide and waits on them synchronously, so no
/// async-signal-unsafe work runs in a signal handler.
fn install_signal_shutdown(listener: Arc<Listener>) {
    use nix::sys::signal::{SigSet, Signal};

    let mut mask = SigSet::empty();
    mask.add(Signal::SIGINT);
    mask.add(Signal::SIGTERM);
    if let Err(e) = mask.thread_block() {
        error!(error = %e, "failed to block shutdown signals, shutdown only via SITE SHUTDOWN");
        return;
    }

    std::thread::Builder::new()
        .name("signal-shutdown".into())
        .spawn(move || match mask.wait() {
            Ok(signal) => {
                info!(%signal, "received shutdown signal");
                listener.set_shutdown();
            },
            Err(e) => error!(error = %e, "sigwait failed, shutdown only via SITE SHUTDOWN"),
        })
        .expect("failed to spawn signal handler thread");
}
