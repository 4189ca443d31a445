// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2026 ironftpd contributors

//! Listener (spec.md §4.1): owns the bound TCP endpoints, the live
//! session list, and the self-pipe that lets [`crate::server::task::TaskQueue`]
//! wake the accept loop from another thread. The only legitimate ways
//! to affect a running listener from outside are [`Listener::push_task`]
//! and [`Listener::set_shutdown`].

use std::{
    net::TcpListener,
    os::fd::{AsFd, AsRawFd, OwnedFd},
    sync::{Arc, Mutex},
    thread::JoinHandle,
};

use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use tracing::{error, info, warn};

use crate::{
    cfg::Config,
    error::{Error, Result},
    server::{
        session::{self, SessionHandle, SessionRegistry, SessionServices},
        task::Task,
    },
};

/// Poll timeout for the accept/wake readiness wait (spec.md §4.1 "100
/// ms timeout").
const POLL_TIMEOUT_MS: u16 = 100;

/// How many consecutive reap attempts a `Finished` session tolerates
/// before its stuck thread is logged (spec.md §4.1 "logged but not
/// force-released").
const STUCK_JOIN_WARN_TICKS: u32 = 50;

struct SessionThread {
    handle: Arc<SessionHandle>,
    thread: Option<JoinHandle<()>>,
    stuck_ticks: u32,
}

/// The listener + session dispatcher. One instance per process; `Start`
/// spawns the single accept-loop thread described in spec.md §4.1.
pub struct Listener {
    endpoints: Vec<TcpListener>,
    wake_read: OwnedFd,
    registry: Arc<SessionRegistry>,
    services: Arc<SessionServices>,
    threads: Mutex<Vec<SessionThread>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Listener {
    /// Binds one listener per configured IP. If any bind fails, every
    /// socket opened so far is dropped (spec.md §4.1 `Initialise`:
    /// "fails if any bind fails, releasing earlier sockets").
    pub fn initialise(
        config: &Config,
        registry: Arc<SessionRegistry>,
        services: Arc<SessionServices>,
    ) -> Result<Self> {
        let mut endpoints = Vec::with_capacity(config.listen.ips.len());
        for ip in &config.listen.ips {
            let listener = TcpListener::bind((*ip, config.listen.port)).map_err(|e| {
                Error::system(
                    e.raw_os_error().unwrap_or(0),
                    format!("bind {ip}:{} failed: {e}", config.listen.port),
                )
            })?;
            endpoints.push(listener);
        }

        let (wake_read, wake_write) =
            nix::unistd::pipe().map_err(|e| Error::Runtime(format!("failed to create self-pipe: {e}")))?;
        services.tasks.attach_wake(wake_write);

        Ok(Self {
            endpoints,
            wake_read,
            registry,
            services,
            threads: Mutex::new(Vec::new()),
            worker: Mutex::new(None),
        })
    }

    /// Spawns the listener thread. `Join` waits for it to return, which
    /// only happens after a graceful shutdown.
    pub fn start(self: &Arc<Self>) {
        let this = self.clone();
        let handle = std::thread::Builder::new()
            .name("listener".into())
            .spawn(move || this.run())
            .expect("failed to spawn listener thread");
        *self.worker.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    /// The actual bound address of each endpoint, useful for logging and
    /// for tests that bind an ephemeral port (`port: 0`).
    pub fn local_addrs(&self) -> Vec<std::net::SocketAddr> {
        self.endpoints.iter().filter_map(|ep| ep.local_addr().ok()).collect()
    }

    /// Blocks until the listener thread has returned.
    pub fn join(&self) {
        let thread = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(t) = thread {
            let _ = t.join();
        }
    }

    /// Enqueues a task and wakes the accept loop (spec.md §4.1
    /// `PushTask`).
    pub fn push_task(&self, task: Task) {
        self.services.tasks.push(task);
    }

    /// Raises the shutdown flag via a plain `Exit` task so the same
    /// self-pipe wakeup carries both effects (spec.md §4.1
    /// `SetShutdown`, §4.5 `Exit`).
    pub fn set_shutdown(&self) {
        self.push_task(Task::Exit);
    }

    fn run(&self) {
        loop {
            if self.registry.is_shutdown() {
                break;
            }

            let wake_fd = self.wake_read.as_fd();
            let mut fds = Vec::with_capacity(1 + self.endpoints.len());
            fds.push(PollFd::new(wake_fd, PollFlags::POLLIN));
            for ep in &self.endpoints {
                fds.push(PollFd::new(ep.as_fd(), PollFlags::POLLIN));
            }

            match poll(&mut fds, PollTimeout::from(POLL_TIMEOUT_MS)) {
                Ok(_) => {},
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => {
                    error!(error = %e, "poll failed on listener readiness set");
                    continue;
                },
            }

            if fds[0].revents().is_some_and(|r| r.contains(PollFlags::POLLIN)) {
                self.drain_wake_byte();
                self.run_tasks();
            }

            for (i, ep) in self.endpoints.iter().enumerate() {
                if fds[i + 1].revents().is_some_and(|r| r.contains(PollFlags::POLLIN)) {
                    self.accept_one(ep);
                }
            }

            self.reap_finished();
        }

        self.shutdown_sessions();
    }

    /// Drains exactly one byte, matching spec.md §4.1's dequeue
    /// discipline: one wakeup byte corresponds to one drain-and-execute
    /// pass, not to the number of tasks pending.
    fn drain_wake_byte(&self) {
        let mut buf = [0u8; 1];
        let _ = nix::unistd::read(self.wake_read.as_raw_fd(), &mut buf);
    }

    fn run_tasks(&self) {
        for task in self.services.tasks.drain() {
            task.execute(&self.registry, &self.services.config);
        }
    }

    fn accept_one(&self, endpoint: &TcpListener) {
        match endpoint.accept() {
            Ok((stream, peer)) => {
                let handle = self.registry.register(stream);
                info!(session = handle.id, peer = %peer, "accepted control connection");
                let services = self.services.clone();
                let worker_handle = handle.clone();
                let thread = std::thread::Builder::new()
                    .name(format!("session-{}", handle.id))
                    .spawn(move || session::run(worker_handle, services))
                    .ok();
                if thread.is_none() {
                    warn!(session = handle.id, "failed to spawn session thread");
                }
                self.threads
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(SessionThread { handle, thread, stuck_ticks: 0 });
            },
            Err(e) => warn!(error = %e, "accept failed"),
        }
    }

    /// Harvests `Finished` sessions whose thread can be joined without
    /// blocking; sessions stuck for many iterations are logged, not
    /// force-released (spec.md §4.1).
    fn reap_finished(&self) {
        let mut threads = self.threads.lock().unwrap_or_else(|e| e.into_inner());
        threads.retain_mut(|slot| {
            if !slot.handle.is_finished() {
                return true;
            }
            match slot.thread.take() {
                None => false,
                Some(t) if t.is_finished() => {
                    let _ = t.join();
                    false
                },
                Some(t) => {
                    slot.stuck_ticks += 1;
                    if slot.stuck_ticks.is_multiple_of(STUCK_JOIN_WARN_TICKS) {
                        warn!(
                            session = slot.handle.id,
                            ticks = slot.stuck_ticks,
                            "session finished but its thread has not joined yet"
                        );
                    }
                    slot.thread = Some(t);
                    true
                },
            }
        });
        self.registry.reap_finished();
    }

    /// Interrupts every live session and joins each thread. Unbounded:
    /// termination is contingent on sessions reaching a cooperative
    /// cancellation point (spec.md §4.1 "Shutdown").
    fn shutdown_sessions(&self) {
        self.registry.interrupt_all();
        let mut threads = self.threads.lock().unwrap_or_else(|e| e.into_inner());
        for slot in threads.iter_mut() {
            if let Some(t) = slot.thread.take() {
                let _ = t.join();
            }
        }
        threads.clear();
        info!("listener shut down, all sessions joined");
    }
}

#[cfg(test)]
mod tests {
    use std::{net::TcpStream, sync::Mutex as StdMutex, time::Duration};

    use super::*;
    use crate::{
        acl::{GroupCache, UserCache},
        db::{InMemoryStore, StoreProxy},
        server::{slots::SlotTracker, task},
    };

    fn sample_config() -> Config {
        use crate::cfg::config::{HooksConfig, ListenConfig, RuntimeConfig, TransferConfig, UserDefaults};

        Config {
            listen: ListenConfig {
                ips: vec!["127.0.0.1".parse().unwrap()],
                port: 0,
                tls_cert: None,
                tls_key: None,
            },
            users: UserDefaults {
                weekly_allotment_kb: 0,
                idle_time_secs: 900,
                max_down_speed: 0,
                max_up_speed: 0,
                max_sim_down: -1,
                max_sim_up: -1,
                num_logins: -1,
                default_ratio: 3,
            },
            sections: vec![],
            acl: vec![],
            transfer: TransferConfig {
                calc_crc: vec![],
                ascii_globs: vec![],
                min_speed: 0.0,
                min_speed_grace_secs: 10,
                crc_background: false,
                max_sim_up_global: -1,
                max_sim_down_global: -1,
            },
            runtime: RuntimeConfig { data_dir: "/tmp/ironftpd-test".into(), program_fullname: "ironftpd".into(), max_sessions: 0 },
            hooks: HooksConfig::default(),
        }
    }

    fn make_services(config: Config) -> Arc<SessionServices> {
        let store = Arc::new(StoreProxy::new(Arc::new(InMemoryStore::default())));
        Arc::new(SessionServices {
            users: Arc::new(UserCache::new(store.clone())),
            groups: Arc::new(GroupCache::new(store)),
            config: Arc::new(StdMutex::new(Arc::new(config))),
            config_path: "unused.yaml".into(),
            tasks: Arc::new(task::TaskQueue::new()),
            slots: Arc::new(SlotTracker::default()),
            owners: Arc::new(Default::default()),
        })
    }

    #[test]
    fn initialise_binds_and_start_accepts_connections() {
        let mut config = sample_config();
        config.listen.ips = vec!["127.0.0.1".parse().unwrap()];
        config.listen.port = 0;
        let registry = Arc::new(SessionRegistry::new());
        let services = make_services(config.clone());

        let listener = Arc::new(Listener::initialise(&config, registry.clone(), services).unwrap());
        let bound_port = listener.endpoints[0].local_addr().unwrap().port();
        listener.start();

        std::thread::sleep(Duration::from_millis(50));
        let client = TcpStream::connect(("127.0.0.1", bound_port)).unwrap();
        std::thread::sleep(Duration::from_millis(150));
        assert!(registry.len() >= 1);
        drop(client);

        listener.set_shutdown();
        listener.join();
    }

    #[test]
    fn initialise_releases_earlier_sockets_on_bind_failure() {
        let blocker = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = blocker.local_addr().unwrap().port();

        let mut config = sample_config();
        config.listen.ips = vec!["127.0.0.1".parse().unwrap(), "127.0.0.1".parse().unwrap()];
        config.listen.port = port;
        let registry = Arc::new(SessionRegistry::new());
        let services = make_services(config.clone());

        let result = Listener::initialise(&config, registry, services);
        assert!(result.is_err());
    }
}
