// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2026 ironftpd contributors

//! Task queue (spec.md §4.5): out-of-band jobs pushed by any session and
//! executed on the listener thread only, against the live session list.

use std::sync::{
    Arc, Mutex,
    mpsc::{Receiver, Sender, channel},
};

use crate::{
    acl::ids::UserID,
    cfg::Config,
    server::session::SessionRegistry,
};

/// Outcome of a `ReloadConfig` task: whether the new configuration can
/// be hot-swapped or requires the process to stop and restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    Applied,
    StopStart,
}

/// One out-of-band job (spec.md §3 `Task`). Each variant carries a
/// one-shot sender the pushing session blocks on for the result.
pub enum Task {
    KickUser { uid: UserID, one_only: bool, reply: Sender<usize> },
    LoginKickUser { uid: UserID, reply: Sender<(usize, u64)> },
    GetOnlineUsers { reply: Sender<Vec<UserID>> },
    UserUpdate { uid: UserID },
    ReloadConfig { path: String, reply: Sender<Result<(Arc<Config>, ReloadOutcome), String>> },
    OnlineUserCount { reply: Sender<(usize, usize)> },
    Exit,
}

impl Task {
    /// Executes the task against the live session registry. Runs only
    /// on the listener thread (spec.md §5: "Tasks run on the listener
    /// thread only").
    pub fn execute(self, registry: &SessionRegistry, config: &Mutex<Arc<Config>>) {
        match self {
            Task::KickUser { uid, one_only, reply } => {
                let count = registry.interrupt_by_uid(uid, one_only);
                let _ = reply.send(count);
            },
            Task::LoginKickUser { uid, reply } => {
                let (kicked, idle) = registry.interrupt_one_with_idle(uid);
                let _ = reply.send((kicked, idle));
            },
            Task::GetOnlineUsers { reply } => {
                let _ = reply.send(registry.online_uids());
            },
            Task::UserUpdate { uid } => {
                registry.refresh_snapshot(uid);
            },
            Task::ReloadConfig { path, reply } => {
                let result = crate::cfg::Config::load_from_file(&path)
                    .map(|cfg| {
                        let outcome = ReloadOutcome::Applied;
                        let arc = Arc::new(cfg);
                        *config.lock().unwrap_or_else(|e| e.into_inner()) = arc.clone();
                        (arc, outcome)
                    })
                    .map_err(|e| e.to_string());
                let _ = reply.send(result);
            },
            Task::OnlineUserCount { reply } => {
                let _ = reply.send(registry.online_counts());
            },
            Task::Exit => {
                registry.mark_shutdown();
            },
        }
    }
}

/// FIFO queue of pending [`Task`]s, woken via a self-pipe (spec.md §4.1
/// "PushTask").
pub struct TaskQueue {
    queue: Mutex<Vec<Task>>,
    wake_write: Mutex<Option<nix::unistd::OwnedFd>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self { queue: Mutex::new(Vec::new()), wake_write: Mutex::new(None) }
    }

    /// Binds the write end of the listener's self-pipe so pushes can
    /// wake a blocked `poll`.
    pub fn attach_wake(&self, write_fd: nix::unistd::OwnedFd) {
        *self.wake_write.lock().unwrap_or_else(|e| e.into_inner()) = Some(write_fd);
    }

    pub fn push(&self, task: Task) {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).push(task);
        if let Some(fd) = self.wake_write.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            let _ = nix::unistd::write(fd, &[0u8]);
        }
    }

    /// Drains and returns every pending task, in FIFO order.
    pub fn drain(&self) -> Vec<Task> {
        std::mem::take(&mut self.queue.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience wrapper pairing a pushed task with its one-shot reply.
pub fn kick_user(queue: &TaskQueue, uid: UserID, one_only: bool) -> usize {
    let (tx, rx) = channel();
    queue.push(Task::KickUser { uid, one_only, reply: tx });
    recv_or_default(rx, 0)
}

pub fn login_kick_user(queue: &TaskQueue, uid: UserID) -> (usize, u64) {
    let (tx, rx) = channel();
    queue.push(Task::LoginKickUser { uid, reply: tx });
    recv_or_default(rx, (0, 0))
}

pub fn online_user_count(queue: &TaskQueue) -> (usize, usize) {
    let (tx, rx) = channel();
    queue.push(Task::OnlineUserCount { reply: tx });
    recv_or_default(rx, (0, 0))
}

pub fn get_online_users(queue: &TaskQueue) -> Vec<UserID> {
    let (tx, rx) = channel();
    queue.push(Task::GetOnlineUsers { reply: tx });
    recv_or_default(rx, Vec::new())
}

fn recv_or_default<T>(rx: Receiver<T>, default: T) -> T {
    rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap_or(default)
}
