// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2026 ironftpd contributors

//! One cooperatively-interruptible worker per control connection
//! (spec.md §4.2). Owns the control channel, at most one data channel,
//! the authenticated user's snapshot, and the phase state machine.

use std::{
    io::{BufRead, BufReader, Write},
    net::TcpStream,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    time::{Duration, Instant},
};

use tracing::{info, warn};

use crate::{
    acl::{ids::UserID, user::UserSnapshot},
    error::{Error, Result},
    server::dispatch,
};

/// Protocol phase (spec.md §4.2 state machine table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Accepting,
    GreetSent,
    AwaitingUser,
    AwaitingPass,
    LoggedIn,
    Finished,
}

const MAX_LINE_LEN: usize = 4096;

/// Shared, `Arc`-held session state visible to both the session's own
/// worker thread and the listener (for kick/shutdown/task execution).
pub struct SessionHandle {
    pub id: u64,
    phase: Mutex<Phase>,
    user: Mutex<Option<UserSnapshot>>,
    pending_username: Mutex<Option<String>>,
    interrupt: AtomicBool,
    last_activity: Mutex<Instant>,
    /// Raw control socket, kept so `Interrupt` can force a blocking read
    /// to unblock via `shutdown()` (spec.md §5 "Cancellation").
    control: Mutex<Option<TcpStream>>,
    login_started: Mutex<Option<Instant>>,
}

impl SessionHandle {
    fn new(id: u64, control: TcpStream) -> Self {
        Self {
            id,
            phase: Mutex::new(Phase::Accepting),
            user: Mutex::new(None),
            pending_username: Mutex::new(None),
            interrupt: AtomicBool::new(false),
            last_activity: Mutex::new(Instant::now()),
            control: Mutex::new(Some(control)),
            login_started: Mutex::new(None),
        }
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn set_phase(&self, phase: Phase) {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = phase;
    }

    pub fn user(&self) -> Option<UserSnapshot> {
        self.user.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn set_user(&self, user: Option<UserSnapshot>) {
        *self.user.lock().unwrap_or_else(|e| e.into_inner()) = user;
    }

    pub(crate) fn set_pending_username(&self, name: Option<String>) {
        *self.pending_username.lock().unwrap_or_else(|e| e.into_inner()) = name;
    }

    pub(crate) fn pending_username(&self) -> Option<String> {
        self.pending_username.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn mark_login_started(&self) {
        *self.login_started.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
    }

    pub fn uid(&self) -> Option<UserID> {
        self.user().map(|u| u.id)
    }

    pub fn touch(&self) {
        *self.last_activity.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().unwrap_or_else(|e| e.into_inner()).elapsed()
    }

    /// Raises the interrupt flag and force-closes the control socket so
    /// any blocking read/write unblocks (spec.md §5 "Cancellation").
    pub fn interrupt(&self) {
        self.interrupt.store(true, Ordering::SeqCst);
        if let Some(stream) = self.control.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.phase() == Phase::Finished
    }

    /// The connecting peer's address, for IP-mask evaluation at login.
    pub fn peer_addr(&self) -> Option<std::net::SocketAddr> {
        self.control.lock().unwrap_or_else(|e| e.into_inner()).as_ref().and_then(|s| s.peer_addr().ok())
    }

    /// The server's own bound address on this connection, for PASV/EPSV
    /// to report an address the peer can actually reach.
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.control.lock().unwrap_or_else(|e| e.into_inner()).as_ref().and_then(|s| s.local_addr().ok())
    }
}

/// Registry of live sessions, owned by the listener and shared with the
/// task-queue executor (spec.md §4.1, §4.5).
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<Vec<Arc<SessionHandle>>>,
    shutdown: AtomicBool,
    next_id: AtomicU32,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self { sessions: Mutex::new(Vec::new()), shutdown: AtomicBool::new(false), next_id: AtomicU32::new(1) }
    }

    pub fn register(&self, control: TcpStream) -> Arc<SessionHandle> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as u64;
        let handle = Arc::new(SessionHandle::new(id, control));
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).push(handle.clone());
        handle
    }

    /// Removes every session whose worker thread has terminated.
    pub fn reap_finished(&self) {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).retain(|s| !s.is_finished());
    }

    pub fn interrupt_all(&self) {
        for s in self.sessions.lock().unwrap_or_else(|e| e.into_inner()).iter() {
            s.interrupt();
        }
    }

    /// Interrupts every (or, with `one_only`, the first) logged-in
    /// session belonging to `uid`, returning the count kicked.
    pub fn interrupt_by_uid(&self, uid: UserID, one_only: bool) -> usize {
        let mut count = 0;
        for s in self.sessions.lock().unwrap_or_else(|e| e.into_inner()).iter() {
            if s.uid() == Some(uid) {
                s.interrupt();
                count += 1;
                if one_only {
                    break;
                }
            }
        }
        count
    }

    /// Interrupts at most one session for `uid`, reporting its idle
    /// duration (spec.md §4.5 `LoginKickUser`).
    pub fn interrupt_one_with_idle(&self, uid: UserID) -> (usize, u64) {
        for s in self.sessions.lock().unwrap_or_else(|e| e.into_inner()).iter() {
            if s.uid() == Some(uid) {
                let idle = s.idle_for().as_secs();
                s.interrupt();
                return (1, idle);
            }
        }
        (0, 0)
    }

    pub fn online_uids(&self) -> Vec<UserID> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).iter().filter_map(|s| s.uid()).collect()
    }

    pub fn online_counts(&self) -> (usize, usize) {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let logged_in = sessions.iter().filter(|s| s.uid().is_some()).count();
        (logged_in, sessions.len())
    }

    pub fn refresh_snapshot(&self, _uid: UserID) {
        // Snapshot refresh happens lazily: the next command a session
        // handles re-reads the cache. Nothing to do eagerly here.
    }

    pub fn mark_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shared services a session needs to dispatch commands (spec.md §4.2:
/// "invoked with `{client, control, data?, args, argStr}`").
pub struct SessionServices {
    pub users: Arc<crate::acl::UserCache>,
    pub groups: Arc<crate::acl::GroupCache>,
    pub config: Arc<Mutex<Arc<crate::cfg::Config>>>,
    pub config_path: String,
    pub tasks: Arc<crate::server::task::TaskQueue>,
    pub slots: Arc<crate::server::slots::SlotTracker>,
    pub owners: Arc<crate::transfer::owner::OwnerCache>,
}

/// Runs one control connection to completion: greet, authenticate,
/// dispatch commands until `QUIT`/interrupt/idle-timeout.
pub fn run(handle: Arc<SessionHandle>, services: Arc<SessionServices>) {
    let stream = {
        let guard = handle.control.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref().and_then(|s| s.try_clone().ok()) {
            Some(s) => s,
            None => {
                handle.set_phase(Phase::Finished);
                return;
            },
        }
    };

    let mut writer = match stream.try_clone() {
        Ok(w) => w,
        Err(_) => {
            handle.set_phase(Phase::Finished);
            return;
        },
    };
    let mut reader = BufReader::new(stream);

    if writer.write_all(b"220 ironftpd ready\r\n").is_err() {
        handle.set_phase(Phase::Finished);
        return;
    }
    handle.set_phase(Phase::GreetSent);

    let mut ctx = dispatch::DispatchCtx::new(handle.clone(), services.clone());

    loop {
        if handle.is_interrupted() {
            break;
        }
        let idle_limit = ctx.idle_limit();
        if handle.idle_for() > idle_limit {
            let _ = writer.write_all(b"421 Idle timeout, closing connection.\r\n");
            break;
        }

        let mut line = String::new();
        match read_line_limited(&mut reader, &mut line) {
            Ok(0) => break,
            Ok(_) => {},
            Err(_) => break,
        }
        handle.touch();

        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            continue;
        }

        let (verb, arg_str) = match line.split_once(' ') {
            Some((v, rest)) => (v.to_ascii_uppercase(), rest.to_string()),
            None => (line.to_ascii_uppercase(), String::new()),
        };

        match dispatch::dispatch(&mut ctx, &verb, &arg_str, &mut writer) {
            Ok(dispatch::Outcome::Continue) => {},
            Ok(dispatch::Outcome::Quit) => break,
            Err(Error::Network(msg)) => {
                warn!(session = handle.id, error = %msg, "control channel failed, terminating session");
                break;
            },
            Err(e) => {
                warn!(session = handle.id, error = %e, "unhandled session error");
                break;
            },
        }
    }

    info!(session = handle.id, "session finished");
    handle.set_phase(Phase::Finished);
}

fn read_line_limited<R: BufRead>(reader: &mut R, out: &mut String) -> Result<usize> {
    let mut buf = Vec::with_capacity(256);
    loop {
        let mut byte = [0u8; 1];
        let n = std::io::Read::read(reader, &mut byte).map_err(|e| Error::Network(e.to_string()))?;
        if n == 0 {
            return Ok(0);
        }
        buf.push(byte[0]);
        if buf.len() > MAX_LINE_LEN {
            return Err(Error::Protocol("command line too long".into()));
        }
        if byte[0] == b'\n' {
            break;
        }
    }
    *out = String::from_utf8_lossy(&buf).into_owned();
    Ok(out.len())
}
