// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2026 ironftpd contributors

//! `RETR` pipeline (spec.md §4.3 "Download (RETR) is symmetric"): slot
//! via `MaxSimDown`, no dupe step, no chmod, credit is debited instead
//! of credited, and ratio-0 (leech) users bypass the debit check
//! entirely.

use std::{
    fs::File,
    io::{Read, Seek, SeekFrom, Write},
    time::Duration,
};

use crate::{
    acl::{cache::UserCache, user::UserSnapshot},
    cfg::config::HooksConfig,
    error::{Error, Flow, Result},
    server::{
        reply,
        slots::{Direction, SlotDenied, SlotTracker},
    },
    transfer::{DataType, SectionCtx, TransferResult, TransferStats, data_channel::DataChannelPlan, hooks, speed::SpeedGovernor},
};

const READ_BUF: usize = 16 * 1024;

pub struct DownloadRequest<'a> {
    pub user: &'a UserSnapshot,
    pub users: &'a UserCache,
    pub slots: &'a SlotTracker,
    pub section: &'a SectionCtx,
    pub vpath: String,
    pub physical: std::path::PathBuf,
    pub data_plan: DataChannelPlan,
    pub data_type: DataType,
    pub rest_offset: u64,
    pub protected_required: bool,
    pub data_channel_protected: bool,
    pub speed_cap: f64,
    pub speed_floor: f64,
    pub speed_grace: Duration,
    pub hooks: &'a HooksConfig,
    pub global_max_down: i32,
}

/// Runs the RETR pipeline. See spec.md §4.3 for the exact symmetry with
/// STOR; deviations are called out inline.
pub fn run(req: DownloadRequest<'_>, control: &mut impl Write, interrupted: &dyn Fn() -> bool) -> Result<()> {
    let key = req.section.credit_key();
    let ratio = req.user.ratio.get(key).copied().unwrap_or_else(|| req.user.ratio.get("").copied().unwrap_or(3));

    // Non-leech users with insufficient credits are refused before the
    // data channel is ever opened (spec.md: "before opening the data
    // channel").
    if ratio > 0 {
        let available = req.user.credits.get(key).copied().unwrap_or(0);
        let size_kb = std::fs::metadata(&req.physical).map(|m| m.len() / 1024).unwrap_or(0) as i64;
        let needed_kb = size_kb / ratio as i64;
        if available < needed_kb {
            reply::send(control, 550, "Not enough credits.")?;
            return Ok(());
        }
    }

    let _slot_guard = match req.slots.reserve(req.user.id, Direction::Download, req.user.max_sim_down, req.global_max_down) {
        Ok(g) => g,
        Err(SlotDenied::PerUser(n)) => {
            reply::send(control, 450, &format!("reached your maximum of {n}"))?;
            return Ok(());
        },
        Err(SlotDenied::Global) => {
            reply::send(control, 450, "server has reached its maximum")?;
            return Ok(());
        },
    };

    let mut source = match File::open(&req.physical) {
        Ok(f) => f,
        Err(e) => {
            reply::send(control, 550, &format!("Cannot open file: {e}"))?;
            return Ok(());
        },
    };
    if req.rest_offset > 0 && source.seek(SeekFrom::Start(req.rest_offset)).is_err() {
        reply::send(control, 550, "Cannot seek to requested offset.")?;
        return Ok(());
    }

    reply::send(control, 150, "Opening data connection.")?;
    let mut data = match req.data_plan.open() {
        Ok(d) => d,
        Err(_) => {
            reply::send(control, 425, "Can't open data connection.")?;
            return Ok(());
        },
    };

    if req.protected_required && !req.data_channel_protected {
        reply::send(control, 536, "Requested PROT level not supported.")?;
        return Ok(());
    }

    let mut governor = SpeedGovernor::new(req.speed_cap, req.speed_floor, req.speed_grace);
    let mut buf = vec![0u8; READ_BUF];
    let mut ascii_out = Vec::with_capacity(READ_BUF);
    let mut io_failed = false;
    // Client/kick interrupt and a speed-governor abort close differently:
    // an interrupt still debits for bytes actually sent and closes with
    // 426, a policy abort skips the debit and closes with 226.
    let mut result = TransferResult::Completed;

    loop {
        if interrupted() {
            result = TransferResult::AbortedByClient;
            break;
        }
        let n = match source.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(_) => {
                io_failed = true;
                break;
            },
        };

        let chunk: &[u8] = if req.data_type == DataType::Ascii {
            crate::transfer::ascii::encode_lf_to_crlf(&buf[..n], &mut ascii_out);
            &ascii_out
        } else {
            &buf[..n]
        };

        if data.write_all(chunk).is_err() {
            io_failed = true;
            break;
        }

        match governor.record(chunk.len()) {
            Ok(()) => {},
            Err(Flow::MinimumSpeed { .. }) => {
                result = TransferResult::AbortedByPolicy;
                break;
            },
            Err(_) => unreachable!("SpeedGovernor only raises MinimumSpeed"),
        }
    }

    let _ = data.shutdown(std::net::Shutdown::Both);

    if io_failed {
        reply::send(control, 426, "Connection closed; transfer aborted.")?;
        return Ok(());
    }

    let stats = TransferStats { bytes: governor.total_bytes(), duration_secs: governor.duration().as_secs_f64(), crc_hex: "000000".to_string(), result };

    // Policy abort (minimum-speed floor): skip the debit and the
    // post-hook, same as STOR's symmetric case (spec.md §4.3 step 11).
    if result == TransferResult::AbortedByPolicy {
        reply::send(control, 226, &format!("Transfer aborted @ {:.1} KB/s", stats.speed_bytes_per_sec() / 1024.0))?;
        return Ok(());
    }

    // Client/kick interrupt: still debit for the bytes actually sent
    // (spec.md §8 scenario 3), then close with 426 rather than running
    // the completion post-hook on a transfer the client never finished.
    if result == TransferResult::AbortedByClient {
        if ratio > 0 {
            let kb = (stats.bytes as f64 / 1024.0 / ratio as f64).ceil() as i64;
            let _ = req.users.decr_credits(&req.user.name, key, kb, false);
        }
        reply::send(control, 426, "Connection closed; transfer aborted.")?;
        return Ok(());
    }

    let post_ok = hooks::run_post_download(req.hooks, &req.vpath, stats.speed_bytes_per_sec(), &req.section.name) == 0;
    if post_ok && ratio > 0 {
        let kb = (stats.bytes as f64 / 1024.0 / ratio as f64).ceil() as i64;
        let _ = req.users.decr_credits(&req.user.name, key, kb, false);
    }

    reply::send(control, 226, &format!("Transfer finished @ {:.1} KB/s", stats.speed_bytes_per_sec() / 1024.0))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::tempdir;

    use super::*;
    use crate::db::{InMemoryStore, StoreProxy};

    fn user_cache() -> UserCache {
        UserCache::new(Arc::new(StoreProxy::new(Arc::new(InMemoryStore::default()))))
    }

    fn drive(req: DownloadRequest<'_>) -> String {
        let mut out = Vec::new();
        run(req, &mut out, &|| false).unwrap();
        String::from_utf8_lossy(&out).into_owned()
    }

    #[test]
    fn leech_user_bypasses_credit_check_and_debit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.bin");
        std::fs::write(&path, vec![0u8; 10 * 1024]).unwrap();

        let cache = user_cache();
        let mut snap = cache.create("leech", "pw", "", -1).unwrap();
        snap.ratio.insert(String::new(), 0);

        let slots = SlotTracker::new();
        let hooks = HooksConfig::default();
        let (plan, addr) = DataChannelPlan::passive("127.0.0.1".parse().unwrap()).unwrap();
        let reader_thread = std::thread::spawn(move || {
            let mut client = std::net::TcpStream::connect(addr).unwrap();
            let mut buf = Vec::new();
            client.read_to_end(&mut buf).unwrap();
            buf
        });

        let req = DownloadRequest {
            user: &snap,
            users: &cache,
            slots: &slots,
            section: &SectionCtx::default_section(),
            vpath: "/f.bin".into(),
            physical: path,
            data_plan: plan,
            data_type: DataType::Binary,
            rest_offset: 0,
            protected_required: false,
            data_channel_protected: false,
            speed_cap: 0.0,
            speed_floor: 0.0,
            speed_grace: Duration::from_secs(10),
            hooks: &hooks,
            global_max_down: -1,
        };
        let reply = drive(req);
        let received = reader_thread.join().unwrap();
        assert_eq!(received.len(), 10 * 1024);
        assert!(reply.contains("226"));

        let after = cache.user_by_name("leech").unwrap();
        assert_eq!(after.credits.get("").copied().unwrap_or(0), 0);
    }

    #[test]
    fn insufficient_credits_refused_before_data_channel() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.bin");
        std::fs::write(&path, vec![0u8; 100 * 1024]).unwrap();

        let cache = user_cache();
        let mut snap = cache.create("poor", "pw", "", -1).unwrap();
        snap.ratio.insert(String::new(), 1);

        let slots = SlotTracker::new();
        let hooks = HooksConfig::default();
        let (plan, _addr) = DataChannelPlan::passive("127.0.0.1".parse().unwrap()).unwrap();

        let req = DownloadRequest {
            user: &snap,
            users: &cache,
            slots: &slots,
            section: &SectionCtx::default_section(),
            vpath: "/big.bin".into(),
            physical: path,
            data_plan: plan,
            data_type: DataType::Binary,
            rest_offset: 0,
            protected_required: false,
            data_channel_protected: false,
            speed_cap: 0.0,
            speed_floor: 0.0,
            speed_grace: Duration::from_secs(10),
            hooks: &hooks,
            global_max_down: -1,
        };
        let reply = drive(req);
        assert!(reply.starts_with("550"));
    }

    #[test]
    fn kicked_mid_transfer_closes_426_and_debits_bytes_sent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mid.bin");
        std::fs::write(&path, vec![0u8; 2 * READ_BUF]).unwrap();

        let cache = user_cache();
        cache.create("alice", "pw", "", -1).unwrap();
        cache.incr_credits("alice", "", 1024).unwrap();
        let mut snap = cache.user_by_name("alice").unwrap();
        snap.ratio.insert(String::new(), 1);

        let slots = SlotTracker::new();
        let hooks = HooksConfig::default();
        let (plan, addr) = DataChannelPlan::passive("127.0.0.1".parse().unwrap()).unwrap();
        let reader_thread = std::thread::spawn(move || {
            let mut client = std::net::TcpStream::connect(addr).unwrap();
            let mut buf = Vec::new();
            let _ = client.read_to_end(&mut buf);
            buf
        });

        let req = DownloadRequest {
            user: &snap,
            users: &cache,
            slots: &slots,
            section: &SectionCtx::default_section(),
            vpath: "/mid.bin".into(),
            physical: path,
            data_plan: plan,
            data_type: DataType::Binary,
            rest_offset: 0,
            protected_required: false,
            data_channel_protected: false,
            speed_cap: 0.0,
            speed_floor: 0.0,
            speed_grace: Duration::from_secs(10),
            hooks: &hooks,
            global_max_down: -1,
        };

        // Mimic `site kick`: interrupted() only flips true once the
        // first chunk has already gone out, so the debit must reflect
        // bytes actually sent, not the whole file (spec.md §8 scenario 3).
        let calls = std::sync::atomic::AtomicUsize::new(0);
        let interrupted = || calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) >= 1;

        let mut out = Vec::new();
        run(req, &mut out, &interrupted).unwrap();
        reader_thread.join().unwrap();

        let reply = String::from_utf8_lossy(&out);
        assert!(reply.contains("426"));
        assert!(!reply.contains("226"));

        let after = cache.user_by_name("alice").unwrap();
        let expected_debit = (READ_BUF as f64 / 1024.0).ceil() as i64;
        assert_eq!(*after.credits.get("").unwrap(), 1024 - expected_debit);
    }
}
