// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2026 ironftpd contributors

//! `STOR`/`APPE` pipeline (spec.md §4.3 "Upload (STOR)"): the 13-step
//! ordering and error policy, implemented as one straight-line function
//! with `?`-propagated scope guards rather than the original's
//! exception-driven control flow (spec.md §9).

use std::{
    fs::{File, OpenOptions},
    io::{Read, Write},
    path::Path,
    time::Duration,
};

use tracing::warn;

use crate::{
    acl::{cache::UserCache, filter, user::UserSnapshot},
    cfg::config::HooksConfig,
    error::{Error, Flow, Result},
    server::{
        reply,
        slots::{Direction, SlotDenied, SlotTracker},
    },
    transfer::{DataType, SectionCtx, TransferResult, TransferStats, crc::CrcSink, data_channel::DataChannelPlan, hooks, owner::OwnerCache, speed::SpeedGovernor},
    util::wildcard::wildcard_match,
};

const READ_BUF: usize = 16 * 1024;

/// Everything `run` needs; built by the dispatcher from the session's
/// live state and the resolved configuration.
pub struct UploadRequest<'a> {
    pub user: &'a UserSnapshot,
    pub users: &'a UserCache,
    pub owners: &'a OwnerCache,
    pub slots: &'a SlotTracker,
    pub section: &'a SectionCtx,
    pub vpath: String,
    pub physical: std::path::PathBuf,
    pub data_plan: DataChannelPlan,
    pub data_type: DataType,
    pub rest_offset: u64,
    pub append: bool,
    pub protected_required: bool,
    pub data_channel_protected: bool,
    pub hideowner: bool,
    pub crc_globs: &'a [String],
    pub crc_background: bool,
    pub speed_cap: f64,
    pub speed_floor: f64,
    pub speed_grace: Duration,
    pub hooks: &'a HooksConfig,
    pub filename_allowed_chars: &'a str,
    /// Global concurrent-upload cap across all users (`-1` unlimited).
    pub global_max_up: i32,
}

/// Runs the whole STOR/APPE pipeline against `writer`, the control
/// channel. On `Err(Error::Network(_))` the caller must terminate the
/// session (spec.md §7: network errors on control are rethrown).
pub fn run(req: UploadRequest<'_>, control: &mut impl Write, interrupted: &dyn Fn() -> bool) -> Result<()> {
    let basename = crate::server::vpath::basename(&req.vpath);

    // Step 1: filename filter.
    if let Err(msg) = filter::filter_basename(basename, req.filename_allowed_chars) {
        reply::send(control, 553, &msg)?;
        return Ok(());
    }

    // Step 2: REST under ASCII is rejected outright.
    if req.rest_offset > 0 && req.data_type == DataType::Ascii {
        reply::send(control, 503, "REST not allowed with ASCII transfers.")?;
        return Ok(());
    }

    // Step 3: pre-transfer hook; non-zero exit skips silently.
    if hooks::run_pre_upload(req.hooks, &req.vpath, &req.section.name) != 0 {
        return Ok(());
    }

    // Step 4: reserve an upload slot.
    let _slot_guard = match req.slots.reserve(req.user.id, Direction::Upload, req.user.max_sim_up, req.global_max_up) {
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

    // Step 5: ASCII-restricted section check.
    if req.data_type == DataType::Ascii && req.section.ascii_restricted {
        reply::send(control, 550, "ASCII transfers are not permitted in this section.")?;
        return Ok(());
    }

    // Step 6: open the sink.
    let append = req.append || req.rest_offset > 0;
    let existed_before = req.physical.exists();
    let sink = if append {
        OpenOptions::new().create(true).append(true).open(&req.physical).map_err(Error::from)
    } else if existed_before {
        Err(Error::system(libc_eexist(), "file exists"))
    } else {
        File::create(&req.physical).map_err(Error::from)
    };

    let mut sink = match sink {
        Ok(f) => f,
        Err(_) if !append && existed_before => {
            let lines = dupe_message_lines(&req);
            reply::send_multi(control, 553, &lines, "File exists.")?;
            return Ok(());
        },
        Err(e) => {
            reply::send(control, 553, &format!("Cannot open destination: {e}"))?;
            return Ok(());
        },
    };
    let fresh = !append && !existed_before;
    if fresh {
        req.owners.record(&req.physical, &req.user.name);
    }

    // Step 7: announce and open the data channel.
    reply::send(control, 150, "Opening data connection.")?;
    let mut data = match req.data_plan.open() {
        Ok(d) => d,
        Err(_) => {
            if fresh {
                req.owners.forget(&req.physical);
                let _ = std::fs::remove_file(&req.physical);
            }
            reply::send(control, 425, "Can't open data connection.")?;
            return Ok(());
        },
    };

    // Step 8: protection check. A fresh (REST=0) partial is removed on
    // this exit path too (spec.md §5 "partial uploads are deleted on
    // abort unless REST>0 at entry").
    if req.protected_required && !req.data_channel_protected {
        if fresh {
            req.owners.forget(&req.physical);
            let _ = std::fs::remove_file(&req.physical);
        }
        reply::send(control, 536, "Requested PROT level not supported.")?;
        return Ok(());
    }

    let calc_crc = req.crc_globs.iter().any(|g| wildcard_match(g, &req.vpath));
    let mut crc_sink = if calc_crc {
        Some(if req.crc_background { CrcSink::background() } else { CrcSink::inline() })
    } else {
        None
    };

    let mut governor = SpeedGovernor::new(req.speed_cap, req.speed_floor, req.speed_grace);
    let mut buf = vec![0u8; READ_BUF];
    let mut ascii_pending_cr = false;
    let mut ascii_out = Vec::with_capacity(READ_BUF);
    let mut aborted = false;
    let mut io_failed = false;

    loop {
        if interrupted() {
            aborted = true;
            break;
        }
        let n = match data.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(_) => {
                io_failed = true;
                break;
            },
        };

        let chunk: &[u8] = if req.data_type == DataType::Ascii {
            crate::transfer::ascii::decode_crlf_to_lf(&buf[..n], &mut ascii_pending_cr, &mut ascii_out);
            &ascii_out
        } else {
            &buf[..n]
        };

        if sink.write_all(chunk).is_err() {
            io_failed = true;
            break;
        }
        if let Some(crc) = crc_sink.as_mut() {
            crc.update(chunk);
        }

        match governor.record(chunk.len()) {
            Ok(()) => {},
            Err(Flow::MinimumSpeed { .. }) => {
                aborted = true;
                break;
            },
            Err(_) => unreachable!("SpeedGovernor only raises MinimumSpeed"),
        }
    }

    drop(sink);
    let _ = data.shutdown(std::net::Shutdown::Both);

    if io_failed {
        reply::send(control, 426, "Connection closed; transfer aborted.")?;
        return Ok(());
    }

    if aborted && !append {
        req.owners.forget(&req.physical);
        let _ = std::fs::remove_file(&req.physical);
    }

    if let Err(e) = set_completion_mode(&req.physical) {
        warn!(path = %req.vpath, error = %e, "chmod after STOR failed");
    }

    let crc_hex = match crc_sink {
        Some(sink) => crate::transfer::crc::format_hex(sink.finalize()),
        None => "000000".to_string(),
    };

    let stats = TransferStats {
        bytes: governor.total_bytes(),
        duration_secs: governor.duration().as_secs_f64(),
        crc_hex,
        result: if aborted { TransferResult::AbortedByClient } else { TransferResult::Completed },
    };

    if aborted {
        reply::send(control, 226, &format!("Transfer aborted @ {:.1} KB/s", stats.speed_bytes_per_sec() / 1024.0))?;
        return Ok(());
    }

    // Step 12: post-hook, stats, credit.
    let post_ok = hooks::run_post_upload(req.hooks, &req.vpath, &stats.crc_hex, stats.speed_bytes_per_sec(), &req.section.name) == 0;
    if post_ok {
        let key = req.section.credit_key();
        let kb = (stats.bytes as f64 / 1024.0).ceil() as i64;
        let ratio = req.user.ratio.get(key).copied().unwrap_or_else(|| req.user.ratio.get("").copied().unwrap_or(3));
        if ratio > 0 {
            let credit_kb = kb * ratio as i64;
            let _ = req.users.incr_credits(&req.user.name, key, credit_kb);
        }
    }

    reply::send(control, 226, &format!("Transfer finished @ {:.1} KB/s", stats.speed_bytes_per_sec() / 1024.0))
}

fn dupe_message_lines(req: &UploadRequest<'_>) -> Vec<String> {
    let mut lines = vec!["XDUPE".to_string()];
    if req.hideowner {
        lines.push("File already exists.".to_string());
    } else {
        let age = std::fs::metadata(&req.physical)
            .ok()
            .and_then(|m| m.modified().ok())
            .and_then(|m| m.elapsed().ok())
            .map(|d| crate::util::time::format_duration(d.into()))
            .unwrap_or_else(|| "an unknown time".to_string());
        match req.owners.owner(&req.physical) {
            Some(owner) => lines.push(format!("File exists, uploaded by {owner} {age} ago.")),
            None => lines.push(format!("File exists, uploaded {age} ago.")),
        }
    }
    lines
}

fn set_completion_mode(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o666))
}

fn libc_eexist() -> i32 {
    17
}

#[cfg(test)]
mod tests {
    use std::{net::TcpListener, sync::Arc};

    use tempfile::tempdir;

    use super::*;
    use crate::{
        acl::{cache::UserCache, user::UserProfile},
        db::{InMemoryStore, StoreProxy},
        server::slots::SlotTracker,
    };

    fn user_cache() -> UserCache {
        UserCache::new(Arc::new(StoreProxy::new(Arc::new(InMemoryStore::default()))))
    }

    #[test]
    fn rejects_ascii_with_nonzero_rest() {
        let dir = tempdir().unwrap();
        let cache = user_cache();
        let snap = cache.create("alice", "pw", "", -1).unwrap();
        let owners = OwnerCache::new();
        let slots = SlotTracker::new();
        let hooks = HooksConfig::default();
        let (plan, _client) = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let addr = listener.local_addr().unwrap();
            (DataChannelPlan::Active(addr), addr)
        };
        let req = UploadRequest {
            user: &snap,
            users: &cache,
            owners: &owners,
            slots: &slots,
            section: &SectionCtx::default_section(),
            vpath: "/f.txt".into(),
            physical: dir.path().join("f.txt"),
            data_plan: plan,
            data_type: DataType::Ascii,
            rest_offset: 100,
            append: false,
            protected_required: false,
            data_channel_protected: false,
            hideowner: false,
            crc_globs: &[],
            crc_background: false,
            speed_cap: 0.0,
            speed_floor: 0.0,
            speed_grace: Duration::from_secs(10),
            hooks: &hooks,
            filename_allowed_chars: "",
            global_max_up: -1,
        };
        let mut out = Vec::new();
        run(req, &mut out, &|| false).unwrap();
        assert!(String::from_utf8_lossy(&out).starts_with("503"));
    }

    #[test]
    fn completed_upload_writes_file_and_credits_uploader() {
        let dir = tempdir().unwrap();
        let cache = user_cache();
        let mut snap = cache.create("bob", "pw", "", -1).unwrap();
        snap.ratio.insert(String::new(), 1);
        let owners = OwnerCache::new();
        let slots = SlotTracker::new();
        let hooks = HooksConfig::default();

        let (plan, data_addr) = DataChannelPlan::passive("127.0.0.1".parse().unwrap()).unwrap();
        let client_thread = std::thread::spawn(move || {
            let mut client = std::net::TcpStream::connect(data_addr).unwrap();
            client.write_all(b"hello world").unwrap();
            client.shutdown(std::net::Shutdown::Write).unwrap();
        });

        let req = UploadRequest {
            user: &snap,
            users: &cache,
            owners: &owners,
            slots: &slots,
            section: &SectionCtx::default_section(),
            vpath: "/f.txt".into(),
            physical: dir.path().join("f.txt"),
            data_plan: plan,
            data_type: DataType::Binary,
            rest_offset: 0,
            append: false,
            protected_required: false,
            data_channel_protected: false,
            hideowner: false,
            crc_globs: &[],
            crc_background: false,
            speed_cap: 0.0,
            speed_floor: 0.0,
            speed_grace: Duration::from_secs(10),
            hooks: &hooks,
            filename_allowed_chars: "",
            global_max_up: -1,
        };
        let mut out = Vec::new();
        run(req, &mut out, &|| false).unwrap();
        client_thread.join().unwrap();

        let reply = String::from_utf8_lossy(&out);
        assert!(reply.contains("150"));
        assert!(reply.contains("226"));
        assert_eq!(std::fs::read(dir.path().join("f.txt")).unwrap(), b"hello world");

        let after = cache.user_by_name("bob").unwrap();
        assert_eq!(*after.credits.get("").unwrap(), 1);
    }

    #[test]
    fn dupe_message_names_the_uploader_unless_hideowner() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dup.bin");
        std::fs::write(&path, b"existing").unwrap();

        let cache = user_cache();
        let snap = cache.create("carol", "pw", "", -1).unwrap();
        let owners = OwnerCache::new();
        owners.record(&path, "alice");
        let slots = SlotTracker::new();
        let hooks = HooksConfig::default();

        let named = UploadRequest {
            user: &snap,
            users: &cache,
            owners: &owners,
            slots: &slots,
            section: &SectionCtx::default_section(),
            vpath: "/dup.bin".into(),
            physical: path.clone(),
            data_plan: DataChannelPlan::Active("127.0.0.1:0".parse().unwrap()),
            data_type: DataType::Binary,
            rest_offset: 0,
            append: false,
            protected_required: false,
            data_channel_protected: false,
            hideowner: false,
            crc_globs: &[],
            crc_background: false,
            speed_cap: 0.0,
            speed_floor: 0.0,
            speed_grace: Duration::from_secs(10),
            hooks: &hooks,
            filename_allowed_chars: "",
            global_max_up: -1,
        };
        let lines = dupe_message_lines(&named);
        assert!(lines.iter().any(|l| l.contains("alice")), "expected uploader name in {lines:?}");

        let hidden = UploadRequest { hideowner: true, physical: path, ..named };
        let lines = dupe_message_lines(&hidden);
        assert!(!lines.iter().any(|l| l.contains("alice")), "hideowner leaked uploader name: {lines:?}");
    }

    #[test]
    fn protection_failure_deletes_the_fresh_partial() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.txt");

        let cache = user_cache();
        let snap = cache.create("dave", "pw", "", -1).unwrap();
        let owners = OwnerCache::new();
        let slots = SlotTracker::new();
        let hooks = HooksConfig::default();

        let (plan, data_addr) = DataChannelPlan::passive("127.0.0.1".parse().unwrap()).unwrap();
        let client_thread = std::thread::spawn(move || {
            let _client = std::net::TcpStream::connect(data_addr).unwrap();
        });

        let req = UploadRequest {
            user: &snap,
            users: &cache,
            owners: &owners,
            slots: &slots,
            section: &SectionCtx::default_section(),
            vpath: "/f.txt".into(),
            physical: path.clone(),
            data_plan: plan,
            data_type: DataType::Binary,
            rest_offset: 0,
            append: false,
            protected_required: true,
            data_channel_protected: false,
            hideowner: false,
            crc_globs: &[],
            crc_background: false,
            speed_cap: 0.0,
            speed_floor: 0.0,
            speed_grace: Duration::from_secs(10),
            hooks: &hooks,
            filename_allowed_chars: "",
            global_max_up: -1,
        };
        let mut out = Vec::new();
        run(req, &mut out, &|| false).unwrap();
        client_thread.join().unwrap();

        assert!(String::from_utf8_lossy(&out).contains("536"));
        assert!(!path.exists(), "partial upload should have been removed after the protection failure");
        assert_eq!(owners.owner(&path), None);
    }
}
