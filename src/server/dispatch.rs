// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2026 ironftpd contributors

//! Command dispatch table (spec.md §4.2): one function per verb,
//! invoked against the session's live [`DispatchCtx`] with the control
//! channel as the reply sink. This is the orchestration layer only —
//! the actual transfer pipelines live in [`crate::transfer`].

use std::{
    io::Write,
    sync::{Arc, mpsc},
    time::Duration,
};

use crate::{
    acl::{filter, user::UserSnapshot},
    cfg::Config,
    error::{Error, Result},
    server::{
        reply,
        session::{Phase, SessionHandle, SessionServices},
        task, vpath,
    },
    transfer::{DataType, SectionCtx, data_channel::DataChannelPlan, download, upload},
};

/// Whether the session's command loop should keep reading or close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Quit,
}

/// Per-connection dispatch state: everything a verb handler needs that
/// isn't already on [`SessionHandle`] (spec.md §4.2's `{cwd, type,
/// restOffset, renameFrom}` session-local fields).
pub struct DispatchCtx {
    pub handle: Arc<SessionHandle>,
    pub services: Arc<SessionServices>,
    pub cwd: String,
    pub data_type: DataType,
    pub rest_offset: u64,
    pub rename_from: Option<String>,
    pub pending_data_plan: Option<DataChannelPlan>,
    pub protected: bool,
    fail_count: u32,
}

impl DispatchCtx {
    pub fn new(handle: Arc<SessionHandle>, services: Arc<SessionServices>) -> Self {
        Self {
            handle,
            services,
            cwd: "/".to_string(),
            data_type: DataType::Binary,
            rest_offset: 0,
            rename_from: None,
            pending_data_plan: None,
            protected: false,
            fail_count: 0,
        }
    }

    /// The idle-kick deadline: the logged-in user's own `idleTime`, or
    /// the configured default while still unauthenticated. `<= 0` means
    /// no timeout (spec.md §4.2 "Idle timeout").
    pub fn idle_limit(&self) -> Duration {
        let secs = match self.handle.user() {
            Some(user) => user.idle_time_secs,
            None => self.config().users.idle_time_secs,
        };
        if secs <= 0 { Duration::MAX } else { Duration::from_secs(secs as u64) }
    }

    fn config(&self) -> Arc<Config> {
        self.services.config.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Dispatches one already-parsed `(verb, arg)` pair, writing exactly the
/// reply (or replies) the verb produces to `writer`.
pub fn dispatch(ctx: &mut DispatchCtx, verb: &str, arg: &str, writer: &mut impl Write) -> Result<Outcome> {
    match verb {
        "USER" => cmd_user(ctx, arg, writer),
        "PASS" => cmd_pass(ctx, arg, writer),
        "QUIT" => {
            reply::send(writer, 221, "Goodbye.")?;
            Ok(Outcome::Quit)
        },
        "NOOP" => {
            reply::send(writer, 200, "NOOP ok.")?;
            Ok(Outcome::Continue)
        },
        "SYST" => {
            reply::send(writer, 215, "UNIX Type: L8")?;
            Ok(Outcome::Continue)
        },
        "TYPE" => cmd_type(ctx, arg, writer),
        "MODE" => cmd_mode(arg, writer),
        "STRU" => cmd_stru(arg, writer),
        "REST" => cmd_rest(ctx, arg, writer),
        "PWD" | "XPWD" => cmd_pwd(ctx, writer),
        "CWD" | "XCWD" => cmd_cwd(ctx, arg, writer),
        "CDUP" | "XCUP" => cmd_cwd(ctx, "..", writer),
        "MKD" | "XMKD" => cmd_mkd(ctx, arg, writer),
        "RMD" | "XRMD" => cmd_rmd(ctx, arg, writer),
        "DELE" => cmd_dele(ctx, arg, writer),
        "RNFR" => cmd_rnfr(ctx, arg, writer),
        "RNTO" => cmd_rnto(ctx, arg, writer),
        "SIZE" => cmd_size(ctx, arg, writer),
        "MDTM" => cmd_mdtm(ctx, arg, writer),
        "FEAT" => cmd_feat(writer),
        "OPTS" => {
            reply::send(writer, 200, "OPTS ok.")?;
            Ok(Outcome::Continue)
        },
        "AUTH" => cmd_auth(arg, writer),
        "PBSZ" => {
            reply::send(writer, 200, "PBSZ=0 successful.")?;
            Ok(Outcome::Continue)
        },
        "PROT" => cmd_prot(ctx, arg, writer),
        "CCC" => {
            reply::send(writer, 200, "Reverting to clear control channel.")?;
            Ok(Outcome::Continue)
        },
        "PASV" => cmd_pasv(ctx, writer),
        "EPSV" => cmd_epsv(ctx, writer),
        "PORT" => cmd_port(ctx, arg, writer),
        "EPRT" => cmd_eprt(ctx, arg, writer),
        "STOR" => cmd_stor(ctx, arg, writer, false),
        "APPE" => cmd_stor(ctx, arg, writer, true),
        "RETR" => cmd_retr(ctx, arg, writer),
        "LIST" => cmd_list(ctx, arg, writer, false),
        "NLST" => cmd_list(ctx, arg, writer, true),
        "STAT" => cmd_stat(ctx, arg, writer),
        "ABOR" => {
            reply::send(writer, 226, "ABOR command successful.")?;
            Ok(Outcome::Continue)
        },
        "SITE" => cmd_site(ctx, arg, writer),
        "HELP" => {
            reply::send(writer, 214, "No help available.")?;
            Ok(Outcome::Continue)
        },
        _ => {
            reply::send(writer, 500, "Command not recognized.")?;
            Ok(Outcome::Continue)
        },
    }
}

/// Sends `530` and returns `None` when the session has no logged-in
/// user; otherwise hands back the snapshot (spec.md §4.2 state table:
/// most verbs require `LoggedIn`).
fn require_login(ctx: &DispatchCtx, writer: &mut impl Write) -> Result<Option<UserSnapshot>> {
    match ctx.handle.user() {
        Some(u) => Ok(Some(u)),
        None => {
            reply::send(writer, 530, "Please login with USER and PASS.")?;
            Ok(None)
        },
    }
}

fn cmd_user(ctx: &mut DispatchCtx, arg: &str, writer: &mut impl Write) -> Result<Outcome> {
    let name = arg.trim();
    if name.is_empty() {
        reply::send(writer, 501, "USER requires a name.")?;
        return Ok(Outcome::Continue);
    }
    ctx.handle.set_pending_username(Some(name.to_string()));
    ctx.handle.mark_login_started();
    ctx.handle.set_phase(Phase::AwaitingPass);
    reply::send(writer, 331, &format!("Password required for {name}."))?;
    Ok(Outcome::Continue)
}

fn cmd_pass(ctx: &mut DispatchCtx, arg: &str, writer: &mut impl Write) -> Result<Outcome> {
    let Some(name) = ctx.handle.pending_username() else {
        reply::send(writer, 503, "Login with USER first.")?;
        return Ok(Outcome::Continue);
    };
    match attempt_login(ctx, &name, arg) {
        Ok(user) => {
            let user = ctx.services.users.incr_logged_in(&name).unwrap_or(user);
            ctx.cwd = if user.home_dir.is_empty() { "/".to_string() } else { user.home_dir.clone() };
            ctx.handle.set_user(Some(user));
            ctx.handle.set_pending_username(None);
            ctx.handle.set_phase(Phase::LoggedIn);
            ctx.fail_count = 0;
            reply::send(writer, 230, &format!("User {name} logged in."))?;
            Ok(Outcome::Continue)
        },
        Err(msg) => {
            ctx.handle.set_pending_username(None);
            ctx.handle.set_phase(Phase::AwaitingUser);
            ctx.fail_count += 1;
            reply::send(writer, 530, &msg)?;
            if ctx.fail_count >= 3 { Ok(Outcome::Quit) } else { Ok(Outcome::Continue) }
        },
    }
}

/// Full login-checks sequence (spec.md §4.2 `PASS`): password, then the
/// user's own IP masks (an empty list allows any address — a user with
/// no configured mask has not opted into IP restriction), expiry, and
/// the concurrent-login cap, in that order.
fn attempt_login(ctx: &DispatchCtx, name: &str, password: &str) -> std::result::Result<UserSnapshot, String> {
    if !ctx.services.users.verify_password(name, password).unwrap_or(false) {
        return Err("Login incorrect.".to_string());
    }
    let user = ctx.services.users.user_by_name(name).map_err(|_| "Login incorrect.".to_string())?;
    if user.deleted {
        return Err("Login incorrect.".to_string());
    }
    if user.is_expired(chrono::Utc::now()) {
        return Err("Account has expired.".to_string());
    }
    let masks = ctx.services.users.list_ip_masks(name).unwrap_or_default();
    if !masks.is_empty() {
        let allowed = ctx
            .handle
            .peer_addr()
            .is_some_and(|peer| ctx.services.users.ident_ip_allowed(user.id, "*", peer.ip()));
        if !allowed {
            return Err("IP address not allowed.".to_string());
        }
    }
    if user.num_logins >= 0 && user.logged_in as i32 >= user.num_logins {
        return Err("Too many logins for this user.".to_string());
    }
    Ok(user)
}

fn cmd_type(ctx: &mut DispatchCtx, arg: &str, writer: &mut impl Write) -> Result<Outcome> {
    match arg.trim().to_ascii_uppercase().chars().next() {
        Some('A') => {
            ctx.data_type = DataType::Ascii;
            reply::send(writer, 200, "Type set to A.")?;
        },
        Some('I') => {
            ctx.data_type = DataType::Binary;
            reply::send(writer, 200, "Type set to I.")?;
        },
        _ => {
            reply::send(writer, 504, "Type not supported.")?;
        },
    }
    Ok(Outcome::Continue)
}

fn cmd_mode(arg: &str, writer: &mut impl Write) -> Result<Outcome> {
    match arg.trim().to_ascii_uppercase().as_str() {
        "S" => reply::send(writer, 200, "Mode set to S.")?,
        _ => reply::send(writer, 504, "Mode not supported.")?,
    }
    Ok(Outcome::Continue)
}

fn cmd_stru(arg: &str, writer: &mut impl Write) -> Result<Outcome> {
    match arg.trim().to_ascii_uppercase().as_str() {
        "F" => reply::send(writer, 200, "Structure set to F.")?,
        _ => reply::send(writer, 504, "Structure not supported.")?,
    }
    Ok(Outcome::Continue)
}

fn cmd_rest(ctx: &mut DispatchCtx, arg: &str, writer: &mut impl Write) -> Result<Outcome> {
    match arg.trim().parse::<u64>() {
        Ok(offset) => {
            ctx.rest_offset = offset;
            reply::send(writer, 350, "Restarting at requested offset.")?;
        },
        Err(_) => reply::send(writer, 501, "Invalid REST offset.")?,
    }
    Ok(Outcome::Continue)
}

fn cmd_pwd(ctx: &DispatchCtx, writer: &mut impl Write) -> Result<Outcome> {
    if require_login(ctx, writer)?.is_none() {
        return Ok(Outcome::Continue);
    }
    reply::send(writer, 257, &format!("\"{}\" is current directory.", ctx.cwd))?;
    Ok(Outcome::Continue)
}

fn cmd_cwd(ctx: &mut DispatchCtx, arg: &str, writer: &mut impl Write) -> Result<Outcome> {
    if require_login(ctx, writer)?.is_none() {
        return Ok(Outcome::Continue);
    }
    let vp = vpath::normalize(&ctx.cwd, arg.trim());
    let config = ctx.config();
    let physical = vpath::to_physical(&config.runtime.data_dir, &vp);
    if physical.is_dir() {
        ctx.cwd = vp.clone();
        reply::send(writer, 250, &format!("Directory changed to {vp}."))?;
    } else {
        reply::send(writer, 550, "No such directory.")?;
    }
    Ok(Outcome::Continue)
}

fn cmd_mkd(ctx: &mut DispatchCtx, arg: &str, writer: &mut impl Write) -> Result<Outcome> {
    if require_login(ctx, writer)?.is_none() {
        return Ok(Outcome::Continue);
    }
    let vp = vpath::normalize(&ctx.cwd, arg.trim());
    let config = ctx.config();
    let physical = vpath::to_physical(&config.runtime.data_dir, &vp);
    match std::fs::create_dir(&physical) {
        Ok(()) => reply::send(writer, 257, &format!("\"{vp}\" directory created."))?,
        Err(e) => reply::send(writer, 550, &format!("Cannot create directory: {e}"))?,
    }
    Ok(Outcome::Continue)
}

fn cmd_rmd(ctx: &mut DispatchCtx, arg: &str, writer: &mut impl Write) -> Result<Outcome> {
    if require_login(ctx, writer)?.is_none() {
        return Ok(Outcome::Continue);
    }
    let vp = vpath::normalize(&ctx.cwd, arg.trim());
    let config = ctx.config();
    let physical = vpath::to_physical(&config.runtime.data_dir, &vp);
    match std::fs::remove_dir(&physical) {
        Ok(()) => reply::send(writer, 250, "Directory removed.")?,
        Err(e) => reply::send(writer, 550, &format!("Cannot remove directory: {e}"))?,
    }
    Ok(Outcome::Continue)
}

fn cmd_dele(ctx: &mut DispatchCtx, arg: &str, writer: &mut impl Write) -> Result<Outcome> {
    if require_login(ctx, writer)?.is_none() {
        return Ok(Outcome::Continue);
    }
    let vp = vpath::normalize(&ctx.cwd, arg.trim());
    let config = ctx.config();
    let physical = vpath::to_physical(&config.runtime.data_dir, &vp);
    match std::fs::remove_file(&physical) {
        Ok(()) => reply::send(writer, 250, "File deleted.")?,
        Err(e) => reply::send(writer, 550, &format!("Cannot delete file: {e}"))?,
    }
    Ok(Outcome::Continue)
}

fn cmd_rnfr(ctx: &mut DispatchCtx, arg: &str, writer: &mut impl Write) -> Result<Outcome> {
    if require_login(ctx, writer)?.is_none() {
        return Ok(Outcome::Continue);
    }
    let vp = vpath::normalize(&ctx.cwd, arg.trim());
    let config = ctx.config();
    let physical = vpath::to_physical(&config.runtime.data_dir, &vp);
    if physical.exists() {
        ctx.rename_from = Some(vp);
        reply::send(writer, 350, "Ready for RNTO.")?;
    } else {
        reply::send(writer, 550, "No such file or directory.")?;
    }
    Ok(Outcome::Continue)
}

fn cmd_rnto(ctx: &mut DispatchCtx, arg: &str, writer: &mut impl Write) -> Result<Outcome> {
    if require_login(ctx, writer)?.is_none() {
        return Ok(Outcome::Continue);
    }
    let Some(from_vp) = ctx.rename_from.take() else {
        reply::send(writer, 503, "RNFR required first.")?;
        return Ok(Outcome::Continue);
    };
    let to_vp = vpath::normalize(&ctx.cwd, arg.trim());
    let config = ctx.config();
    let from_physical = vpath::to_physical(&config.runtime.data_dir, &from_vp);
    let to_physical = vpath::to_physical(&config.runtime.data_dir, &to_vp);
    match std::fs::rename(&from_physical, &to_physical) {
        Ok(()) => reply::send(writer, 250, "Rename successful.")?,
        Err(e) => reply::send(writer, 550, &format!("Cannot rename: {e}"))?,
    }
    Ok(Outcome::Continue)
}

fn cmd_size(ctx: &DispatchCtx, arg: &str, writer: &mut impl Write) -> Result<Outcome> {
    if require_login(ctx, writer)?.is_none() {
        return Ok(Outcome::Continue);
    }
    let vp = vpath::normalize(&ctx.cwd, arg.trim());
    let config = ctx.config();
    let physical = vpath::to_physical(&config.runtime.data_dir, &vp);
    match std::fs::metadata(&physical) {
        Ok(m) if m.is_file() => reply::send(writer, 213, &m.len().to_string())?,
        _ => reply::send(writer, 550, "Could not get file size.")?,
    }
    Ok(Outcome::Continue)
}

fn cmd_mdtm(ctx: &DispatchCtx, arg: &str, writer: &mut impl Write) -> Result<Outcome> {
    if require_login(ctx, writer)?.is_none() {
        return Ok(Outcome::Continue);
    }
    let vp = vpath::normalize(&ctx.cwd, arg.trim());
    let config = ctx.config();
    let physical = vpath::to_physical(&config.runtime.data_dir, &vp);
    match std::fs::metadata(&physical).and_then(|m| m.modified()) {
        Ok(t) => {
            let dt: chrono::DateTime<chrono::Utc> = t.into();
            reply::send(writer, 213, &dt.format("%Y%m%d%H%M%S").to_string())?;
        },
        Err(_) => reply::send(writer, 550, "Could not get modification time.")?,
    }
    Ok(Outcome::Continue)
}

fn cmd_feat(writer: &mut impl Write) -> Result<Outcome> {
    reply::send_multi(
        writer,
        211,
        &["PASV".to_string(), "EPSV".to_string(), "REST STREAM".to_string(), "SIZE".to_string(), "MDTM".to_string()],
        "End",
    )?;
    Ok(Outcome::Continue)
}

/// `AUTH`/`PBSZ`/`PROT`/`CCC` are deliberately thin: real TLS
/// negotiation is an external collaborator this core doesn't own, so
/// these only acknowledge the handshake the way a TLS-capable front end
/// would expect before attaching one.
fn cmd_auth(arg: &str, writer: &mut impl Write) -> Result<Outcome> {
    match arg.trim().to_ascii_uppercase().as_str() {
        "TLS" | "TLS-C" | "SSL" => reply::send(writer, 234, "AUTH command ok. Expecting TLS negotiation.")?,
        _ => reply::send(writer, 504, "AUTH mechanism not supported.")?,
    }
    Ok(Outcome::Continue)
}

fn cmd_prot(ctx: &mut DispatchCtx, arg: &str, writer: &mut impl Write) -> Result<Outcome> {
    match arg.trim().to_ascii_uppercase().as_str() {
        "P" => {
            ctx.protected = true;
            reply::send(writer, 200, "Protection level set to P.")?;
        },
        "C" => {
            ctx.protected = false;
            reply::send(writer, 200, "Protection level set to C.")?;
        },
        _ => reply::send(writer, 504, "Protection level not supported.")?,
    }
    Ok(Outcome::Continue)
}

fn cmd_pasv(ctx: &mut DispatchCtx, writer: &mut impl Write) -> Result<Outcome> {
    if require_login(ctx, writer)?.is_none() {
        return Ok(Outcome::Continue);
    }
    let Some(local) = ctx.handle.local_addr() else {
        reply::send(writer, 425, "Cannot determine local address.")?;
        return Ok(Outcome::Continue);
    };
    let std::net::IpAddr::V4(ip4) = local.ip() else {
        reply::send(writer, 425, "Use EPSV for IPv6 connections.")?;
        return Ok(Outcome::Continue);
    };
    match DataChannelPlan::passive(std::net::IpAddr::V4(ip4)) {
        Ok((plan, addr)) => {
            ctx.pending_data_plan = Some(plan);
            let [a, b, c, d] = ip4.octets();
            let p1 = (addr.port() >> 8) as u8;
            let p2 = (addr.port() & 0xff) as u8;
            reply::send(writer, 227, &format!("Entering Passive Mode ({a},{b},{c},{d},{p1},{p2})."))?;
        },
        Err(_) => reply::send(writer, 425, "Cannot open passive listener.")?,
    }
    Ok(Outcome::Continue)
}

fn cmd_epsv(ctx: &mut DispatchCtx, writer: &mut impl Write) -> Result<Outcome> {
    if require_login(ctx, writer)?.is_none() {
        return Ok(Outcome::Continue);
    }
    let Some(local) = ctx.handle.local_addr() else {
        reply::send(writer, 425, "Cannot determine local address.")?;
        return Ok(Outcome::Continue);
    };
    match DataChannelPlan::passive(local.ip()) {
        Ok((plan, addr)) => {
            ctx.pending_data_plan = Some(plan);
            reply::send(writer, 229, &format!("Entering Extended Passive Mode (|||{}|).", addr.port()))?;
        },
        Err(_) => reply::send(writer, 425, "Cannot open passive listener.")?,
    }
    Ok(Outcome::Continue)
}

fn cmd_port(ctx: &mut DispatchCtx, arg: &str, writer: &mut impl Write) -> Result<Outcome> {
    if require_login(ctx, writer)?.is_none() {
        return Ok(Outcome::Continue);
    }
    let fields: Vec<&str> = arg.trim().split(',').collect();
    if fields.len() != 6 {
        reply::send(writer, 501, "Malformed PORT argument.")?;
        return Ok(Outcome::Continue);
    }
    let parsed: std::result::Result<Vec<u8>, _> = fields.iter().map(|f| f.parse::<u8>()).collect();
    match parsed {
        Ok(nums) => {
            let ip = std::net::Ipv4Addr::new(nums[0], nums[1], nums[2], nums[3]);
            let port = (nums[4] as u16) << 8 | nums[5] as u16;
            ctx.pending_data_plan = Some(DataChannelPlan::active(std::net::SocketAddr::new(ip.into(), port)));
            reply::send(writer, 200, "PORT command successful.")?;
        },
        Err(_) => reply::send(writer, 501, "Malformed PORT argument.")?,
    }
    Ok(Outcome::Continue)
}

fn cmd_eprt(ctx: &mut DispatchCtx, arg: &str, writer: &mut impl Write) -> Result<Outcome> {
    if require_login(ctx, writer)?.is_none() {
        return Ok(Outcome::Continue);
    }
    let parts: Vec<&str> = arg.trim().split('|').filter(|s| !s.is_empty()).collect();
    if parts.len() != 3 {
        reply::send(writer, 501, "Malformed EPRT argument.")?;
        return Ok(Outcome::Continue);
    }
    let ip: std::result::Result<std::net::IpAddr, _> = parts[1].parse();
    let port: std::result::Result<u16, _> = parts[2].parse();
    match (ip, port) {
        (Ok(ip), Ok(port)) => {
            ctx.pending_data_plan = Some(DataChannelPlan::active(std::net::SocketAddr::new(ip, port)));
            reply::send(writer, 200, "EPRT command successful.")?;
        },
        _ => reply::send(writer, 501, "Malformed EPRT argument.")?,
    }
    Ok(Outcome::Continue)
}

/// Shared `STOR`/`APPE` front end: the two verbs differ only in how the
/// sink is opened, which `upload::run` itself handles via `append`
/// (spec.md SPEC_FULL §4.3 "NEW — APPE").
fn cmd_stor(ctx: &mut DispatchCtx, arg: &str, writer: &mut impl Write, append: bool) -> Result<Outcome> {
    let Some(user) = require_login(ctx, writer)? else { return Ok(Outcome::Continue) };
    let Some(data_plan) = ctx.pending_data_plan.take() else {
        reply::send(writer, 425, "Use PASV or PORT first.")?;
        return Ok(Outcome::Continue);
    };
    if arg.trim().is_empty() {
        reply::send(writer, 501, "Missing filename.")?;
        return Ok(Outcome::Continue);
    }
    let vp = vpath::normalize(&ctx.cwd, arg.trim());
    let config = ctx.config();
    let physical = vpath::to_physical(&config.runtime.data_dir, &vp);
    let section_cfg = config.section_for(&vp).cloned();
    let section = SectionCtx::from_config(section_cfg.as_ref());
    let rest_offset = std::mem::take(&mut ctx.rest_offset);
    let hideowner = user.flags.has_all("H");

    let req = upload::UploadRequest {
        user: &user,
        users: ctx.services.users.as_ref(),
        owners: ctx.services.owners.as_ref(),
        slots: ctx.services.slots.as_ref(),
        section: &section,
        vpath: vp,
        physical,
        data_plan,
        data_type: ctx.data_type,
        rest_offset,
        append,
        protected_required: ctx.protected,
        data_channel_protected: ctx.protected,
        hideowner,
        crc_globs: &config.transfer.calc_crc,
        crc_background: config.transfer.crc_background,
        speed_cap: user.max_up_speed as f64,
        speed_floor: config.transfer.min_speed,
        speed_grace: Duration::from_secs(config.transfer.min_speed_grace_secs),
        hooks: &config.hooks,
        filename_allowed_chars: "",
        global_max_up: config.transfer.max_sim_up_global,
    };
    let handle = ctx.handle.clone();
    upload::run(req, writer, &|| handle.is_interrupted())?;
    Ok(Outcome::Continue)
}

fn cmd_retr(ctx: &mut DispatchCtx, arg: &str, writer: &mut impl Write) -> Result<Outcome> {
    let Some(user) = require_login(ctx, writer)? else { return Ok(Outcome::Continue) };
    let Some(data_plan) = ctx.pending_data_plan.take() else {
        reply::send(writer, 425, "Use PASV or PORT first.")?;
        return Ok(Outcome::Continue);
    };
    if arg.trim().is_empty() {
        reply::send(writer, 501, "Missing filename.")?;
        return Ok(Outcome::Continue);
    }
    let vp = vpath::normalize(&ctx.cwd, arg.trim());
    let config = ctx.config();
    let physical = vpath::to_physical(&config.runtime.data_dir, &vp);
    let section_cfg = config.section_for(&vp).cloned();
    let section = SectionCtx::from_config(section_cfg.as_ref());
    let rest_offset = std::mem::take(&mut ctx.rest_offset);

    let req = download::DownloadRequest {
        user: &user,
        users: ctx.services.users.as_ref(),
        slots: ctx.services.slots.as_ref(),
        section: &section,
        vpath: vp,
        physical,
        data_plan,
        data_type: ctx.data_type,
        rest_offset,
        protected_required: ctx.protected,
        data_channel_protected: ctx.protected,
        speed_cap: user.max_down_speed as f64,
        speed_floor: config.transfer.min_speed,
        speed_grace: Duration::from_secs(config.transfer.min_speed_grace_secs),
        hooks: &config.hooks,
        global_max_down: config.transfer.max_sim_down_global,
    };
    let handle = ctx.handle.clone();
    download::run(req, writer, &|| handle.is_interrupted())?;
    Ok(Outcome::Continue)
}

/// `LIST`/`NLST` share `STOR`/`RETR`'s data-channel setup but touch
/// neither credits nor CRC (SPEC_FULL §4.3 "NEW — LIST/NLST/MDTM/SIZE").
fn cmd_list(ctx: &mut DispatchCtx, arg: &str, writer: &mut impl Write, names_only: bool) -> Result<Outcome> {
    if require_login(ctx, writer)?.is_none() {
        return Ok(Outcome::Continue);
    }
    let Some(data_plan) = ctx.pending_data_plan.take() else {
        reply::send(writer, 425, "Use PASV or PORT first.")?;
        return Ok(Outcome::Continue);
    };
    let vp = vpath::normalize(&ctx.cwd, arg.trim());
    let config = ctx.config();
    let physical = vpath::to_physical(&config.runtime.data_dir, &vp);
    let entries = match std::fs::read_dir(&physical) {
        Ok(rd) => rd.filter_map(|e| e.ok()).collect::<Vec<_>>(),
        Err(_) => {
            reply::send(writer, 450, "Cannot list directory.")?;
            return Ok(Outcome::Continue);
        },
    };

    reply::send(writer, 150, "Opening data connection for directory listing.")?;
    let mut data = match data_plan.open() {
        Ok(d) => d,
        Err(_) => {
            reply::send(writer, 425, "Can't open data connection.")?;
            return Ok(Outcome::Continue);
        },
    };

    let mut body = String::new();
    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        if names_only {
            body.push_str(&name);
            body.push_str("\r\n");
        } else {
            let meta = entry.metadata().ok();
            let size = meta.as_ref().map(|m| m.len()).unwrap_or(0);
            let kind = if meta.as_ref().is_some_and(|m| m.is_dir()) { 'd' } else { '-' };
            body.push_str(&format!("{kind}rw-rw-rw-   1 ironftpd ironftpd {size:>12} Jan 01 00:00 {name}\r\n"));
        }
    }
    let _ = data.write_all(body.as_bytes());
    let _ = data.shutdown(std::net::Shutdown::Both);
    reply::send(writer, 226, "Transfer complete.")?;
    Ok(Outcome::Continue)
}

fn cmd_stat(ctx: &DispatchCtx, arg: &str, writer: &mut impl Write) -> Result<Outcome> {
    if !arg.trim().is_empty() {
        let vp = vpath::normalize(&ctx.cwd, arg.trim());
        let config = ctx.config();
        let physical = vpath::to_physical(&config.runtime.data_dir, &vp);
        match std::fs::metadata(&physical) {
            Ok(m) => reply::send(writer, 213, &format!("{} bytes", m.len()))?,
            Err(_) => reply::send(writer, 550, "No such file or directory.")?,
        }
        return Ok(Outcome::Continue);
    }
    let config = ctx.config();
    let user_line = match ctx.handle.user() {
        Some(u) => format!("Logged in as {}", u.name),
        None => "Not logged in".to_string(),
    };
    reply::send_multi(
        writer,
        211,
        &[format!("{} FTP server status:", config.runtime.program_fullname), user_line],
        "End of status.",
    )?;
    Ok(Outcome::Continue)
}

fn site_usage(writer: &mut impl Write, msg: &str) -> Result<Outcome> {
    reply::send(writer, 501, msg)?;
    Ok(Outcome::Continue)
}

fn cmd_site(ctx: &mut DispatchCtx, arg: &str, writer: &mut impl Write) -> Result<Outcome> {
    let Some(user) = require_login(ctx, writer)? else { return Ok(Outcome::Continue) };
    let trimmed = arg.trim();
    let (sub, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((s, r)) => (s.to_ascii_uppercase(), r.trim().to_string()),
        None => (trimmed.to_ascii_uppercase(), String::new()),
    };
    if sub.is_empty() {
        return site_usage(writer, "SITE requires a subcommand.");
    }
    let config = ctx.config();
    if !filter::allow_site_cmd(&user, &sub, &config.acl) {
        reply::send(writer, 550, "Permission denied.")?;
        return Ok(Outcome::Continue);
    }
    site_dispatch(ctx, &user, &sub, &rest, writer)
}

/// Administrative sub-verbs (spec.md §4.6), each gated by
/// `allow_site_cmd` in the caller. All mutate through `UserCache`/the
/// task queue — never the persistent store directly.
fn site_dispatch(
    ctx: &mut DispatchCtx,
    user: &UserSnapshot,
    sub: &str,
    rest: &str,
    writer: &mut impl Write,
) -> Result<Outcome> {
    let words: Vec<&str> = rest.split_whitespace().collect();
    match sub {
        "ADDUSER" => {
            let (Some(name), Some(pw)) = (words.first(), words.get(1)) else {
                return site_usage(writer, "Usage: SITE ADDUSER <name> <password> [flags]");
            };
            let flags = words.get(2).copied().unwrap_or("");
            match ctx.services.users.create(name, pw, flags, user.id) {
                Ok(_) => reply::send(writer, 200, &format!("User {name} added."))?,
                Err(e) => reply::send(writer, 550, &e.to_string())?,
            }
        },
        "DELUSER" => {
            let Some(name) = words.first() else {
                return site_usage(writer, "Usage: SITE DELUSER <name>");
            };
            match ctx.services.users.delete(name) {
                Ok(()) => reply::send(writer, 200, &format!("User {name} deleted."))?,
                Err(e) => reply::send(writer, 550, &e.to_string())?,
            }
        },
        "PURGE" => {
            let Some(name) = words.first() else {
                return site_usage(writer, "Usage: SITE PURGE <name>");
            };
            match ctx.services.users.purge(name) {
                Ok(()) => reply::send(writer, 200, &format!("User {name} purged."))?,
                Err(e) => reply::send(writer, 550, &e.to_string())?,
            }
        },
        "READD" => {
            let Some(name) = words.first() else {
                return site_usage(writer, "Usage: SITE READD <name>");
            };
            match ctx.services.users.readd(name) {
                Ok(_) => reply::send(writer, 200, &format!("User {name} restored."))?,
                Err(e) => reply::send(writer, 550, &e.to_string())?,
            }
        },
        "RENUSER" => {
            let (Some(old), Some(new)) = (words.first(), words.get(1)) else {
                return site_usage(writer, "Usage: SITE RENUSER <old> <new>");
            };
            match ctx.services.users.rename(old, new) {
                Ok(()) => reply::send(writer, 200, &format!("{old} renamed to {new}."))?,
                Err(e) => reply::send(writer, 550, &e.to_string())?,
            }
        },
        "PASSWD" => {
            let (Some(name), Some(pw)) = (words.first(), words.get(1)) else {
                return site_usage(writer, "Usage: SITE PASSWD <name> <password>");
            };
            match ctx.services.users.set_password(name, pw) {
                Ok(_) => reply::send(writer, 200, "Password changed.")?,
                Err(e) => reply::send(writer, 550, &e.to_string())?,
            }
        },
        "FLAGS" => {
            let (Some(name), Some(spec)) = (words.first(), words.get(1)) else {
                return site_usage(writer, "Usage: SITE FLAGS <name> <+flags|-flags|flags>");
            };
            let result = if let Some(add) = spec.strip_prefix('+') {
                ctx.services.users.add_flags(name, add)
            } else if let Some(del) = spec.strip_prefix('-') {
                ctx.services.users.del_flags(name, del)
            } else {
                ctx.services.users.set_flags(name, spec)
            };
            match result {
                Ok(snap) => reply::send(writer, 200, &format!("Flags now {}.", snap.flags))?,
                Err(e) => reply::send(writer, 550, &e.to_string())?,
            }
        },
        "CHGRP" => {
            let Some(name) = words.first() else {
                return site_usage(writer, "Usage: SITE CHGRP <name> <gid> [gid...]");
            };
            let gids: Vec<i32> = words[1..].iter().filter_map(|s| s.parse().ok()).collect();
            if let Err(e) = ctx.services.users.reset_gids(name) {
                reply::send(writer, 550, &e.to_string())?;
                return Ok(Outcome::Continue);
            }
            for gid in gids {
                let _ = ctx.services.users.add_gid(name, gid);
            }
            reply::send(writer, 200, &format!("Groups updated for {name}."))?;
        },
        "SETPGRP" => {
            let (Some(name), Some(gid_str)) = (words.first(), words.get(1)) else {
                return site_usage(writer, "Usage: SITE SETPGRP <name> <gid>");
            };
            let Ok(gid) = gid_str.parse::<i32>() else {
                return site_usage(writer, "Invalid gid.");
            };
            match ctx.services.users.set_primary_gid(name, gid) {
                Ok(old) => reply::send(writer, 200, &format!("Primary group changed (was {old})."))?,
                Err(e) => reply::send(writer, 550, &e.to_string())?,
            }
        },
        "ADDIP" => {
            let (Some(name), Some(mask)) = (words.first(), words.get(1)) else {
                return site_usage(writer, "Usage: SITE ADDIP <name> <mask>");
            };
            match ctx.services.users.add_ip_mask(name, mask) {
                Ok(redundant) if redundant.is_empty() => reply::send(writer, 200, &format!("IP mask {mask} added."))?,
                Ok(redundant) => {
                    reply::send(writer, 200, &format!("IP mask {mask} added; replaced {}.", redundant.join(", ")))?
                },
                Err(e) => reply::send(writer, 550, &e.to_string())?,
            }
        },
        "DELIP" => {
            let (Some(name), Some(idx_str)) = (words.first(), words.get(1)) else {
                return site_usage(writer, "Usage: SITE DELIP <name> <index>");
            };
            let Ok(idx) = idx_str.parse::<usize>() else {
                return site_usage(writer, "Invalid index.");
            };
            match ctx.services.users.del_ip_mask(name, idx) {
                Ok(removed) => reply::send(writer, 200, &format!("Removed {removed}."))?,
                Err(e) => reply::send(writer, 550, &e.to_string())?,
            }
        },
        "TAGLINE" => {
            let Some(name) = words.first() else {
                return site_usage(writer, "Usage: SITE TAGLINE <name> <text>");
            };
            let tagline = words[1..].join(" ");
            match ctx.services.users.set_tagline(name, &tagline) {
                Ok(_) => reply::send(writer, 200, "Tagline updated.")?,
                Err(e) => reply::send(writer, 550, &e.to_string())?,
            }
        },
        "GIVE" => {
            let (Some(name), Some(kb_str)) = (words.first(), words.get(1)) else {
                return site_usage(writer, "Usage: SITE GIVE <name> <kb>");
            };
            let Ok(kb) = kb_str.parse::<i64>() else {
                return site_usage(writer, "Invalid amount.");
            };
            match ctx.services.users.incr_credits(name, "", kb) {
                Ok(snap) => reply::send(writer, 200, &format!("Credits now {}.", snap.credit_string("")))?,
                Err(e) => reply::send(writer, 550, &e.to_string())?,
            }
        },
        "TAKE" => {
            let (Some(name), Some(kb_str)) = (words.first(), words.get(1)) else {
                return site_usage(writer, "Usage: SITE TAKE <name> <kb>");
            };
            let Ok(kb) = kb_str.parse::<i64>() else {
                return site_usage(writer, "Invalid amount.");
            };
            match ctx.services.users.decr_credits(name, "", kb, true) {
                Ok(snap) => reply::send(writer, 200, &format!("Credits now {}.", snap.credit_string("")))?,
                Err(e) => reply::send(writer, 550, &e.to_string())?,
            }
        },
        "KICK" => {
            let Some(name) = words.first() else {
                return site_usage(writer, "Usage: SITE KICK <name>");
            };
            match ctx.services.users.name_to_uid(name) {
                Some(uid) => {
                    let count = task::kick_user(&ctx.services.tasks, uid, false);
                    reply::send(writer, 200, &format!("Kicked {count} session(s) for {name}."))?;
                },
                None => reply::send(writer, 550, "No such user.")?,
            }
        },
        "USERS" => {
            let uids = task::get_online_users(&ctx.services.tasks);
            let names: Vec<String> =
                uids.iter().map(|&id| ctx.services.users.uid_to_name(id).unwrap_or_else(|| id.to_string())).collect();
            let (logged_in, total) = task::online_user_count(&ctx.services.tasks);
            reply::send_multi(writer, 211, &names, &format!("{logged_in} of {total} sessions online."))?;
        },
        "RELOAD" => {
            let (tx, rx) = mpsc::channel();
            ctx.services.tasks.push(task::Task::ReloadConfig { path: ctx.services.config_path.clone(), reply: tx });
            match rx.recv_timeout(Duration::from_secs(5)) {
                Ok(Ok((_, outcome))) => reply::send(writer, 200, &format!("Configuration reloaded ({outcome:?})."))?,
                Ok(Err(e)) => reply::send(writer, 550, &format!("Reload failed: {e}"))?,
                Err(_) => reply::send(writer, 550, "Reload timed out.")?,
            }
        },
        "SHUTDOWN" => {
            ctx.services.tasks.push(task::Task::Exit);
            reply::send(writer, 200, "Server shutting down.")?;
        },
        _ => reply::send(writer, 500, "Unknown SITE command.")?,
    }
    Ok(Outcome::Continue)
}
