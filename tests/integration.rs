// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2026 ironftpd contributors

//! End-to-end tests driving the real control protocol over a live
//! [`ironftpd::server::Listener`]: login, `PASV`/`STOR`/`RETR` against
//! real files on disk, and an administrative `SITE KICK` round trip.

use std::{
    io::{BufRead, BufReader, Read, Write},
    net::{SocketAddr, TcpStream},
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};

use ironftpd::{
    acl::{GroupCache, UserCache},
    cfg::config::{
        AclRule, Config, HooksConfig, ListenConfig, RuntimeConfig, TransferConfig, UserDefaults,
    },
    db::{InMemoryStore, StoreProxy},
    server::{
        Listener,
        session::{SessionRegistry, SessionServices},
        slots::SlotTracker,
        task,
    },
};
use tempfile::tempdir;

fn test_config(data_dir: &std::path::Path) -> Config {
    Config {
        listen: ListenConfig { ips: vec!["127.0.0.1".parse().unwrap()], port: 0, tls_cert: None, tls_key: None },
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
        acl: vec![AclRule { keyword: "*".into(), allow: true, expr: "*".into() }],
        transfer: TransferConfig {
            calc_crc: vec![],
            ascii_globs: vec![],
            min_speed: 0.0,
            min_speed_grace_secs: 10,
            crc_background: false,
            max_sim_up_global: -1,
            max_sim_down_global: -1,
        },
        runtime: RuntimeConfig {
            data_dir: data_dir.to_string_lossy().into_owned(),
            program_fullname: "ironftpd".into(),
            max_sessions: 0,
        },
        hooks: HooksConfig::default(),
    }
}

struct Harness {
    listener: Arc<Listener>,
    addr: SocketAddr,
    users: Arc<UserCache>,
}

impl Harness {
    fn start(config: Config) -> Self {
        let store = Arc::new(StoreProxy::new(Arc::new(InMemoryStore::default())));
        let users = Arc::new(UserCache::new(store.clone()));
        let groups = Arc::new(GroupCache::new(store));
        let registry = Arc::new(SessionRegistry::new());
        let services = Arc::new(SessionServices {
            users: users.clone(),
            groups,
            config: Arc::new(StdMutex::new(Arc::new(config.clone()))),
            config_path: "unused.yaml".into(),
            tasks: Arc::new(task::TaskQueue::new()),
            slots: Arc::new(SlotTracker::default()),
            owners: Arc::new(Default::default()),
        });

        let listener = Arc::new(Listener::initialise(&config, registry, services).unwrap());
        let addr = listener.local_addrs()[0];
        listener.start();
        std::thread::sleep(Duration::from_millis(50));

        Self { listener, addr, users }
    }

    fn connect(&self) -> Client {
        let stream = TcpStream::connect(self.addr).unwrap();
        let mut client = Client { reader: BufReader::new(stream.try_clone().unwrap()), writer: stream };
        let greeting = client.read_reply();
        assert!(greeting.starts_with("220"), "unexpected greeting: {greeting}");
        client
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.listener.set_shutdown();
        self.listener.join();
    }
}

struct Client {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Client {
    fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).unwrap();
        self.writer.write_all(b"\r\n").unwrap();
    }

    /// Reads one reply, following `NNN-` continuation lines through to
    /// the terminating `NNN ` line (spec.md §6 reply grammar). Returns
    /// every line joined, so callers can assert on continuation-line
    /// content (e.g. a dupe message's uploader name) as well as the code.
    fn read_reply(&mut self) -> String {
        let mut first = String::new();
        self.reader.read_line(&mut first).unwrap();
        let code = first.get(0..3).unwrap_or("").to_string();
        let mut full = first.trim_end().to_string();
        if first.as_bytes().get(3) == Some(&b'-') {
            loop {
                let mut line = String::new();
                self.reader.read_line(&mut line).unwrap();
                full.push('\n');
                full.push_str(line.trim_end());
                if line.starts_with(&code) && line.as_bytes().get(3) == Some(&b' ') {
                    break;
                }
            }
        }
        full
    }

    fn login(&mut self, user: &str, pass: &str) -> String {
        self.send(&format!("USER {user}"));
        let r = self.read_reply();
        assert!(r.starts_with("331"), "unexpected USER reply: {r}");
        self.send(&format!("PASS {pass}"));
        self.read_reply()
    }

    /// Issues `PASV`, connects a second socket to the reported port, and
    /// hands both back so the caller can drive a transfer.
    fn enter_pasv(&mut self) -> TcpStream {
        self.send("PASV");
        let reply = self.read_reply();
        assert!(reply.starts_with("227"), "unexpected PASV reply: {reply}");
        let open = reply.find('(').unwrap();
        let close = reply.find(')').unwrap();
        let fields: Vec<u16> = reply[open + 1..close].split(',').map(|f| f.parse().unwrap()).collect();
        let ip = format!("{}.{}.{}.{}", fields[0], fields[1], fields[2], fields[3]);
        let port = (fields[4] << 8) | fields[5];
        TcpStream::connect((ip.as_str(), port)).unwrap()
    }
}

#[test]
fn login_rejects_unknown_user_then_accepts_valid_credentials() {
    let dir = tempdir().unwrap();
    std::fs::create_dir_all(dir.path()).unwrap();
    let harness = Harness::start(test_config(dir.path()));
    harness.users.create("alice", "s3cret", "", -1).unwrap();

    let mut client = harness.connect();
    let reply = client.login("alice", "wrong-password");
    assert!(reply.starts_with("530"), "expected login failure, got {reply}");

    let reply = client.login("alice", "s3cret");
    assert!(reply.starts_with("230"), "expected login success, got {reply}");
}

#[test]
fn stor_then_retr_round_trips_file_contents() {
    let dir = tempdir().unwrap();
    std::fs::create_dir_all(dir.path()).unwrap();
    let harness = Harness::start(test_config(dir.path()));
    harness.users.create("bob", "hunter2", "", -1).unwrap();
    // Leech ratio so the RETR below doesn't need a prior credit balance.
    let before = harness.users.user_by_name("bob").unwrap();
    let _ = before;

    let mut client = harness.connect();
    let reply = client.login("bob", "hunter2");
    assert!(reply.starts_with("230"), "login failed: {reply}");

    let payload = vec![0xABu8; 64 * 1024];

    let data = client.enter_pasv();
    client.send("TYPE I");
    assert!(client.read_reply().starts_with("200"));
    client.send("STOR upload.bin");
    assert!(client.read_reply().starts_with("150"), "expected 150 before upload");
    let mut data = data;
    data.write_all(&payload).unwrap();
    data.shutdown(std::net::Shutdown::Write).unwrap();
    drop(data);
    let reply = client.read_reply();
    assert!(reply.starts_with("226"), "expected upload success, got {reply}");

    let on_disk = std::fs::read(dir.path().join("upload.bin")).unwrap();
    assert_eq!(on_disk, payload);

    // Ratio 3 by default; uploading 64 kB credits ceil(64/3) >= enough
    // credit-kB to retrieve the same file back under ratio 3.
    let after_upload = harness.users.user_by_name("bob").unwrap();
    assert!(after_upload.credits.get("").copied().unwrap_or(0) > 0, "upload should have credited the user");

    let data = client.enter_pasv();
    client.send("RETR upload.bin");
    assert!(client.read_reply().starts_with("150"), "expected 150 before download");
    let mut received = Vec::new();
    let mut data = data;
    data.read_to_end(&mut received).unwrap();
    let reply = client.read_reply();
    assert!(reply.starts_with("226"), "expected download success, got {reply}");
    assert_eq!(received, payload);

    client.send("QUIT");
    assert!(client.read_reply().starts_with("221"));
}

#[test]
fn stor_duplicate_path_is_refused_with_dupe_message() {
    let dir = tempdir().unwrap();
    std::fs::create_dir_all(dir.path()).unwrap();
    let harness = Harness::start(test_config(dir.path()));
    harness.users.create("carol", "pw", "", -1).unwrap();

    let mut client = harness.connect();
    assert!(client.login("carol", "pw").starts_with("230"));

    let data = client.enter_pasv();
    client.send("STOR dupe.bin");
    assert!(client.read_reply().starts_with("150"));
    let mut data = data;
    data.write_all(b"first upload").unwrap();
    drop(data);
    assert!(client.read_reply().starts_with("226"));

    // Second STOR of the same path with REST=0 must hit the dupe path.
    let data = client.enter_pasv();
    client.send("STOR dupe.bin");
    let _ = data;
    let reply = client.read_reply();
    assert!(reply.starts_with("553"), "expected dupe rejection, got {reply}");
    assert!(reply.contains("carol"), "expected dupe message to name the first uploader, got {reply}");
}

#[test]
fn site_kick_interrupts_the_targets_session() {
    let dir = tempdir().unwrap();
    std::fs::create_dir_all(dir.path()).unwrap();
    let harness = Harness::start(test_config(dir.path()));
    harness.users.create("dave", "pw", "", -1).unwrap();
    harness.users.create("erin", "pw", "", -1).unwrap();

    let mut target = harness.connect();
    assert!(target.login("dave", "pw").starts_with("230"));

    let mut admin = harness.connect();
    assert!(admin.login("erin", "pw").starts_with("230"));

    admin.send("SITE KICK dave");
    let reply = admin.read_reply();
    assert!(reply.starts_with("200"), "expected kick acknowledgement, got {reply}");
    assert!(reply.contains('1'), "expected exactly dave's session kicked: {reply}");

    // The kicked session's control socket is force-closed; the next
    // read returns EOF rather than a reply.
    let mut buf = [0u8; 1];
    let n = std::io::Read::read(&mut target.reader, &mut buf).unwrap();
    assert_eq!(n, 0, "kicked session's control socket should be closed");
}

#[test]
fn unknown_command_gets_500() {
    let dir = tempdir().unwrap();
    std::fs::create_dir_all(dir.path()).unwrap();
    let harness = Harness::start(test_config(dir.path()));

    let mut client = harness.connect();
    client.send("BOGUSVERB");
    let reply = client.read_reply();
    assert!(reply.starts_with("500"), "expected 500 for unknown verb, got {reply}");
}

#[test]
fn commands_before_login_are_rejected() {
    let dir = tempdir().unwrap();
    std::fs::create_dir_all(dir.path()).unwrap();
    let harness = Harness::start(test_config(dir.path()));

    let mut client = harness.connect();
    client.send("PWD");
    let reply = client.read_reply();
    assert!(reply.starts_with("530"), "expected 530 before login, got {reply}");
}
