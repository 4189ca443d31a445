// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2026 ironftpd contributors

//! Data-connection establishment (`PASV`/`PORT` and their extended
//! forms). Opening is deferred until the transfer engine's step 7
//! (spec.md §4.3): "Reply `150`; open the data channel."

use std::net::{SocketAddr, TcpListener, TcpStream};

use crate::error::Error;

/// A pending data-connection plan, set up by `PASV`/`PORT` and
/// consumed by exactly one subsequent transfer or listing command.
pub enum DataChannelPlan {
    /// We are listening; the peer will connect to us.
    Passive(TcpListener),
    /// The peer is listening; we connect to them.
    Active(SocketAddr),
}

impl DataChannelPlan {
    pub fn passive(bind_ip: std::net::IpAddr) -> Result<(Self, SocketAddr), Error> {
        let listener = TcpListener::bind((bind_ip, 0))?;
        let addr = listener.local_addr()?;
        Ok((DataChannelPlan::Passive(listener), addr))
    }

    pub fn active(addr: SocketAddr) -> Self {
        DataChannelPlan::Active(addr)
    }

    /// Opens the data connection (spec.md §4.3 step 7). On failure the
    /// caller replies `425` and deletes any newly created sink file.
    pub fn open(&self) -> Result<TcpStream, Error> {
        match self {
            DataChannelPlan::Passive(listener) => {
                let (stream, _) = listener.accept()?;
                Ok(stream)
            },
            DataChannelPlan::Active(addr) => TcpStream::connect(addr).map_err(Error::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use super::*;

    #[test]
    fn passive_accepts_a_real_connection() {
        let (plan, addr) = DataChannelPlan::passive("127.0.0.1".parse().unwrap()).unwrap();
        let client_thread = std::thread::spawn(move || {
            let mut client = TcpStream::connect(addr).unwrap();
            client.write_all(b"hello").unwrap();
        });
        let mut server_side = plan.open().unwrap();
        let mut buf = [0u8; 5];
        server_side.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        client_thread.join().unwrap();
    }
}
