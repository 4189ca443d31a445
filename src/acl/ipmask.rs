// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2026 ironftpd contributors

//! `ident@host` IP masks (GLOSSARY "IP mask") and their evaluation rules
//! (spec.md §4.4 "IP-mask semantics").

use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// One `ident@host` mask, parsed into its two matchable halves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IpMask {
    raw: String,
    ident: String,
    host: HostPattern,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum HostPattern {
    /// A literal/glob host string (`192.168.1.*`, `*`).
    Glob(String),
    /// An IPv4 CIDR network (`192.168.1.0/24`).
    Cidr { network: Ipv4Addr, prefix: u8 },
}

impl IpMask {
    /// Parses a mask of the form `ident@host`. The `@` is mandatory.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let (ident, host) = raw
            .split_once('@')
            .ok_or_else(|| Error::Validation(format!("IP mask '{raw}' missing '@'")))?;
        if ident.is_empty() || host.is_empty() {
            return Err(Error::Validation(format!(
                "IP mask '{raw}' must have non-empty ident and host"
            )));
        }
        Ok(Self { raw: raw.to_string(), ident: ident.to_string(), host: parse_host(host) })
    }

    /// The original, unparsed mask string.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True if `ident@ip` is allowed by this mask (spec.md: `*@host`
    /// allows any ident; `ident@*` requires ident match and any IP).
    pub fn matches(&self, ident: &str, ip: IpAddr) -> bool {
        let ident_ok = self.ident == "*" || crate::util::wildcard::wildcard_match(&self.ident, ident);
        if !ident_ok {
            return false;
        }
        match &self.host {
            HostPattern::Glob(pat) => {
                pat == "*" || crate::util::wildcard::wildcard_match(pat, &ip.to_string())
            },
            HostPattern::Cidr { network, prefix } => match ip {
                IpAddr::V4(v4) => cidr_contains(*network, *prefix, v4),
                IpAddr::V6(_) => false,
            },
        }
    }

    /// True if `other` becomes redundant once `self` is also present,
    /// i.e. every connection `other` would allow, `self` also allows,
    /// and the two masks are not textually identical.
    pub fn subsumes(&self, other: &IpMask) -> bool {
        if self.raw == other.raw {
            return false;
        }
        let ident_subsumed = self.ident == "*" || self.ident == other.ident;
        if !ident_subsumed {
            return false;
        }
        match (&self.host, &other.host) {
            (HostPattern::Glob(p), HostPattern::Glob(o)) => {
                p == "*" || (p == o) || crate::util::wildcard::wildcard_match(p, o)
            },
            (HostPattern::Cidr { network, prefix }, HostPattern::Glob(o)) => {
                o.parse::<Ipv4Addr>().is_ok_and(|ip| cidr_contains(*network, *prefix, ip))
            },
            (HostPattern::Cidr { network: n1, prefix: p1 }, HostPattern::Cidr { network: n2, prefix: p2 }) => {
                p1 <= p2 && cidr_contains(*n1, *p1, *n2)
            },
            (HostPattern::Glob(_), HostPattern::Cidr { .. }) => false,
        }
    }
}

impl TryFrom<String> for IpMask {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Error> {
        IpMask::parse(&s)
    }
}

impl From<IpMask> for String {
    fn from(m: IpMask) -> String {
        m.raw
    }
}

fn parse_host(host: &str) -> HostPattern {
    if let Some((net, prefix)) = host.split_once('/') {
        if let (Ok(net), Ok(prefix)) = (net.parse::<Ipv4Addr>(), prefix.parse::<u8>()) {
            if prefix <= 32 {
                return HostPattern::Cidr { network: net, prefix };
            }
        }
    }
    HostPattern::Glob(host.to_string())
}

fn cidr_contains(network: Ipv4Addr, prefix: u8, ip: Ipv4Addr) -> bool {
    let mask = if prefix == 0 { 0u32 } else { u32::MAX << (32 - prefix as u32) };
    u32::from(network) & mask == u32::from(ip) & mask
}
