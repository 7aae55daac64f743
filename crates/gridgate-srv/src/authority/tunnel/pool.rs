//! Deterministic IPv6 allocation for tunnel clients.
//!
//! The `/64` prefix is `fd` followed by the first 7 bytes of
//! SHA-256(seed); a user's host part is the first 8 bytes of
//! SHA-256(seed || user). Nothing is persisted: the same seed and user
//! always give the same address.

use ring::digest::{Context, SHA256};
use std::fmt;
use std::net::Ipv6Addr;

/// An IPv6 address with a prefix length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv6Cidr {
    /// Address part
    pub addr: Ipv6Addr,
    /// Prefix length in bits
    pub prefix_len: u8,
}

impl fmt::Display for Ipv6Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

fn prefix(seed: &[u8]) -> [u8; 16] {
    let digest = ring::digest::digest(&SHA256, seed);
    let mut octets = [0u8; 16];
    octets[0] = 0xfd;
    octets[1..8].copy_from_slice(&digest.as_ref()[..7]);
    octets
}

/// Address of `user` in the pool keyed by `seed`
pub fn derive_address(seed: &[u8], user: &str) -> Ipv6Addr {
    let mut ctx = Context::new(&SHA256);
    ctx.update(seed);
    ctx.update(user.as_bytes());
    let digest = ctx.finish();

    let mut octets = prefix(seed);
    octets[8..].copy_from_slice(&digest.as_ref()[..8]);
    Ipv6Addr::from(octets)
}

/// Address pool bound to one seed
#[derive(Clone)]
pub struct AddressPool {
    seed: [u8; 32],
}

impl AddressPool {
    /// Pool for `seed`
    pub const fn new(seed: [u8; 32]) -> Self {
        Self { seed }
    }

    /// Address of `user`
    pub fn address(&self, user: &str) -> Ipv6Addr {
        derive_address(&self.seed, user)
    }

    /// The `/64` all addresses live in
    pub fn subnet(&self) -> Ipv6Cidr {
        Ipv6Cidr {
            addr: Ipv6Addr::from(prefix(&self.seed)),
            prefix_len: 64,
        }
    }

    /// Gateway address, `<prefix>::1/64`
    pub fn gateway(&self) -> Ipv6Cidr {
        let mut octets = prefix(&self.seed);
        octets[15] = 0x01;
        Ipv6Cidr {
            addr: Ipv6Addr::from(octets),
            prefix_len: 64,
        }
    }
}

impl fmt::Debug for AddressPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressPool")
            .field("subnet", &self.subnet())
            .finish_non_exhaustive()
    }
}
