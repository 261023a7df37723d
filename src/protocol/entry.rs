use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::InterfaceId;

/// Lifecycle state of a route entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Validity {
    Valid,
    Invalid,
    /// The local host route. Never transitions, never expires.
    LocalHost,
}

impl Validity {
    pub fn label(&self) -> &'static str {
        match self {
            Validity::Valid => "VALID",
            Validity::Invalid => "INVALID",
            Validity::LocalHost => "Loc. Host",
        }
    }
}

/// Timeout and garbage-collection delays a route is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteLifetime {
    pub timeout: Duration,
    pub garbage_collection: Duration,
}

impl RouteLifetime {
    /// Never expires; stays valid until a bulk trigger invalidates it.
    pub const PERMANENT: RouteLifetime = RouteLifetime {
        timeout: Duration::ZERO,
        garbage_collection: Duration::ZERO,
    };

    pub fn new(timeout: Duration, garbage_collection: Duration) -> Self {
        Self { timeout, garbage_collection }
    }

    pub fn is_permanent(&self) -> bool {
        self.timeout.is_zero() && self.garbage_collection.is_zero()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub destination: Ipv4Net,
    pub gateway: Option<Ipv4Addr>,
    pub interface: InterfaceId,
    pub sequence_number: u16,
    pub metric: u16,
    pub validity: Validity,
    pub changed: bool,
}

impl RouteEntry {
    /// Route to a single host. The loopback address becomes the local host route.
    pub fn host(host: Ipv4Addr, interface: InterfaceId, metric: u16, sequence_number: u16) -> Self {
        let destination = Ipv4Net::from(host);

        if host == Ipv4Addr::LOCALHOST {
            return Self {
                destination,
                gateway: None,
                interface,
                sequence_number: 0,
                metric: 0,
                validity: Validity::LocalHost,
                changed: false,
            };
        }

        Self::valid(destination, None, interface, metric, sequence_number)
    }

    /// Directly connected network, no gateway.
    pub fn network(network: Ipv4Net, interface: InterfaceId, metric: u16, sequence_number: u16) -> Self {
        Self::valid(network.trunc(), None, interface, metric, sequence_number)
    }

    /// Network reached through `gateway`.
    pub fn via(
        network: Ipv4Net,
        gateway: Ipv4Addr,
        interface: InterfaceId,
        metric: u16,
        sequence_number: u16,
    ) -> Self {
        Self::valid(network.trunc(), Some(gateway), interface, metric, sequence_number)
    }

    fn valid(
        destination: Ipv4Net,
        gateway: Option<Ipv4Addr>,
        interface: InterfaceId,
        metric: u16,
        sequence_number: u16,
    ) -> Self {
        Self {
            destination,
            gateway,
            interface,
            sequence_number,
            metric,
            validity: Validity::Valid,
            changed: true,
        }
    }

    pub fn is_default(&self) -> bool {
        self.destination.prefix_len() == 0 && self.destination.network().is_unspecified()
    }

    /// Odd sequence numbers mark a broken route.
    pub fn is_poisoned(&self) -> bool {
        self.sequence_number % 2 == 1
    }

    pub fn matches(&self, address: Ipv4Addr) -> bool {
        self.destination.contains(&address)
    }

    /// Valid -> Invalid. Returns false when the entry was not valid.
    pub fn invalidate(&mut self) -> bool {
        if self.validity != Validity::Valid {
            return false;
        }
        self.validity = Validity::Invalid;
        self.changed = true;
        true
    }
}

impl fmt::Display for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.gateway {
            Some(gw) => write!(f, "{} via {} dev {}", self.destination, gw, self.interface)?,
            None => write!(f, "{} direct dev {}", self.destination, self.interface)?,
        }
        write!(f, ", metric={}", self.metric)
    }
}
