use ipnet::Ipv4Net;
use std::net::Ipv4Addr;

/// One interface of a simulated IPv4 stack.
#[derive(Debug, Clone)]
pub struct NetworkInterface {
    pub name: String,
    /// Local addresses with their prefix length.
    pub addresses: Vec<Ipv4Net>,
    pub up: bool,
    pub forwarding: bool,
}

impl NetworkInterface {
    pub fn new(name: impl Into<String>, address: Ipv4Net) -> Self {
        Self {
            name: name.into(),
            addresses: vec![address],
            up: true,
            forwarding: true,
        }
    }

    pub fn loopback() -> Self {
        Self {
            name: "lo".to_string(),
            addresses: vec![Ipv4Net::new_assert(Ipv4Addr::LOCALHOST, 8)],
            up: true,
            // no forwarding to or from loopback
            forwarding: false,
        }
    }

    pub fn enable(&mut self) {
        self.up = true;
    }

    pub fn disable(&mut self) {
        self.up = false;
    }

    pub fn set_forwarding(&mut self, forwarding: bool) {
        self.forwarding = forwarding;
    }

    pub fn is_loopback(&self) -> bool {
        self.addresses.iter().any(|a| a.addr().is_loopback())
    }

    pub fn has_address(&self, address: Ipv4Addr) -> bool {
        self.addresses.iter().any(|a| a.addr() == address)
    }

    /// Address used as source for packets leaving this interface.
    pub fn primary_address(&self) -> Option<Ipv4Addr> {
        self.addresses.first().map(|a| a.addr())
    }
}
