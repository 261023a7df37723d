use ipnet::Ipv4Net;
use std::net::Ipv4Addr;

use super::interface::NetworkInterface;
use crate::error::{RoutingError, RoutingResult};
use crate::protocol::PioRoutingProtocol;
use crate::{InterfaceId, NodeId};

/// The IPv4 layer of one simulated node. Interface 0 is always loopback.
#[derive(Debug, Clone)]
pub struct Ipv4Stack {
    node: NodeId,
    interfaces: Vec<NetworkInterface>,
}

impl Ipv4Stack {
    pub fn new(node: NodeId) -> Self {
        Self {
            node,
            interfaces: vec![NetworkInterface::loopback()],
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn add_interface(&mut self, interface: NetworkInterface) -> InterfaceId {
        self.interfaces.push(interface);
        (self.interfaces.len() - 1) as InterfaceId
    }

    pub fn interface(&self, id: InterfaceId) -> Option<&NetworkInterface> {
        self.interfaces.get(id as usize)
    }

    pub fn interface_mut(&mut self, id: InterfaceId) -> RoutingResult<&mut NetworkInterface> {
        self.interfaces
            .get_mut(id as usize)
            .ok_or(RoutingError::UnknownInterface(id))
    }

    pub fn interfaces(&self) -> impl Iterator<Item = (InterfaceId, &NetworkInterface)> {
        self.interfaces
            .iter()
            .enumerate()
            .map(|(i, iface)| (i as InterfaceId, iface))
    }

    pub fn interface_count(&self) -> usize {
        self.interfaces.len()
    }

    pub fn is_up(&self, id: InterfaceId) -> bool {
        self.interface(id).map(|i| i.up).unwrap_or(false)
    }

    pub fn is_forwarding(&self, id: InterfaceId) -> bool {
        self.interface(id).map(|i| i.forwarding).unwrap_or(false)
    }

    /// Interface owning `address`, searching every interface.
    pub fn interface_for_address(&self, address: Ipv4Addr) -> Option<InterfaceId> {
        self.interfaces()
            .find(|(_, iface)| iface.has_address(address))
            .map(|(id, _)| id)
    }

    pub fn source_address(&self, id: InterfaceId) -> Option<Ipv4Addr> {
        self.interface(id).and_then(|i| i.primary_address())
    }

    pub fn add_address(&mut self, id: InterfaceId, address: Ipv4Net) -> RoutingResult<()> {
        self.interface_mut(id)?.addresses.push(address);
        Ok(())
    }

    pub fn remove_address(&mut self, id: InterfaceId, address: Ipv4Net) -> RoutingResult<bool> {
        let iface = self.interface_mut(id)?;
        let before = iface.addresses.len();
        iface.addresses.retain(|a| *a != address);
        Ok(iface.addresses.len() != before)
    }
}

/// Routing protocols a stack can carry. The set is closed, so finding the PIO
/// instance is a match instead of a downcast.
#[derive(Debug)]
pub enum InstalledRouting {
    Pio(Box<PioRoutingProtocol>),
    /// Protocols consulted in priority order, highest first.
    List(Vec<(i16, InstalledRouting)>),
}

impl InstalledRouting {
    pub fn list(mut protocols: Vec<(i16, InstalledRouting)>) -> Self {
        protocols.sort_by(|a, b| b.0.cmp(&a.0));
        InstalledRouting::List(protocols)
    }

    pub fn pio(&self) -> Option<&PioRoutingProtocol> {
        match self {
            InstalledRouting::Pio(pio) => Some(pio.as_ref()),
            InstalledRouting::List(list) => list.iter().find_map(|(_, proto)| proto.pio()),
        }
    }

    pub fn pio_mut(&mut self) -> Option<&mut PioRoutingProtocol> {
        match self {
            InstalledRouting::Pio(pio) => Some(pio.as_mut()),
            InstalledRouting::List(list) => list.iter_mut().find_map(|(_, proto)| proto.pio_mut()),
        }
    }
}
