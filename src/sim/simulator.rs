use ipnet::Ipv4Net;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::net::Ipv4Addr;
use std::time::Duration;

use super::scheduler::{EventId, Scheduler, SimTime, TimerQueue};
use crate::error::{RoutingError, RoutingResult};
use crate::network::{InstalledRouting, Ipv4Stack, NetworkInterface};
use crate::protocol::{InputCallbacks, Ipv4Header, PioRoutingProtocol, ProtocolTimer, Route};
use crate::{InterfaceId, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEventKind {
    Protocol(ProtocolTimer),
    /// Dump the node's routing table, then again every `interval`.
    PrintTable { interval: Duration },
}

/// An event on the shared timeline, addressed to one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeEvent {
    pub node: NodeId,
    pub kind: NodeEventKind,
}

#[derive(Debug)]
pub struct Node {
    pub stack: Ipv4Stack,
    pub routing: Option<InstalledRouting>,
}

impl Node {
    pub fn pio(&self) -> Option<&PioRoutingProtocol> {
        self.routing.as_ref().and_then(|r| r.pio())
    }

    pub fn pio_mut(&mut self) -> Option<&mut PioRoutingProtocol> {
        self.routing.as_mut().and_then(|r| r.pio_mut())
    }
}

/// The timeline as seen by one node's protocol: everything it schedules is
/// tagged with the node so it comes back to the same instance.
pub struct NodeTimers<'a> {
    node: NodeId,
    scheduler: &'a mut Scheduler<NodeEvent>,
}

impl<'a> NodeTimers<'a> {
    pub fn new(node: NodeId, scheduler: &'a mut Scheduler<NodeEvent>) -> Self {
        Self { node, scheduler }
    }
}

impl TimerQueue<ProtocolTimer> for NodeTimers<'_> {
    fn now(&self) -> SimTime {
        self.scheduler.now()
    }

    fn schedule(&mut self, delay: Duration, event: ProtocolTimer) -> EventId {
        self.scheduler.schedule(
            delay,
            NodeEvent {
                node: self.node,
                kind: NodeEventKind::Protocol(event),
            },
        )
    }

    fn cancel(&mut self, id: EventId) {
        self.scheduler.cancel(id);
    }

    fn is_pending(&self, id: EventId) -> bool {
        self.scheduler.is_pending(id)
    }

    fn delay_left(&self, id: EventId) -> Duration {
        self.scheduler.delay_left(id)
    }
}

/// Nodes plus the timeline they share. Single threaded; events run one at a
/// time in fire order.
#[derive(Debug, Default)]
pub struct Simulator {
    scheduler: Scheduler<NodeEvent>,
    nodes: BTreeMap<NodeId, Node>,
    next_node: NodeId,
    output: String,
}

impl Simulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> SimTime {
        self.scheduler.now()
    }

    pub fn add_node(&mut self) -> NodeId {
        let id = self.next_node;
        self.next_node += 1;
        self.nodes.insert(
            id,
            Node {
                stack: Ipv4Stack::new(id),
                routing: None,
            },
        );
        debug!("Node {} created", id);
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    fn node_mut(&mut self, id: NodeId) -> RoutingResult<&mut Node> {
        self.nodes.get_mut(&id).ok_or(RoutingError::UnknownNode(id))
    }

    pub fn stack(&self, id: NodeId) -> RoutingResult<&Ipv4Stack> {
        self.nodes
            .get(&id)
            .map(|node| &node.stack)
            .ok_or(RoutingError::UnknownNode(id))
    }

    /// Installs the routing protocol set of a node and attaches its PIO instance to the stack.
    pub fn install(&mut self, id: NodeId, mut routing: InstalledRouting) -> RoutingResult<()> {
        let node = self.node_mut(id)?;
        if let Some(pio) = node.pio() {
            return Err(RoutingError::AlreadyAttached(pio.node().unwrap_or(id)));
        }

        if let Some(pio) = routing.pio_mut() {
            pio.set_stack(Some(&node.stack))?;
        }
        node.routing = Some(routing);
        info!("Routing installed on node {}", id);
        Ok(())
    }

    /// Runs `f` against the node's PIO instance with a timer view bound to that node.
    pub fn with_pio<R>(
        &mut self,
        id: NodeId,
        f: impl FnOnce(&mut PioRoutingProtocol, &mut NodeTimers<'_>) -> R,
    ) -> RoutingResult<R> {
        let node = self.nodes.get_mut(&id).ok_or(RoutingError::UnknownNode(id))?;
        let pio = node.pio_mut().ok_or(RoutingError::ProtocolNotInstalled(id))?;
        let mut timers = NodeTimers::new(id, &mut self.scheduler);
        Ok(f(pio, &mut timers))
    }

    pub fn pio(&self, id: NodeId) -> RoutingResult<&PioRoutingProtocol> {
        let node = self.nodes.get(&id).ok_or(RoutingError::UnknownNode(id))?;
        node.pio().ok_or(RoutingError::ProtocolNotInstalled(id))
    }

    pub fn initialize(&mut self, id: NodeId) -> RoutingResult<()> {
        self.with_pio(id, |pio, timers| pio.initialize(timers))?
    }

    pub fn add_interface(&mut self, id: NodeId, interface: NetworkInterface) -> RoutingResult<InterfaceId> {
        let addresses = interface.addresses.clone();
        let up = interface.up;
        let node = self.node_mut(id)?;
        let iface = node.stack.add_interface(interface);

        if let Some(pio) = node.pio_mut() {
            for address in addresses {
                pio.notify_add_address(iface, address);
            }
            if up {
                pio.notify_interface_up(iface);
            } else {
                pio.notify_interface_down(iface);
            }
        }
        Ok(iface)
    }

    pub fn set_interface_up(&mut self, id: NodeId, interface: InterfaceId) -> RoutingResult<()> {
        let node = self.node_mut(id)?;
        node.stack.interface_mut(interface)?.enable();
        if let Some(pio) = node.pio_mut() {
            pio.notify_interface_up(interface);
        }
        Ok(())
    }

    pub fn set_interface_down(&mut self, id: NodeId, interface: InterfaceId) -> RoutingResult<()> {
        let node = self.node_mut(id)?;
        node.stack.interface_mut(interface)?.disable();
        if let Some(pio) = node.pio_mut() {
            pio.notify_interface_down(interface);
        }
        Ok(())
    }

    pub fn add_address(&mut self, id: NodeId, interface: InterfaceId, address: Ipv4Net) -> RoutingResult<()> {
        let node = self.node_mut(id)?;
        node.stack.add_address(interface, address)?;
        if let Some(pio) = node.pio_mut() {
            pio.notify_add_address(interface, address);
        }
        Ok(())
    }

    pub fn remove_address(&mut self, id: NodeId, interface: InterfaceId, address: Ipv4Net) -> RoutingResult<bool> {
        let node = self.node_mut(id)?;
        let removed = node.stack.remove_address(interface, address)?;
        if removed {
            if let Some(pio) = node.pio_mut() {
                pio.notify_remove_address(interface, address);
            }
        }
        Ok(removed)
    }

    pub fn route_output(&self, id: NodeId, destination: Ipv4Addr, oif: Option<InterfaceId>) -> RoutingResult<Route> {
        let node = self.nodes.get(&id).ok_or(RoutingError::UnknownNode(id))?;
        let pio = node.pio().ok_or(RoutingError::ProtocolNotInstalled(id))?;
        pio.route_output(&node.stack, destination, oif)
    }

    pub fn route_input(
        &self,
        id: NodeId,
        iif: InterfaceId,
        header: &Ipv4Header,
        callbacks: &mut impl InputCallbacks,
    ) -> RoutingResult<bool> {
        let node = self.nodes.get(&id).ok_or(RoutingError::UnknownNode(id))?;
        let pio = node.pio().ok_or(RoutingError::ProtocolNotInstalled(id))?;
        Ok(pio.route_input(&node.stack, iif, header, callbacks))
    }

    /// First table dump after `interval`, then every `interval`.
    pub fn schedule_table_print(&mut self, id: NodeId, interval: Duration) -> RoutingResult<()> {
        if !self.nodes.contains_key(&id) {
            return Err(RoutingError::UnknownNode(id));
        }
        if interval.is_zero() {
            return Err(RoutingError::InvalidConfig("table print interval must be positive".into()));
        }
        self.scheduler.schedule(
            interval,
            NodeEvent {
                node: id,
                kind: NodeEventKind::PrintTable { interval },
            },
        );
        Ok(())
    }

    /// Writes the node's table to the output buffer.
    pub fn print_routing_table(&mut self, id: NodeId) -> RoutingResult<()> {
        let node = self.nodes.get(&id).ok_or(RoutingError::UnknownNode(id))?;
        let pio = node.pio().ok_or(RoutingError::ProtocolNotInstalled(id))?;
        let timers = NodeTimers::new(id, &mut self.scheduler);

        if pio.print_routing_table(&mut self.output, &timers).is_err() {
            warn!("Failed to print routing table of node {}", id);
        }
        Ok(())
    }

    /// Drains everything printed so far.
    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    /// Fires every event due up to `stop`, then moves the clock to `stop`.
    pub fn run_until(&mut self, stop: SimTime) {
        while let Some((_, event)) = self.scheduler.pop_due(stop) {
            self.dispatch(event);
        }
        self.scheduler.advance_to(stop);
    }

    fn dispatch(&mut self, event: NodeEvent) {
        match event.kind {
            NodeEventKind::Protocol(timer) => {
                if self
                    .with_pio(event.node, |pio, timers| pio.handle_timer(timers, timer))
                    .is_err()
                {
                    warn!("Dropping {:?} for node {} without PIO", timer, event.node);
                }
            }
            NodeEventKind::PrintTable { interval } => {
                if let Err(e) = self.print_routing_table(event.node) {
                    warn!("Cannot print table of node {}: {}", event.node, e);
                    return;
                }
                let _ = writeln!(self.output);
                self.scheduler.schedule(interval, event);
            }
        }
    }

    /// Removes a node, tearing its protocol down first.
    pub fn remove_node(&mut self, id: NodeId) -> RoutingResult<Node> {
        if self.nodes.get(&id).and_then(|node| node.pio()).is_some() {
            self.with_pio(id, |pio, timers| pio.dispose(timers))?;
        }
        self.nodes.remove(&id).ok_or(RoutingError::UnknownNode(id))
    }
}
