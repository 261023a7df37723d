pub mod entry;
pub mod invalidation;
pub mod lookup;
pub mod routing_table;
pub mod updates;

pub use entry::{RouteEntry, RouteLifetime, Validity};
pub use lookup::{InputCallbacks, Ipv4Header, Route};
pub use routing_table::{RouteId, RouteRecord, RoutingTable};
pub use updates::{AdvertisedRoute, Advertisement, INFINITE_METRIC, OUTBOX_CAPACITY, UpdateKind};

use ipnet::Ipv4Net;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::config::{PrintingOption, ProtocolConfig};
use crate::error::{RoutingError, RoutingResult};
use crate::network::Ipv4Stack;
use crate::sim::{EventId, TimerQueue};
use crate::{InterfaceId, NodeId};

/// Upper bound of the random delay added to every route timeout, so routes
/// learned together do not expire together.
pub const ROUTE_TIMEOUT_JITTER: Duration = Duration::from_secs(5);

/// Callbacks the protocol schedules on the shared timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolTimer {
    Invalidate(RouteId),
    Delete(RouteId),
    PeriodicUpdate,
    TriggeredUpdate,
}

#[derive(Debug, Clone, Default)]
struct InterfaceState {
    up: bool,
    addresses: Vec<Ipv4Net>,
}

impl InterfaceState {
    fn is_loopback(&self) -> bool {
        self.addresses.iter().any(|a| a.addr().is_loopback())
    }
}

/// One PIO instance. Owns the route table of a single node.
#[derive(Debug)]
pub struct PioRoutingProtocol {
    config: ProtocolConfig,
    table: RoutingTable,
    node: Option<NodeId>,
    initialized: bool,
    rng: StdRng,
    interfaces: BTreeMap<InterfaceId, InterfaceState>,
    exclusions: BTreeSet<InterfaceId>,
    next_periodic_update: Option<EventId>,
    next_triggered_update: Option<EventId>,
    outbox: VecDeque<Advertisement>,
}

impl PioRoutingProtocol {
    /// Fails when the configuration would stall the timeline.
    pub fn new(config: ProtocolConfig) -> RoutingResult<Self> {
        config
            .validate()
            .map_err(|e| RoutingError::InvalidConfig(e.to_string()))?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            config,
            table: RoutingTable::new(),
            node: None,
            initialized: false,
            rng,
            interfaces: BTreeMap::new(),
            exclusions: BTreeSet::new(),
            next_periodic_update: None,
            next_triggered_update: None,
            outbox: VecDeque::new(),
        })
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    pub fn entry(&self, id: RouteId) -> Option<&RouteEntry> {
        self.table.entry(id)
    }

    pub fn node(&self) -> Option<NodeId> {
        self.node
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Lifetime for routes learned from neighbors.
    pub fn learned_route_lifetime(&self) -> RouteLifetime {
        RouteLifetime::new(self.config.route_timeout_delay, self.config.garbage_collection_delay)
    }

    /// Interfaces that never carry updates and get no connected route.
    pub fn set_interface_exclusions(&mut self, exclusions: BTreeSet<InterfaceId>) {
        self.exclusions = exclusions;
    }

    pub fn exclude_interface(&mut self, interface: InterfaceId) {
        self.exclusions.insert(interface);
    }

    /// Attaches the protocol to its node's stack. A protocol is attached once.
    pub fn set_stack(&mut self, stack: Option<&Ipv4Stack>) -> RoutingResult<()> {
        if let Some(node) = self.node {
            return Err(RoutingError::AlreadyAttached(node));
        }
        let stack = stack.ok_or(RoutingError::MissingStack)?;

        debug!("PIO: attaching to node {}", stack.node());
        self.node = Some(stack.node());

        for (id, iface) in stack.interfaces() {
            for address in &iface.addresses {
                self.notify_add_address(id, *address);
            }
            if iface.up {
                self.notify_interface_up(id);
            } else {
                self.notify_interface_down(id);
            }
        }

        Ok(())
    }

    /// Starts protocol operation: local host and connected routes, then the
    /// first periodic update after a random startup delay.
    pub fn initialize(&mut self, timers: &mut impl TimerQueue<ProtocolTimer>) -> RoutingResult<()> {
        let node = self.node.ok_or(RoutingError::NotAttached)?;
        if self.initialized {
            return Ok(());
        }

        info!("PIO: initializing node {}", node);

        self.add_host_route_to(timers, Ipv4Addr::LOCALHOST, 0, 0, 0, RouteLifetime::PERMANENT);

        let connected: Vec<(InterfaceId, Ipv4Net)> = self
            .interfaces
            .iter()
            .filter(|(id, state)| state.up && !state.is_loopback() && !self.exclusions.contains(*id))
            .flat_map(|(id, state)| state.addresses.iter().map(move |a| (*id, a.trunc())))
            .collect();

        for (interface, network) in connected {
            self.add_network_route_to(timers, network, interface, 0, 0, RouteLifetime::PERMANENT);
        }

        self.initialized = true;
        self.start_updates(timers);
        Ok(())
    }

    pub fn add_host_route_to(
        &mut self,
        timers: &mut impl TimerQueue<ProtocolTimer>,
        host: Ipv4Addr,
        interface: InterfaceId,
        metric: u16,
        sequence_number: u16,
        lifetime: RouteLifetime,
    ) -> RouteId {
        let entry = RouteEntry::host(host, interface, metric, sequence_number);
        debug!("PIO: adding the host route {}", entry);
        self.insert_route(timers, entry, lifetime)
    }

    /// Directly connected network, no gateway.
    pub fn add_network_route_to(
        &mut self,
        timers: &mut impl TimerQueue<ProtocolTimer>,
        network: Ipv4Net,
        interface: InterfaceId,
        metric: u16,
        sequence_number: u16,
        lifetime: RouteLifetime,
    ) -> RouteId {
        let entry = RouteEntry::network(network, interface, metric, sequence_number);
        debug!("PIO: adding the interface route {}", entry);
        self.insert_route(timers, entry, lifetime)
    }

    pub fn add_network_route_via(
        &mut self,
        timers: &mut impl TimerQueue<ProtocolTimer>,
        network: Ipv4Net,
        gateway: Ipv4Addr,
        interface: InterfaceId,
        metric: u16,
        sequence_number: u16,
        lifetime: RouteLifetime,
    ) -> RouteId {
        let entry = RouteEntry::via(network, gateway, interface, metric, sequence_number);
        debug!("PIO: adding the next hop route {}", entry);
        self.insert_route(timers, entry, lifetime)
    }

    /// 0.0.0.0/0 via `gateway`. Installed by hand or another protocol, never expires.
    pub fn add_default_route_to(
        &mut self,
        timers: &mut impl TimerQueue<ProtocolTimer>,
        gateway: Ipv4Addr,
        interface: InterfaceId,
    ) -> RouteId {
        self.add_network_route_via(
            timers,
            Ipv4Net::default(),
            gateway,
            interface,
            0,
            0,
            RouteLifetime::PERMANENT,
        )
    }

    fn insert_route(
        &mut self,
        timers: &mut impl TimerQueue<ProtocolTimer>,
        entry: RouteEntry,
        lifetime: RouteLifetime,
    ) -> RouteId {
        let local_host = entry.validity == Validity::LocalHost;
        let expires = !local_host && !entry.is_default() && !lifetime.is_permanent();

        let id = self.table.push_front(entry, lifetime.garbage_collection);

        if expires {
            let delay = lifetime.timeout + self.jitter(ROUTE_TIMEOUT_JITTER);
            let timer = timers.schedule(delay, ProtocolTimer::Invalidate(id));
            if let Some(record) = self.table.get_mut(id) {
                record.timer = Some(timer);
            }
        }

        if !local_host {
            self.request_triggered_update(timers);
        }
        id
    }

    pub fn handle_timer(&mut self, timers: &mut impl TimerQueue<ProtocolTimer>, timer: ProtocolTimer) {
        match timer {
            ProtocolTimer::Invalidate(id) => {
                self.invalidate_route(timers, id);
            }
            ProtocolTimer::Delete(id) => {
                self.delete_route(timers, id);
            }
            ProtocolTimer::PeriodicUpdate => self.send_periodic_update(timers),
            ProtocolTimer::TriggeredUpdate => self.send_triggered_update(timers),
        }
    }

    pub fn notify_interface_up(&mut self, interface: InterfaceId) {
        debug!("PIO: interface {} up", interface);
        self.interfaces.entry(interface).or_default().up = true;
    }

    pub fn notify_interface_down(&mut self, interface: InterfaceId) {
        debug!("PIO: interface {} down", interface);
        self.interfaces.entry(interface).or_default().up = false;
    }

    pub fn notify_add_address(&mut self, interface: InterfaceId, address: Ipv4Net) {
        debug!("PIO: interface {} address {} added", interface, address);
        let state = self.interfaces.entry(interface).or_default();
        if !state.addresses.contains(&address) {
            state.addresses.push(address);
        }
    }

    pub fn notify_remove_address(&mut self, interface: InterfaceId, address: Ipv4Net) {
        debug!("PIO: interface {} address {} removed", interface, address);
        if let Some(state) = self.interfaces.get_mut(&interface) {
            state.addresses.retain(|a| *a != address);
        }
    }

    pub fn is_interface_up(&self, interface: InterfaceId) -> bool {
        self.interfaces.get(&interface).map(|s| s.up).unwrap_or(false)
    }

    /// Tears the instance down: every pending timer is canceled before the
    /// table and the outbox are released.
    pub fn dispose(&mut self, timers: &mut impl TimerQueue<ProtocolTimer>) {
        for timer in self.table.clear() {
            timers.cancel(timer);
        }
        for timer in [self.next_periodic_update.take(), self.next_triggered_update.take()]
            .into_iter()
            .flatten()
        {
            timers.cancel(timer);
        }

        if !self.outbox.is_empty() {
            warn!("PIO: dropping {} unsent advertisements", self.outbox.len());
        }
        self.outbox.clear();
        self.interfaces.clear();
        self.initialized = false;
        self.node = None;
    }

    pub fn print_routing_table(
        &self,
        out: &mut impl fmt::Write,
        timers: &impl TimerQueue<ProtocolTimer>,
    ) -> fmt::Result {
        let node = self
            .node
            .map(|n| n.to_string())
            .unwrap_or_else(|| "-".to_string());
        let now = timers.now().as_secs_f64();

        match self.config.printing {
            PrintingOption::DontPrint => Ok(()),
            PrintingOption::NeighborTable => {
                writeln!(out, "Node: {} Time: {}s PIO Neighbor Table", node, now)
            }
            PrintingOption::MainRoutingTable => {
                writeln!(out, "Node: {} Time: {}s PIO Routing Table", node, now)?;
                writeln!(out, "Destination         Gateway          If  Seq#    Metric  Validity Changed Expire in (s)")?;
                writeln!(out, "------------------  ---------------  --  ------  ------  -------- ------- -------------")?;

                for (_, record) in self.table.iter() {
                    let entry = &record.entry;
                    let gateway = entry.gateway.unwrap_or(Ipv4Addr::UNSPECIFIED);
                    let expire = record
                        .timer
                        .map(|t| timers.delay_left(t))
                        .unwrap_or(Duration::ZERO);

                    writeln!(
                        out,
                        "{:<20}{:<17}{:<4}{:<8}{:<8}{:<10}{:<7}{:<8}",
                        entry.destination.to_string(),
                        gateway.to_string(),
                        entry.interface,
                        entry.sequence_number,
                        entry.metric,
                        entry.validity.label(),
                        u8::from(entry.changed),
                        expire.as_secs_f64(),
                    )?;
                }
                Ok(())
            }
        }
    }

    fn jitter(&mut self, upper: Duration) -> Duration {
        if upper.is_zero() {
            return Duration::ZERO;
        }
        self.rng.gen_range(Duration::ZERO..upper)
    }

    fn random_between(&mut self, min: Duration, max: Duration) -> Duration {
        if min >= max {
            return min;
        }
        self.rng.gen_range(min..=max)
    }
}
