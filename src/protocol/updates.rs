use ipnet::Ipv4Net;
use log::{debug, info, warn};
use serde::Serialize;
use std::net::Ipv4Addr;

use super::entry::{RouteEntry, Validity};
use super::{PioRoutingProtocol, ProtocolTimer};
use crate::config::SplitHorizon;
use crate::sim::TimerQueue;
use crate::{InterfaceId, NodeId};

/// Metric advertised for unreachable destinations.
pub const INFINITE_METRIC: u16 = 16;

/// Advertisements kept while the wire layer is not draining the outbox.
pub const OUTBOX_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpdateKind {
    /// Full table, sent every periodic update interval.
    Periodic,
    /// Changed routes only, sent after a cooldown.
    Triggered,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdvertisedRoute {
    pub destination: Ipv4Net,
    pub metric: u16,
    pub sequence_number: u16,
}

/// One update message for one outgoing interface, waiting for the wire layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Advertisement {
    pub node: Option<NodeId>,
    pub kind: UpdateKind,
    pub interface: InterfaceId,
    pub source: Option<Ipv4Addr>,
    pub routes: Vec<AdvertisedRoute>,
}

impl PioRoutingProtocol {
    pub(super) fn start_updates(&mut self, timers: &mut impl TimerQueue<ProtocolTimer>) {
        let startup = self.config.startup_delay;
        let delay = self.jitter(startup);
        debug!("PIO: first periodic update in {:?}", delay);
        self.next_periodic_update = Some(timers.schedule(delay, ProtocolTimer::PeriodicUpdate));
    }

    /// Schedules a triggered update unless one is already pending.
    pub fn request_triggered_update(&mut self, timers: &mut impl TimerQueue<ProtocolTimer>) {
        if !self.initialized {
            return;
        }
        if self.next_triggered_update.is_some_and(|id| timers.is_pending(id)) {
            return;
        }

        let (min, max) = (self.config.min_triggered_cooldown, self.config.max_triggered_cooldown);
        let delay = self.random_between(min, max);
        debug!("PIO: triggered update in {:?}", delay);
        self.next_triggered_update = Some(timers.schedule(delay, ProtocolTimer::TriggeredUpdate));
    }

    pub(super) fn send_periodic_update(&mut self, timers: &mut impl TimerQueue<ProtocolTimer>) {
        self.next_periodic_update = None;

        // a full update covers whatever the triggered one would have sent
        if let Some(id) = self.next_triggered_update.take() {
            timers.cancel(id);
        }

        let sent = self.queue_update(UpdateKind::Periodic);
        info!("PIO: periodic update on {} interfaces", sent);
        self.clear_changed();

        let interval = self.config.periodic_update_interval;
        self.next_periodic_update = Some(timers.schedule(interval, ProtocolTimer::PeriodicUpdate));
    }

    pub(super) fn send_triggered_update(&mut self, _timers: &mut impl TimerQueue<ProtocolTimer>) {
        self.next_triggered_update = None;

        if !self.table.iter().any(|(_, record)| record.entry.changed) {
            debug!("PIO: nothing changed, skipping triggered update");
            return;
        }

        let sent = self.queue_update(UpdateKind::Triggered);
        info!("PIO: triggered update on {} interfaces", sent);
        self.clear_changed();
    }

    /// Interfaces updates go out of: up, not excluded, not loopback.
    pub fn update_interfaces(&self) -> Vec<InterfaceId> {
        self.interfaces
            .iter()
            .filter(|(id, state)| state.up && !state.is_loopback() && !self.exclusions.contains(*id))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Routes an update of `kind` carries out of `interface`, split horizon applied.
    pub fn routes_for_interface(&self, interface: InterfaceId, kind: UpdateKind) -> Vec<AdvertisedRoute> {
        self.table
            .iter()
            .map(|(_, record)| &record.entry)
            .filter(|entry| match kind {
                UpdateKind::Periodic => entry.validity == Validity::Valid,
                UpdateKind::Triggered => entry.changed && entry.validity != Validity::LocalHost,
            })
            .filter_map(|entry| self.advertise(entry, interface))
            .collect()
    }

    fn advertise(&self, entry: &RouteEntry, interface: InterfaceId) -> Option<AdvertisedRoute> {
        let mut metric = match entry.validity {
            Validity::Valid => entry.metric,
            Validity::Invalid => INFINITE_METRIC,
            Validity::LocalHost => return None,
        };

        if entry.interface == interface {
            match self.config.split_horizon {
                SplitHorizon::NoSplitHorizon => {}
                SplitHorizon::SplitHorizon => return None,
                SplitHorizon::PoisonReverse => metric = INFINITE_METRIC,
            }
        }

        Some(AdvertisedRoute {
            destination: entry.destination,
            metric,
            sequence_number: entry.sequence_number,
        })
    }

    fn queue_update(&mut self, kind: UpdateKind) -> usize {
        let mut sent = 0;
        for interface in self.update_interfaces() {
            let routes = self.routes_for_interface(interface, kind);
            if routes.is_empty() {
                continue;
            }

            let source = self
                .interfaces
                .get(&interface)
                .and_then(|state| state.addresses.first())
                .map(|a| a.addr());

            if self.outbox.len() >= OUTBOX_CAPACITY {
                warn!("PIO: outbox full, dropping the oldest advertisement");
                self.outbox.pop_front();
            }
            self.outbox.push_back(Advertisement {
                node: self.node,
                kind,
                interface,
                source,
                routes,
            });
            sent += 1;
        }
        sent
    }

    fn clear_changed(&mut self) {
        for entry in self.table.entries_mut() {
            entry.changed = false;
        }
    }

    /// Drains the advertisements queued since the last call.
    pub fn take_advertisements(&mut self) -> Vec<Advertisement> {
        self.outbox.drain(..).collect()
    }
}
