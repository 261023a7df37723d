use ipnet::Ipv4Net;
use log::{debug, info};
use std::net::Ipv4Addr;

use super::entry::{RouteEntry, Validity};
use super::routing_table::{RouteId, RouteRecord};
use super::{PioRoutingProtocol, ProtocolTimer};
use crate::InterfaceId;
use crate::sim::TimerQueue;

impl PioRoutingProtocol {
    /// Valid -> Invalid, then schedules the deletion after the garbage
    /// collection delay. Returns false when the entry is gone or not valid.
    pub fn invalidate_route(&mut self, timers: &mut impl TimerQueue<ProtocolTimer>, id: RouteId) -> bool {
        let fallback = self.config.garbage_collection_delay;

        let Some(record) = self.table.get_mut(id) else {
            info!("PIO: cannot invalidate a route that is not in the table");
            return false;
        };
        if !record.entry.invalidate() {
            debug!("PIO: route {} is not valid, nothing to invalidate", record.entry);
            return false;
        }

        debug!("PIO: invalidating route {}", record.entry);

        if let Some(timer) = record.timer.take() {
            timers.cancel(timer);
        }
        let delay = if record.garbage_collection.is_zero() {
            fallback
        } else {
            record.garbage_collection
        };
        record.timer = Some(timers.schedule(delay, ProtocolTimer::Delete(id)));

        self.request_triggered_update(timers);
        true
    }

    /// Removes the entry and cancels its pending timer. A missing entry is a no-op.
    pub fn delete_route(&mut self, timers: &mut impl TimerQueue<ProtocolTimer>, id: RouteId) -> Option<RouteEntry> {
        match self.table.remove(id) {
            Some(record) => {
                debug!("PIO: deleting route {}", record.entry);
                if let Some(timer) = record.timer {
                    timers.cancel(timer);
                }
                Some(record.entry)
            }
            None => {
                info!("PIO: cannot delete a route that is not in the table");
                None
            }
        }
    }

    /// Invalidates every valid route leaving through `interface`.
    pub fn invalidate_routes_for_interface(
        &mut self,
        timers: &mut impl TimerQueue<ProtocolTimer>,
        interface: InterfaceId,
    ) -> bool {
        let affected = self.invalidate_matching(timers, |entry| entry.interface == interface);
        if !affected {
            info!("PIO: no valid route through interface {}", interface);
        }
        affected
    }

    /// Invalidates every valid route to exactly `network`.
    pub fn invalidate_broken_routes(&mut self, timers: &mut impl TimerQueue<ProtocolTimer>, network: Ipv4Net) -> bool {
        let network = network.trunc();
        let affected = self.invalidate_matching(timers, |entry| entry.destination == network);
        if !affected {
            info!("PIO: no valid route to {}", network);
        }
        affected
    }

    /// Invalidates every valid route whose next hop is `gateway`.
    pub fn invalidate_routes_for_gateway(
        &mut self,
        timers: &mut impl TimerQueue<ProtocolTimer>,
        gateway: Ipv4Addr,
    ) -> bool {
        let affected = self.invalidate_matching(timers, |entry| entry.gateway == Some(gateway));
        if !affected {
            info!("PIO: no valid route via gateway {}", gateway);
        }
        affected
    }

    fn invalidate_matching(
        &mut self,
        timers: &mut impl TimerQueue<ProtocolTimer>,
        predicate: impl Fn(&RouteEntry) -> bool,
    ) -> bool {
        let targets: Vec<RouteId> = self
            .table
            .iter()
            .filter(|(_, record)| record.entry.validity == Validity::Valid && predicate(&record.entry))
            .map(|(id, _)| id)
            .collect();

        let mut affected = false;
        for id in targets {
            affected |= self.invalidate_route(timers, id);
        }
        affected
    }

    /// True when a gateway-less route to exactly `network` exists.
    pub fn is_local_route_available(&self, network: Ipv4Net) -> bool {
        let network = network.trunc();
        self.table
            .iter()
            .any(|(_, record)| record.entry.gateway.is_none() && record.entry.destination == network)
    }

    /// First gatewayed route to exactly `network`.
    pub fn find_route_record(&self, network: Ipv4Net) -> Option<(RouteId, &RouteRecord)> {
        let network = network.trunc();
        self.table
            .iter()
            .find(|(_, record)| record.entry.gateway.is_some() && record.entry.destination == network)
    }
}
