use log::debug;
use std::net::Ipv4Addr;

use super::PioRoutingProtocol;
use super::entry::{RouteEntry, Validity};
use crate::InterfaceId;
use crate::error::{RoutingError, RoutingResult};
use crate::network::Ipv4Stack;

/// Forwarding decision handed back to the stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub destination: Ipv4Addr,
    /// Next hop; `None` when the destination is on-link.
    pub gateway: Option<Ipv4Addr>,
    pub interface: InterfaceId,
    pub source: Option<Ipv4Addr>,
}

/// The header fields routing looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
}

/// Callbacks supplied by the stack for packets arriving on an interface.
pub trait InputCallbacks {
    fn unicast_forward(&mut self, route: Route, header: &Ipv4Header);

    fn local_deliver(&mut self, header: &Ipv4Header, interface: InterfaceId);

    fn error(&mut self, header: &Ipv4Header, error: RoutingError);
}

impl PioRoutingProtocol {
    /// First valid entry, in table order, covering `destination` and leaving
    /// through `interface` when one is given.
    pub fn lookup_route(&self, destination: Ipv4Addr, interface: Option<InterfaceId>) -> Option<&RouteEntry> {
        self.table
            .iter()
            .map(|(_, record)| &record.entry)
            .find(|entry| {
                entry.validity == Validity::Valid
                    && entry.matches(destination)
                    && interface.is_none_or(|oif| entry.interface == oif)
            })
    }

    pub fn route_output(
        &self,
        stack: &Ipv4Stack,
        destination: Ipv4Addr,
        oif: Option<InterfaceId>,
    ) -> RoutingResult<Route> {
        if destination.is_multicast() {
            let interface = oif.ok_or(RoutingError::MulticastWithoutInterface(destination))?;
            debug!("PIO: multicast {} out of interface {}", destination, interface);
            return Ok(Route {
                destination,
                gateway: None,
                interface,
                source: stack.source_address(interface),
            });
        }

        match self.lookup_route(destination, oif) {
            Some(entry) => {
                debug!("PIO: route to {} found: {}", destination, entry);
                Ok(self.to_route(stack, destination, entry))
            }
            None => {
                debug!("PIO: no route to {}", destination);
                Err(RoutingError::NoRouteToHost(destination))
            }
        }
    }

    /// Returns true when the packet was taken care of, by local delivery or forwarding.
    pub fn route_input(
        &self,
        stack: &Ipv4Stack,
        iif: InterfaceId,
        header: &Ipv4Header,
        callbacks: &mut impl InputCallbacks,
    ) -> bool {
        let destination = header.destination;

        if destination.is_multicast() {
            debug!("PIO: multicast input for {} not handled", destination);
            return false;
        }

        if stack.interface_for_address(destination).is_some() {
            debug!("PIO: local delivery of {}", destination);
            callbacks.local_deliver(header, iif);
            return true;
        }

        if !stack.is_forwarding(iif) {
            debug!("PIO: forwarding disabled on interface {}", iif);
            callbacks.error(header, RoutingError::NoRouteToHost(destination));
            return false;
        }

        match self.lookup_route(destination, None) {
            Some(entry) => {
                callbacks.unicast_forward(self.to_route(stack, destination, entry), header);
                true
            }
            None => {
                debug!("PIO: no route to forward {}", destination);
                false
            }
        }
    }

    fn to_route(&self, stack: &Ipv4Stack, destination: Ipv4Addr, entry: &RouteEntry) -> Route {
        Route {
            destination,
            gateway: entry.gateway,
            interface: entry.interface,
            source: stack.source_address(entry.interface),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProtocolConfig;
    use crate::network::NetworkInterface;
    use crate::protocol::RouteLifetime;
    use crate::sim::Scheduler;

    #[derive(Default)]
    struct Recorder {
        forwarded: Vec<Route>,
        delivered: Vec<InterfaceId>,
        errors: Vec<RoutingError>,
    }

    impl InputCallbacks for Recorder {
        fn unicast_forward(&mut self, route: Route, _header: &Ipv4Header) {
            self.forwarded.push(route);
        }

        fn local_deliver(&mut self, _header: &Ipv4Header, interface: InterfaceId) {
            self.delivered.push(interface);
        }

        fn error(&mut self, _header: &Ipv4Header, error: RoutingError) {
            self.errors.push(error);
        }
    }

    fn setup() -> (Ipv4Stack, PioRoutingProtocol, Scheduler<crate::protocol::ProtocolTimer>) {
        let mut stack = Ipv4Stack::new(1);
        stack.add_interface(NetworkInterface::new("eth1", "192.168.16.2/30".parse().unwrap()));
        stack.add_interface(NetworkInterface::new("eth2", "15.16.16.1/24".parse().unwrap()));
        stack.add_interface(NetworkInterface::new("eth3", "203.15.19.1/24".parse().unwrap()));

        let mut sched = Scheduler::new();
        let mut pio = PioRoutingProtocol::new(ProtocolConfig {
            seed: Some(3),
            ..ProtocolConfig::default()
        }).unwrap();
        pio.set_stack(Some(&stack)).unwrap();
        pio.add_network_route_via(
            &mut sched,
            "172.16.1.0/30".parse().unwrap(),
            Ipv4Addr::new(15, 16, 16, 2),
            2,
            3,
            4,
            RouteLifetime::PERMANENT,
        );
        pio.add_network_route_via(
            &mut sched,
            "172.16.1.0/30".parse().unwrap(),
            Ipv4Addr::new(203, 15, 19, 2),
            3,
            3,
            4,
            RouteLifetime::PERMANENT,
        );
        (stack, pio, sched)
    }

    fn header(dst: Ipv4Addr) -> Ipv4Header {
        Ipv4Header {
            source: Ipv4Addr::new(192, 168, 16, 1),
            destination: dst,
        }
    }

    #[test]
    fn test_output_takes_most_recent_match() {
        let (stack, pio, _) = setup();
        let route = pio.route_output(&stack, Ipv4Addr::new(172, 16, 1, 1), None).unwrap();
        assert_eq!(route.gateway, Some(Ipv4Addr::new(203, 15, 19, 2)));
        assert_eq!(route.interface, 3);
        assert_eq!(route.source, Some(Ipv4Addr::new(203, 15, 19, 1)));
    }

    #[test]
    fn test_output_honors_interface_hint() {
        let (stack, pio, _) = setup();
        let route = pio.route_output(&stack, Ipv4Addr::new(172, 16, 1, 1), Some(2)).unwrap();
        assert_eq!(route.gateway, Some(Ipv4Addr::new(15, 16, 16, 2)));

        let err = pio.route_output(&stack, Ipv4Addr::new(172, 16, 1, 1), Some(1)).unwrap_err();
        assert_eq!(err, RoutingError::NoRouteToHost(Ipv4Addr::new(172, 16, 1, 1)));
    }

    #[test]
    fn test_output_skips_invalid_routes() {
        let (stack, mut pio, mut sched) = setup();
        pio.invalidate_routes_for_interface(&mut sched, 3);
        let route = pio.route_output(&stack, Ipv4Addr::new(172, 16, 1, 1), None).unwrap();
        assert_eq!(route.interface, 2);
    }

    #[test]
    fn test_multicast_output() {
        let (stack, pio, _) = setup();
        let group = Ipv4Addr::new(224, 0, 0, 9);

        let route = pio.route_output(&stack, group, Some(2)).unwrap();
        assert_eq!(route.gateway, None);
        assert_eq!(route.source, Some(Ipv4Addr::new(15, 16, 16, 1)));

        assert_eq!(
            pio.route_output(&stack, group, None),
            Err(RoutingError::MulticastWithoutInterface(group))
        );
    }

    #[test]
    fn test_input_local_delivery() {
        let (stack, pio, _) = setup();
        let mut rec = Recorder::default();
        // address of another interface still counts as local
        assert!(pio.route_input(&stack, 1, &header(Ipv4Addr::new(203, 15, 19, 1)), &mut rec));
        assert_eq!(rec.delivered, vec![1]);
        assert!(rec.forwarded.is_empty());
    }

    #[test]
    fn test_input_forwarding() {
        let (stack, pio, _) = setup();
        let mut rec = Recorder::default();
        assert!(pio.route_input(&stack, 1, &header(Ipv4Addr::new(172, 16, 1, 2)), &mut rec));
        assert_eq!(rec.forwarded.len(), 1);
        assert_eq!(rec.forwarded[0].interface, 3);

        assert!(!pio.route_input(&stack, 1, &header(Ipv4Addr::new(8, 8, 8, 8)), &mut rec));
        assert!(rec.errors.is_empty());
    }

    #[test]
    fn test_input_multicast_and_forwarding_disabled() {
        let (mut stack, pio, _) = setup();
        let mut rec = Recorder::default();
        assert!(!pio.route_input(&stack, 1, &header(Ipv4Addr::new(224, 0, 0, 9)), &mut rec));

        stack.interface_mut(1).unwrap().set_forwarding(false);
        assert!(!pio.route_input(&stack, 1, &header(Ipv4Addr::new(172, 16, 1, 2)), &mut rec));
        assert_eq!(rec.errors, vec![RoutingError::NoRouteToHost(Ipv4Addr::new(172, 16, 1, 2))]);
        assert!(rec.forwarded.is_empty());
    }
}
