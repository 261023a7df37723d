use log::info;
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::config::ProtocolConfig;
use crate::error::{RoutingError, RoutingResult};
use crate::network::InstalledRouting;
use crate::protocol::{PioRoutingProtocol, RouteId};
use crate::sim::Simulator;
use crate::{InterfaceId, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolStatus {
    NotInstalled,
    Installed,
    Initialized,
}

/// Installs and configures PIO instances on simulated nodes.
#[derive(Debug, Clone, Default)]
pub struct PioHelper {
    config: ProtocolConfig,
    exclusions: BTreeMap<NodeId, BTreeSet<InterfaceId>>,
}

impl PioHelper {
    pub fn new(config: ProtocolConfig) -> Self {
        Self {
            config,
            exclusions: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Attributes applied to every instance created from now on.
    pub fn config_mut(&mut self) -> &mut ProtocolConfig {
        &mut self.config
    }

    /// Keeps `interface` of `node` out of PIO: no connected route, no updates.
    pub fn exclude_interface(&mut self, node: NodeId, interface: InterfaceId) {
        self.exclusions.entry(node).or_default().insert(interface);
    }

    pub fn create(&self, node: NodeId) -> RoutingResult<PioRoutingProtocol> {
        let mut config = self.config.clone();
        // each node draws its own random stream
        config.seed = config.seed.map(|seed| seed.wrapping_add(u64::from(node)));

        let mut pio = PioRoutingProtocol::new(config)?;
        if let Some(excluded) = self.exclusions.get(&node) {
            pio.set_interface_exclusions(excluded.clone());
        }
        Ok(pio)
    }

    /// Creates, attaches and starts an instance on `node`.
    pub fn install(&self, sim: &mut Simulator, node: NodeId) -> RoutingResult<()> {
        let pio = self.create(node)?;
        sim.install(node, InstalledRouting::Pio(Box::new(pio)))?;
        sim.initialize(node)?;
        info!("PIO installed on node {}", node);
        Ok(())
    }

    pub fn install_all(&self, sim: &mut Simulator, nodes: &[NodeId]) -> RoutingResult<()> {
        for node in nodes {
            self.install(sim, *node)?;
        }
        Ok(())
    }

    pub fn set_default_route(
        &self,
        sim: &mut Simulator,
        node: NodeId,
        gateway: Ipv4Addr,
        interface: InterfaceId,
    ) -> RoutingResult<RouteId> {
        if sim.stack(node)?.interface(interface).is_none() {
            return Err(RoutingError::UnknownInterface(interface));
        }
        sim.with_pio(node, |pio, timers| pio.add_default_route_to(timers, gateway, interface))
    }

    pub fn get_pio_routing<'a>(&self, sim: &'a Simulator, node: NodeId) -> Option<&'a PioRoutingProtocol> {
        sim.node(node).and_then(|n| n.pio())
    }

    pub fn status(&self, sim: &Simulator, node: NodeId) -> ProtocolStatus {
        match self.get_pio_routing(sim, node) {
            None => ProtocolStatus::NotInstalled,
            Some(pio) if pio.is_initialized() => ProtocolStatus::Initialized,
            Some(_) => ProtocolStatus::Installed,
        }
    }

    pub fn is_initialized(&self, sim: &Simulator, node: NodeId) -> bool {
        self.status(sim, node) == ProtocolStatus::Initialized
    }

    pub fn print_routing_table_every(
        &self,
        sim: &mut Simulator,
        interval: Duration,
        nodes: &[NodeId],
    ) -> RoutingResult<()> {
        for node in nodes {
            sim.schedule_table_print(*node, interval)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetworkInterface;
    use crate::protocol::Validity;

    fn sim() -> (Simulator, NodeId) {
        let mut sim = Simulator::new();
        let node = sim.add_node();
        sim.add_interface(node, NetworkInterface::new("eth1", "192.168.16.2/30".parse().unwrap()))
            .unwrap();
        sim.add_interface(node, NetworkInterface::new("eth2", "15.16.16.1/24".parse().unwrap()))
            .unwrap();
        (sim, node)
    }

    #[test]
    fn test_install_lifecycle() {
        let (mut sim, node) = sim();
        let helper = PioHelper::default();
        assert_eq!(helper.status(&sim, node), ProtocolStatus::NotInstalled);

        helper.install(&mut sim, node).unwrap();
        assert_eq!(helper.status(&sim, node), ProtocolStatus::Initialized);
        assert!(helper.is_initialized(&sim, node));
        assert_eq!(
            helper.install(&mut sim, node),
            Err(RoutingError::AlreadyAttached(node))
        );
    }

    #[test]
    fn test_exclusions_reach_the_instance() {
        let (mut sim, node) = sim();
        let mut helper = PioHelper::default();
        helper.exclude_interface(node, 1);
        helper.install(&mut sim, node).unwrap();

        let pio = helper.get_pio_routing(&sim, node).unwrap();
        assert!(!pio.is_local_route_available("192.168.16.0/30".parse().unwrap()));
        assert!(pio.is_local_route_available("15.16.16.0/24".parse().unwrap()));
        assert_eq!(pio.update_interfaces(), vec![2]);
    }

    #[test]
    fn test_default_route() {
        let (mut sim, node) = sim();
        let helper = PioHelper::default();
        helper.install(&mut sim, node).unwrap();

        let gw = Ipv4Addr::new(15, 16, 16, 2);
        let id = helper.set_default_route(&mut sim, node, gw, 2).unwrap();
        let entry = sim.pio(node).unwrap().entry(id).unwrap().clone();
        assert!(entry.is_default());
        assert_eq!(entry.validity, Validity::Valid);

        let route = sim.route_output(node, Ipv4Addr::new(8, 8, 8, 8), None).unwrap();
        assert_eq!(route.gateway, Some(gw));
        assert_eq!(
            helper.set_default_route(&mut sim, node, gw, 9),
            Err(RoutingError::UnknownInterface(9))
        );
    }

    #[test]
    fn test_invalid_config_is_not_installed() {
        let (mut sim, node) = sim();
        let mut helper = PioHelper::default();
        helper.config_mut().periodic_update_interval = Duration::ZERO;

        assert!(matches!(helper.create(node), Err(RoutingError::InvalidConfig(_))));
        assert!(matches!(helper.install(&mut sim, node), Err(RoutingError::InvalidConfig(_))));
        assert_eq!(helper.status(&sim, node), ProtocolStatus::NotInstalled);
    }

    #[test]
    fn test_config_mut_applies_to_new_instances() {
        let (mut sim, node) = sim();
        let mut helper = PioHelper::default();
        helper.config_mut().garbage_collection_delay = Duration::from_secs(3);
        helper.install(&mut sim, node).unwrap();
        assert_eq!(
            sim.pio(node).unwrap().config().garbage_collection_delay,
            Duration::from_secs(3)
        );
    }
}
