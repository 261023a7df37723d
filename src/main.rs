use anyhow::{Context, Result};
use clap::Parser;
use ipnet::Ipv4Net;
use log::info;
use std::net::Ipv4Addr;
use std::time::Duration;

use pio_routing::protocol::RouteLifetime;
use pio_routing::{NetworkInterface, NodeId, PioHelper, PrintingOption, ProtocolConfig, Simulator};

#[derive(Parser)]
#[command(name = "pio-sim", about = "Four-router PIO routing simulation")]
struct Cli {
    /// JSON protocol configuration; defaults are used when absent
    #[arg(long)]
    config: Option<String>,

    /// Simulation stop time in seconds
    #[arg(long, default_value_t = 59.0)]
    stop: f64,

    /// Seconds between routing table dumps
    #[arg(long, default_value_t = 30.0)]
    print_interval: f64,

    /// Print the main routing tables
    #[arg(long)]
    mtable: bool,

    /// Print the neighbor table headers
    #[arg(long)]
    ntable: bool,

    /// Take the A-C link down at this time (seconds)
    #[arg(long)]
    link_down_at: Option<f64>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(short, long)]
    verbose: bool,
}

struct Routers {
    a: NodeId,
    b: NodeId,
    c: NodeId,
    d: NodeId,
}

fn net(s: &str) -> Result<Ipv4Net> {
    s.parse().with_context(|| format!("invalid network {}", s))
}

fn build_topology(sim: &mut Simulator) -> Result<Routers> {
    let a = sim.add_node();
    let b = sim.add_node();
    let c = sim.add_node();
    let d = sim.add_node();

    // interface numbering follows link creation order
    sim.add_interface(a, NetworkInterface::new("a-src", net("192.168.16.2/30")?))?;
    sim.add_interface(a, NetworkInterface::new("a-b", net("15.16.16.1/24")?))?;
    sim.add_interface(a, NetworkInterface::new("a-c", net("203.15.19.1/24")?))?;

    sim.add_interface(b, NetworkInterface::new("b-a", net("15.16.16.2/24")?))?;
    sim.add_interface(b, NetworkInterface::new("b-d", net("201.13.15.1/24")?))?;
    sim.add_interface(b, NetworkInterface::new("b-c", net("11.118.126.1/24")?))?;

    sim.add_interface(c, NetworkInterface::new("c-a", net("203.15.19.2/24")?))?;
    sim.add_interface(c, NetworkInterface::new("c-d", net("10.10.10.1/24")?))?;
    sim.add_interface(c, NetworkInterface::new("c-b", net("11.118.126.2/24")?))?;

    sim.add_interface(d, NetworkInterface::new("d-b", net("201.13.15.2/24")?))?;
    sim.add_interface(d, NetworkInterface::new("d-c", net("10.10.10.2/24")?))?;
    sim.add_interface(d, NetworkInterface::new("d-dst", net("172.16.1.1/30")?))?;

    Ok(Routers { a, b, c, d })
}

/// Routes each router would have learned from its neighbors.
fn learned_routes(sim: &mut Simulator, routers: &Routers) -> Result<()> {
    let lifetime = RouteLifetime::new(Duration::from_secs(500), Duration::from_secs(500));

    let tables: [(NodeId, Vec<(&str, Ipv4Addr, u32, u16, u16)>); 4] = [
        (
            routers.a,
            vec![
                ("172.16.1.0/30", Ipv4Addr::new(203, 15, 19, 2), 3, 3, 4),
                ("172.16.1.0/30", Ipv4Addr::new(15, 16, 16, 2), 2, 2, 4),
                ("10.10.10.0/24", Ipv4Addr::new(15, 16, 16, 2), 2, 2, 4),
                ("11.118.126.0/24", Ipv4Addr::new(15, 16, 16, 2), 2, 1, 2),
                ("201.13.15.0/24", Ipv4Addr::new(15, 16, 16, 2), 2, 1, 2),
            ],
        ),
        (
            routers.b,
            vec![
                ("10.10.10.0/24", Ipv4Addr::new(11, 118, 126, 2), 3, 1, 2),
                ("203.15.19.0/24", Ipv4Addr::new(11, 118, 126, 2), 3, 1, 2),
                ("172.16.1.0/30", Ipv4Addr::new(201, 13, 15, 2), 2, 1, 2),
                ("192.168.16.0/30", Ipv4Addr::new(15, 16, 16, 1), 1, 1, 2),
            ],
        ),
        (
            routers.c,
            vec![
                ("172.16.1.0/30", Ipv4Addr::new(10, 10, 10, 2), 2, 1, 2),
                ("201.13.15.0/24", Ipv4Addr::new(10, 10, 10, 2), 2, 1, 2),
                ("15.16.16.0/24", Ipv4Addr::new(203, 15, 19, 1), 1, 1, 2),
                ("192.168.16.0/30", Ipv4Addr::new(203, 15, 19, 1), 1, 1, 2),
            ],
        ),
        (
            routers.d,
            vec![
                ("192.168.16.0/30", Ipv4Addr::new(201, 13, 15, 1), 1, 1, 4),
                ("203.15.19.0/24", Ipv4Addr::new(201, 13, 15, 1), 1, 1, 4),
                ("11.118.126.0/24", Ipv4Addr::new(201, 13, 15, 1), 1, 2, 2),
                ("15.16.16.0/24", Ipv4Addr::new(201, 13, 15, 1), 1, 2, 2),
            ],
        ),
    ];

    for (node, routes) in tables {
        for (destination, gateway, interface, metric, sequence) in routes {
            let destination = net(destination)?;
            sim.with_pio(node, |pio, timers| {
                pio.add_network_route_via(timers, destination, gateway, interface, metric, sequence, lifetime)
            })?;
        }
    }
    Ok(())
}

fn seconds(value: f64, flag: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(value).with_context(|| format!("{} must be a non-negative number of seconds, got {}", flag, value))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut config = match &cli.config {
        Some(path) => ProtocolConfig::load(path).with_context(|| format!("loading {}", path))?,
        None => ProtocolConfig::default(),
    };
    if cli.mtable {
        config.printing = PrintingOption::MainRoutingTable;
    } else if cli.ntable {
        config.printing = PrintingOption::NeighborTable;
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    config.validate()?;

    let mut sim = Simulator::new();
    let routers = build_topology(&mut sim)?;
    let all = [routers.a, routers.b, routers.c, routers.d];

    let helper = PioHelper::new(config);
    helper.install_all(&mut sim, &all)?;
    learned_routes(&mut sim, &routers)?;

    if cli.mtable || cli.ntable {
        let interval = seconds(cli.print_interval, "--print-interval")?;
        helper.print_routing_table_every(&mut sim, interval, &all)?;
    }

    let stop = seconds(cli.stop, "--stop")?;
    let link_down_at = cli.link_down_at.map(|at| seconds(at, "--link-down-at")).transpose()?;
    if let Some(at) = link_down_at.filter(|at| *at < stop) {
        sim.run_until(at);
        print!("{}", sim.take_output());

        info!("Taking the A-C link down at {:?}", at);
        for (node, interface) in [(routers.a, 3), (routers.c, 1)] {
            sim.set_interface_down(node, interface)?;
            sim.with_pio(node, |pio, timers| pio.invalidate_routes_for_interface(timers, interface))?;
        }
    }

    sim.run_until(stop);
    print!("{}", sim.take_output());

    let destination = Ipv4Addr::new(172, 16, 1, 2);
    match sim.route_output(routers.a, destination, None) {
        Ok(route) => println!(
            "A -> {}: via {} on interface {}",
            destination,
            route.gateway.map(|g| g.to_string()).unwrap_or_else(|| "direct".to_string()),
            route.interface
        ),
        Err(e) => println!("A -> {}: {}", destination, e),
    }

    for node in all {
        let sent = sim.with_pio(node, |pio, _| pio.take_advertisements())?;
        info!("Node {} queued {} advertisements", node, sent.len());
    }

    Ok(())
}
