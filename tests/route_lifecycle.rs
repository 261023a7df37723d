use ipnet::Ipv4Net;
use std::net::Ipv4Addr;
use std::time::Duration;

use pio_routing::protocol::{ProtocolTimer, RouteLifetime, Validity};
use pio_routing::sim::{Scheduler, TimerQueue};
use pio_routing::{PioRoutingProtocol, ProtocolConfig, RoutingError};

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

fn net(s: &str) -> Ipv4Net {
    s.parse().unwrap()
}

fn protocol(seed: u64) -> PioRoutingProtocol {
    PioRoutingProtocol::new(ProtocolConfig {
        seed: Some(seed),
        ..ProtocolConfig::default()
    }).unwrap()
}

/// Fires due events against a lone protocol instance.
fn run_until(pio: &mut PioRoutingProtocol, sched: &mut Scheduler<ProtocolTimer>, stop: Duration) {
    while let Some((_, timer)) = sched.pop_due(stop) {
        pio.handle_timer(sched, timer);
    }
    sched.advance_to(stop);
}

#[test]
fn loopback_route_is_local_host_forever() {
    let mut sched = Scheduler::new();
    let mut pio = protocol(1);
    let id = pio.add_host_route_to(&mut sched, Ipv4Addr::LOCALHOST, 0, 9, 9, RouteLifetime::new(secs(5), secs(5)));

    assert!(pio.table().get(id).unwrap().timer.is_none());
    run_until(&mut pio, &mut sched, secs(10_000));

    let entry = pio.entry(id).unwrap();
    assert_eq!(entry.validity, Validity::LocalHost);
    assert_eq!((entry.metric, entry.sequence_number), (0, 0));
}

#[test]
fn permanent_route_stays_valid_until_bulk_trigger() {
    let mut sched = Scheduler::new();
    let mut pio = protocol(2);
    let id = pio.add_network_route_to(&mut sched, net("10.10.10.0/24"), 2, 0, 2, RouteLifetime::PERMANENT);

    run_until(&mut pio, &mut sched, secs(10_000));
    assert_eq!(pio.entry(id).unwrap().validity, Validity::Valid);

    assert!(pio.invalidate_routes_for_interface(&mut sched, 2));
    assert_eq!(pio.entry(id).unwrap().validity, Validity::Invalid);

    run_until(&mut pio, &mut sched, secs(10_010));
    assert!(pio.entry(id).is_none());
}

#[test]
fn route_expires_within_jitter_window_and_is_collected() {
    for seed in 0..20 {
        let mut sched = Scheduler::new();
        let mut pio = protocol(seed);
        let id = pio.add_network_route_via(
            &mut sched,
            net("172.16.1.0/30"),
            Ipv4Addr::new(203, 15, 19, 2),
            3,
            3,
            4,
            RouteLifetime::new(secs(100), secs(20)),
        );

        let timer = pio.table().get(id).unwrap().timer.unwrap();
        let invalid_at = sched.delay_left(timer);
        assert!(invalid_at >= secs(100) && invalid_at < secs(105), "seed {}", seed);

        run_until(&mut pio, &mut sched, secs(99));
        assert_eq!(pio.entry(id).unwrap().validity, Validity::Valid);

        run_until(&mut pio, &mut sched, invalid_at);
        let record = pio.table().get(id).unwrap();
        assert_eq!(record.entry.validity, Validity::Invalid);
        assert!(record.entry.changed);
        assert_eq!(sched.delay_left(record.timer.unwrap()), secs(20));

        run_until(&mut pio, &mut sched, invalid_at + secs(20));
        assert!(pio.entry(id).is_none(), "seed {}", seed);
    }
}

#[test]
fn most_recent_overlapping_route_wins() {
    let mut sched = Scheduler::new();
    let mut pio = protocol(3);
    pio.add_network_route_via(
        &mut sched,
        net("10.0.0.0/8"),
        Ipv4Addr::new(15, 16, 16, 2),
        2,
        1,
        2,
        RouteLifetime::PERMANENT,
    );
    // longer prefix but worse metric, added later
    pio.add_network_route_via(
        &mut sched,
        net("10.10.0.0/16"),
        Ipv4Addr::new(203, 15, 19, 2),
        3,
        9,
        2,
        RouteLifetime::PERMANENT,
    );
    let wide = pio.add_network_route_via(
        &mut sched,
        net("0.0.0.0/1"),
        Ipv4Addr::new(192, 168, 16, 1),
        1,
        12,
        2,
        RouteLifetime::PERMANENT,
    );

    let found = pio.lookup_route(Ipv4Addr::new(10, 10, 1, 1), None).unwrap();
    assert_eq!(found, pio.entry(wide).unwrap());
}

#[test]
fn interface_invalidation_only_touches_valid_routes_on_that_interface() {
    let mut sched = Scheduler::new();
    let mut pio = protocol(4);
    let lifetime = RouteLifetime::new(secs(500), secs(500));
    let gw2 = Ipv4Addr::new(15, 16, 16, 2);

    let on_if2 = pio.add_network_route_via(&mut sched, net("10.10.10.0/24"), gw2, 2, 2, 4, lifetime);
    let stale = pio.add_network_route_via(&mut sched, net("11.118.126.0/24"), gw2, 2, 1, 2, lifetime);
    let on_if3 = pio.add_network_route_via(
        &mut sched,
        net("172.16.1.0/30"),
        Ipv4Addr::new(203, 15, 19, 2),
        3,
        3,
        4,
        lifetime,
    );

    assert!(pio.invalidate_route(&mut sched, stale));
    let stale_timer = pio.table().get(stale).unwrap().timer;
    let if3_timer = pio.table().get(on_if3).unwrap().timer;

    assert!(pio.invalidate_routes_for_interface(&mut sched, 2));
    assert_eq!(pio.entry(on_if2).unwrap().validity, Validity::Invalid);
    assert_eq!(pio.entry(on_if3).unwrap().validity, Validity::Valid);
    // already invalid: its deletion timer is left alone
    assert_eq!(pio.table().get(stale).unwrap().timer, stale_timer);
    // other interface: its expiry timer is untouched and still armed
    assert_eq!(pio.table().get(on_if3).unwrap().timer, if3_timer);
    assert!(sched.is_pending(if3_timer.unwrap()));

    assert!(!pio.invalidate_routes_for_interface(&mut sched, 2));
    assert!(!pio.invalidate_routes_for_interface(&mut sched, 7));
}

#[test]
fn double_delete_leaves_other_routes_intact() {
    let mut sched = Scheduler::new();
    let mut pio = protocol(5);
    let keep = pio.add_network_route_to(&mut sched, net("15.16.16.0/24"), 2, 0, 2, RouteLifetime::PERMANENT);
    let gone = pio.add_host_route_to(
        &mut sched,
        Ipv4Addr::new(10, 1, 1, 1),
        1,
        1,
        2,
        RouteLifetime::new(secs(30), secs(10)),
    );

    assert!(pio.delete_route(&mut sched, gone).is_some());
    assert!(pio.delete_route(&mut sched, gone).is_none());
    // a stale timer for the deleted route does nothing either
    pio.handle_timer(&mut sched, ProtocolTimer::Invalidate(gone));
    pio.handle_timer(&mut sched, ProtocolTimer::Delete(gone));

    assert_eq!(pio.table().len(), 1);
    assert!(pio.entry(keep).is_some());
}

#[test]
fn lookup_failure_is_typed() {
    let pio = protocol(6);
    let stack = pio_routing::Ipv4Stack::new(0);
    let dst = Ipv4Addr::new(172, 16, 1, 2);
    let err = pio.route_output(&stack, dst, None).unwrap_err();
    assert_eq!(err, RoutingError::NoRouteToHost(dst));
    assert!(err.is_unreachable());
}
