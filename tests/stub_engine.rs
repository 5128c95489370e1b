//! The stub engine against a DNS server on the loopback interface.

mod common;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};
use common::init_logging;
use common::server::{FakeServer, Zone};
use domain::base::iana::Rcode;
use resolv_channel::hosts::{HostAliases, Hosts};
use resolv_channel::services::Services;
use resolv_channel::{
    Channel, Error, Family, HostResult, InitFlags, Lookups, NameInfoFlags,
    NameInfoRequest, NameInfoResult, ResolvConf, SocketEvent, Status,
    StubEngine,
};

type Slot<T> = Rc<RefCell<Option<Result<T, Error>>>>;

fn setup(conf: ResolvConf, hosts: Hosts) -> Channel {
    init_logging();
    let mut services = Services::new();
    services.add("domain", 53, "tcp");
    services.add("domain", 53, "udp");
    Channel::with_engine(StubEngine::with_tables(conf, hosts, services), None)
}

fn lookup(
    channel: &mut Channel,
    name: &str,
    family: Family,
) -> Result<HostResult, Error> {
    let slot: Slot<HostResult> = Default::default();
    let handler_slot = slot.clone();
    channel
        .resolve_host_by_name(name, family, move |_, res| {
            assert!(handler_slot.borrow_mut().replace(res).is_none())
        })
        .unwrap();
    channel.run_until_idle(None).unwrap();
    let res = slot.borrow_mut().take();
    res.expect("handler not called")
}

fn name_info(
    channel: &mut Channel,
    request: NameInfoRequest,
) -> Result<NameInfoResult, Error> {
    let slot: Slot<NameInfoResult> = Default::default();
    let handler_slot = slot.clone();
    channel
        .resolve_name_info(request, move |_, res| {
            assert!(handler_slot.borrow_mut().replace(res).is_none())
        })
        .unwrap();
    channel.run_until_idle(None).unwrap();
    let res = slot.borrow_mut().take();
    res.expect("handler not called")
}

fn example_zone() -> Zone {
    Zone::default()
        .with_a("example.test", "192.0.2.1")
        .with_aaaa("example.test", "2001:db8::1")
        .with_a("www.example.test", "192.0.2.80")
        .with_ptr("1.2.0.192.in-addr.arpa", "example.test")
        .with_ptr("80.2.0.192.in-addr.arpa", "www.example.test")
}

#[test]
fn example_test_resolves() {
    let server = FakeServer::start(example_zone());
    let mut channel = setup(server.conf(), Hosts::new());
    let host = lookup(&mut channel, "example.test", Family::Inet).unwrap();
    assert_eq!(host.canonical_name, "example.test");
    assert_eq!(host.family, Family::Inet);
    assert_eq!(host.addresses, vec!["192.0.2.1"]);
    assert_eq!(server.stats.udp(), 1);
    assert_eq!(server.stats.tcp(), 0);

    let host = lookup(&mut channel, "example.test", Family::Inet6).unwrap();
    assert_eq!(host.family, Family::Inet6);
    assert_eq!(host.addresses, vec!["2001:db8::1"]);
}

#[test]
fn name_address_name_round_trip() {
    let server = FakeServer::start(example_zone());
    let mut channel = setup(server.conf(), Hosts::new());
    let names = Rc::new(RefCell::new(Vec::new()));
    let found = names.clone();
    channel
        .resolve_host_by_name("example.test", Family::Inet, move |chan, res| {
            let host = res.unwrap();
            chan.resolve_host_by_addr(
                &host.addresses[0],
                Family::Inet,
                move |_, res| {
                    found.borrow_mut().push(res.unwrap().canonical_name)
                },
            )
            .unwrap();
        })
        .unwrap();
    channel.run_until_idle(None).unwrap();
    assert_eq!(*names.borrow(), vec!["example.test".to_string()]);
    assert_eq!(
        server.stats.qnames(),
        vec!["example.test", "1.2.0.192.in-addr.arpa"]
    );
}

#[test]
fn socket_interest_is_reported() {
    init_logging();
    let server = FakeServer::start(example_zone());
    let events = Rc::new(RefCell::new(Vec::new()));
    let done = Rc::new(RefCell::new(None));
    let notify_events = events.clone();
    let mut channel = Channel::with_engine(
        StubEngine::with_tables(server.conf(), Hosts::new(), Services::new()),
        Some(Box::new(move |event: SocketEvent| {
            notify_events.borrow_mut().push(event)
        })),
    );
    let (handler_events, handler_done) = (events.clone(), done.clone());
    channel
        .resolve_host_by_name("example.test", Family::Inet, move |_, res| {
            *handler_done.borrow_mut() =
                Some((handler_events.borrow().len(), res.is_ok()))
        })
        .unwrap();
    channel.run_until_idle(None).unwrap();

    let events = events.borrow();
    let (seen, ok) = done.borrow().unwrap();
    assert!(ok);
    assert!(seen >= 1);
    assert!(events[0].read);
    assert!(!events[0].write);
    assert_eq!(events.last(), Some(&SocketEvent::closed(events[0].fd)));
    assert!(channel.pending_descriptors().unwrap().is_empty());
}

#[test]
fn usevc_uses_tcp_only() {
    let server = FakeServer::start(example_zone());
    let mut conf = server.conf();
    conf.flags = InitFlags::USEVC;
    let mut channel = setup(conf, Hosts::new());
    let host = lookup(&mut channel, "example.test", Family::Inet).unwrap();
    assert_eq!(host.addresses, vec!["192.0.2.1"]);
    let host = lookup(&mut channel, "www.example.test", Family::Inet).unwrap();
    assert_eq!(host.addresses, vec!["192.0.2.80"]);
    assert_eq!(server.stats.udp(), 0);
    assert_eq!(server.stats.tcp(), 2);
}

#[test]
fn truncated_answer_retries_over_tcp() {
    let mut zone = example_zone();
    zone.truncate_udp = true;
    let server = FakeServer::start(zone);
    let mut channel = setup(server.conf(), Hosts::new());
    let host = lookup(&mut channel, "example.test", Family::Inet).unwrap();
    assert_eq!(host.addresses, vec!["192.0.2.1"]);
    assert_eq!(server.stats.udp(), 1);
    assert_eq!(server.stats.tcp(), 1);
}

#[test]
fn igntc_keeps_truncated_answer() {
    let mut zone = example_zone();
    zone.truncate_udp = true;
    let server = FakeServer::start(zone);
    let mut conf = server.conf();
    conf.flags = InitFlags::IGNTC;
    let mut channel = setup(conf, Hosts::new());
    assert!(matches!(
        lookup(&mut channel, "example.test", Family::Inet),
        Err(Error::AddressNotFound)
    ));
    assert_eq!(server.stats.udp(), 1);
    assert_eq!(server.stats.tcp(), 0);
}

#[test]
fn nxdomain_is_not_found() {
    let server = FakeServer::start(example_zone());
    let mut channel = setup(server.conf(), Hosts::new());
    assert!(matches!(
        lookup(&mut channel, "missing.test", Family::Inet),
        Err(Error::AddressNotFound)
    ));
    assert_eq!(server.stats.udp(), 1);
}

#[test]
fn silent_server_times_out() {
    let mut zone = example_zone();
    zone.silent = true;
    let server = FakeServer::start(zone);
    let mut conf = server.conf();
    conf.timeout = Duration::from_millis(100);
    conf.attempts = 2;
    let mut channel = setup(conf, Hosts::new());
    let start = Instant::now();
    assert!(matches!(
        lookup(&mut channel, "example.test", Family::Inet),
        Err(Error::Failure(Status::Timeout))
    ));
    assert!(start.elapsed() >= Duration::from_millis(200));
    assert_eq!(server.stats.udp(), 2);
}

#[test]
fn servfail_tries_again() {
    let mut zone = example_zone();
    zone.rcode = Some(Rcode::SERVFAIL);
    let server = FakeServer::start(zone);
    let mut channel = setup(server.conf(), Hosts::new());
    assert!(matches!(
        lookup(&mut channel, "example.test", Family::Inet),
        Err(Error::Failure(Status::ServFail))
    ));
    assert_eq!(server.stats.udp(), 2);
}

#[test]
fn nocheckresp_accepts_servfail() {
    let mut zone = example_zone();
    zone.rcode = Some(Rcode::SERVFAIL);
    let server = FakeServer::start(zone);
    let mut conf = server.conf();
    conf.flags = InitFlags::NOCHECKRESP;
    let mut channel = setup(conf, Hosts::new());
    assert!(matches!(
        lookup(&mut channel, "example.test", Family::Inet),
        Err(Error::Failure(Status::ServFail))
    ));
    assert_eq!(server.stats.udp(), 1);
}

#[test]
fn search_list_and_ndots() {
    let server = FakeServer::start(example_zone());
    let mut conf = server.conf();
    conf.search = vec!["example.test".into()];
    conf.ndots = 1;
    let mut channel = setup(conf, Hosts::new());

    let host = lookup(&mut channel, "www", Family::Inet).unwrap();
    assert_eq!(host.canonical_name, "www.example.test");
    assert_eq!(server.stats.qnames(), vec!["www.example.test"]);

    assert!(lookup(&mut channel, "missing", Family::Inet).is_err());
    assert_eq!(
        server.stats.qnames()[1..],
        ["missing.example.test", "missing"]
    );

    assert!(lookup(&mut channel, "missing.test", Family::Inet).is_err());
    assert_eq!(
        server.stats.qnames()[3..],
        ["missing.test", "missing.test.example.test"]
    );
}

#[test]
fn nosearch_uses_name_as_is() {
    let server = FakeServer::start(example_zone());
    let mut conf = server.conf();
    conf.search = vec!["example.test".into()];
    conf.flags = InitFlags::NOSEARCH;
    let mut channel = setup(conf, Hosts::new());
    assert!(matches!(
        lookup(&mut channel, "www", Family::Inet),
        Err(Error::AddressNotFound)
    ));
    assert_eq!(server.stats.qnames(), vec!["www"]);
}

#[test]
fn norecurse_clears_rd() {
    let server = FakeServer::start(example_zone());
    let mut channel = setup(server.conf(), Hosts::new());
    lookup(&mut channel, "example.test", Family::Inet).unwrap();

    let mut conf = server.conf();
    conf.flags = InitFlags::NORECURSE;
    let mut channel = setup(conf, Hosts::new());
    lookup(&mut channel, "example.test", Family::Inet).unwrap();
    assert_eq!(server.stats.rd_bits(), vec![true, false]);
}

#[test]
fn hosts_table_answers_first() {
    let server = FakeServer::start(example_zone());
    let mut hosts = Hosts::new();
    hosts.add("192.0.2.99".parse().unwrap(), "example.test", &["alias.test"]);
    let mut channel = setup(server.conf(), hosts);

    let slot: Slot<HostResult> = Default::default();
    let handler_slot = slot.clone();
    channel
        .resolve_host_by_name("alias.test", Family::Inet, move |_, res| {
            *handler_slot.borrow_mut() = Some(res)
        })
        .unwrap();
    let host = slot.borrow_mut().take().unwrap().unwrap();
    assert_eq!(host.canonical_name, "example.test");
    assert_eq!(host.aliases, vec!["alias.test"]);
    assert_eq!(host.addresses, vec!["192.0.2.99"]);
    assert_eq!(server.stats.udp(), 0);
}

#[test]
fn dns_lookups_fall_back_to_hosts() {
    let server = FakeServer::start(example_zone());
    let mut hosts = Hosts::new();
    hosts.add("192.0.2.99".parse().unwrap(), "example.test", &[]);
    hosts.add("192.0.2.98".parse().unwrap(), "local.test", &[]);
    let mut conf = server.conf();
    conf.lookups = Lookups::Dns;
    let mut channel = setup(conf, hosts);

    let host = lookup(&mut channel, "example.test", Family::Inet).unwrap();
    assert_eq!(host.addresses, vec!["192.0.2.1"]);
    let host = lookup(&mut channel, "local.test", Family::Inet).unwrap();
    assert_eq!(host.addresses, vec!["192.0.2.98"]);
    assert_eq!(server.stats.udp(), 2);
}

#[test]
fn literal_addresses() {
    let server = FakeServer::start(example_zone());
    let mut channel = setup(server.conf(), Hosts::new());
    let host = lookup(&mut channel, "192.0.2.7", Family::Inet).unwrap();
    assert_eq!(host.addresses, vec!["192.0.2.7"]);
    assert!(matches!(
        lookup(&mut channel, "192.0.2.7", Family::Inet6),
        Err(Error::AddressNotFound)
    ));
    assert_eq!(server.stats.udp(), 0);
}

#[test]
fn name_info_lookups() {
    let server = FakeServer::start(example_zone());
    let mut conf = server.conf();
    conf.search = vec!["example.test".into()];
    let mut channel = setup(conf, Hosts::new());

    let res = name_info(
        &mut channel,
        NameInfoRequest::host("192.0.2.1").with_port(53),
    )
    .unwrap();
    assert_eq!(res.name.as_deref(), Some("example.test"));
    assert_eq!(res.service.as_deref(), Some("domain"));

    let res = name_info(
        &mut channel,
        NameInfoRequest::host("192.0.2.80").with_flags(NameInfoFlags::NOFQDN),
    )
    .unwrap();
    assert_eq!(res.name.as_deref(), Some("www"));
    assert_eq!(res.service, None);

    let res = name_info(&mut channel, NameInfoRequest::host("192.0.2.55"))
        .unwrap();
    assert_eq!(res.name.as_deref(), Some("192.0.2.55"));

    assert!(matches!(
        name_info(
            &mut channel,
            NameInfoRequest::host("192.0.2.55")
                .with_flags(NameInfoFlags::NAMEREQD)
        ),
        Err(Error::AddressNotFound)
    ));
    assert_eq!(server.stats.udp(), 4);

    let res = name_info(
        &mut channel,
        NameInfoRequest::host("192.0.2.1")
            .with_port(4711)
            .with_flags(NameInfoFlags::NUMERICHOST),
    )
    .unwrap();
    assert_eq!(res.name.as_deref(), Some("192.0.2.1"));
    assert_eq!(res.service.as_deref(), Some("4711"));
    assert_eq!(server.stats.udp(), 4);
}

#[test]
fn destroy_with_query_in_flight() {
    let mut zone = example_zone();
    zone.silent = true;
    let server = FakeServer::start(zone);
    let mut channel = setup(server.conf(), Hosts::new());
    let slot: Slot<HostResult> = Default::default();
    let handler_slot = slot.clone();
    channel
        .resolve_host_by_name("example.test", Family::Inet, move |_, res| {
            *handler_slot.borrow_mut() = Some(res)
        })
        .unwrap();
    assert_eq!(channel.pending_descriptors().unwrap().len(), 1);
    channel.destroy().unwrap();
    assert!(matches!(
        slot.borrow_mut().take(),
        Some(Err(Error::Destruction))
    ));
}

#[test]
fn huge_timeout_is_accepted() {
    let server = FakeServer::start(example_zone());
    let mut conf = server.conf();
    conf.timeout = Duration::from_secs(u64::MAX);
    let mut channel = setup(conf, Hosts::new());

    let slot: Slot<HostResult> = Default::default();
    let handler_slot = slot.clone();
    channel
        .resolve_host_by_name("example.test", Family::Inet, move |_, res| {
            *handler_slot.borrow_mut() = Some(res)
        })
        .unwrap();
    let timeout = channel.next_timeout(None).unwrap().unwrap();
    assert!(timeout > Duration::from_secs(86_400));
    channel.run_until_idle(None).unwrap();
    let host = slot.borrow_mut().take().unwrap().unwrap();
    assert_eq!(host.addresses, vec!["192.0.2.1"]);
}

#[test]
fn name_info_reports_timeouts() {
    let mut zone = example_zone();
    zone.silent = true;
    let server = FakeServer::start(zone);
    let mut conf = server.conf();
    conf.timeout = Duration::from_millis(50);
    conf.attempts = 1;
    let mut channel = setup(conf, Hosts::new());
    assert!(matches!(
        name_info(&mut channel, NameInfoRequest::host("192.0.2.1")),
        Err(Error::Failure(Status::Timeout))
    ));
    assert_eq!(server.stats.udp(), 1);
}

#[test]
fn overlong_search_names_are_skipped() {
    let label = "x".repeat(61);
    let long = [label.as_str(); 4].join(".");
    let server =
        FakeServer::start(example_zone().with_a(&long, "192.0.2.5"));
    let mut conf = server.conf();
    conf.search = vec!["example.test".into()];
    conf.ndots = 1;
    let mut channel = setup(conf, Hosts::new());

    let host = lookup(&mut channel, &long, Family::Inet).unwrap();
    assert_eq!(host.addresses, vec!["192.0.2.5"]);

    let missing = long.replace('x', "y");
    assert!(matches!(
        lookup(&mut channel, &missing, Family::Inet),
        Err(Error::AddressNotFound)
    ));
    assert_eq!(server.stats.qnames(), vec![long, missing]);
}

#[test]
fn primary_sticks_to_first_server() {
    let mut zone = example_zone();
    zone.silent = true;
    let first = FakeServer::start(zone);
    let second = FakeServer::start_beside(&first, example_zone());
    let mut conf = first.conf();
    conf.servers.push(second.addr.into());
    conf.timeout = Duration::from_millis(100);
    conf.attempts = 2;

    let mut channel = setup(conf.clone(), Hosts::new());
    let host = lookup(&mut channel, "example.test", Family::Inet).unwrap();
    assert_eq!(host.addresses, vec!["192.0.2.1"]);
    assert_eq!(first.stats.udp(), 1);
    assert_eq!(second.stats.udp(), 1);

    conf.flags = InitFlags::PRIMARY;
    let mut channel = setup(conf, Hosts::new());
    assert!(matches!(
        lookup(&mut channel, "example.test", Family::Inet),
        Err(Error::Failure(Status::Timeout))
    ));
    assert_eq!(first.stats.udp(), 3);
    assert_eq!(second.stats.udp(), 1);
}

#[test]
fn stayopen_keeps_idle_sockets() {
    init_logging();
    let server = FakeServer::start(example_zone());
    let mut conf = server.conf();
    conf.flags = InitFlags::STAYOPEN;
    let events = Rc::new(RefCell::new(Vec::new()));
    let notify_events = events.clone();
    let mut channel = Channel::with_engine(
        StubEngine::with_tables(conf, Hosts::new(), Services::new()),
        Some(Box::new(move |event: SocketEvent| {
            notify_events.borrow_mut().push(event)
        })),
    );

    lookup(&mut channel, "example.test", Family::Inet).unwrap();
    let fd = events.borrow()[0].fd;
    assert_eq!(events.borrow().last(), Some(&SocketEvent::closed(fd)));
    assert!(channel.pending_descriptors().unwrap().is_empty());
    // SAFETY: F_GETFD only inspects the descriptor table.
    assert_ne!(unsafe { libc::fcntl(fd, libc::F_GETFD) }, -1);

    events.borrow_mut().clear();
    lookup(&mut channel, "www.example.test", Family::Inet).unwrap();
    assert_eq!(events.borrow()[0], SocketEvent::new(fd, true, false));
    assert_eq!(server.stats.udp(), 2);
}

#[test]
fn host_aliases_unless_noaliases() {
    let server = FakeServer::start(example_zone());
    let mut aliases = HostAliases::new();
    aliases.add("web", "www.example.test");
    let channel_with = |flags: InitFlags| {
        let mut conf = server.conf();
        conf.flags = flags;
        let mut engine =
            StubEngine::with_tables(conf, Hosts::new(), Services::new());
        engine.set_aliases(aliases.clone());
        Channel::with_engine(engine, None)
    };

    let mut channel = channel_with(InitFlags::empty());
    let host = lookup(&mut channel, "web", Family::Inet).unwrap();
    assert_eq!(host.addresses, vec!["192.0.2.80"]);

    let mut channel = channel_with(InitFlags::NOALIASES);
    assert!(matches!(
        lookup(&mut channel, "web", Family::Inet),
        Err(Error::AddressNotFound)
    ));
    assert_eq!(server.stats.qnames(), vec!["www.example.test", "web"]);
}
