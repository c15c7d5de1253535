//! Config sync between a server host and client hosts.

mod common;

use std::time::{Duration, Instant};

use common::{LoopbackTransport, SERVER, TestHost, deliver, flush, host};
use serversync::prelude::*;
use serversync::sync::SkipReason;
use serversync::transport::SEND_TIMEOUT_REASON;

const MOD: &str = "dk.thrakal.DifficultyScaler";
const CLIENT: PeerId = 1;

fn engine(config: &SyncConfig, speed: f64, with_armor: bool) -> ConfigSync {
    let mut sync = ConfigSync::new(MOD, config).with_current_version("1.0.0");
    sync.add_locking_setting("General", "Lock Configuration", ValueType::Bool, true)
        .unwrap();
    sync.add_setting("Monsters", "Speed", ValueType::Float, speed).unwrap();
    sync.add_setting("Monsters", "Name", ValueType::String, "troll").unwrap();
    if with_armor {
        sync.add_setting("Monsters", "Armor", ValueType::Int, 4i64).unwrap();
    }
    sync
}

fn handle(host: &TestHost, section: &str, key: &str) -> SettingHandle {
    host.config_sync(MOD).unwrap().registry().find(section, key).unwrap()
}

fn value(host: &TestHost, key: &str) -> Value {
    let sync = host.config_sync(MOD).unwrap();
    sync.value(handle(host, "Monsters", key)).clone()
}

fn applied(events: &[HostEvent]) -> Vec<&ApplyReport> {
    events
        .iter()
        .filter_map(|event| match event {
            HostEvent::Applied { report, .. } => Some(report),
            _ => None,
        })
        .collect()
}

fn login(server: &mut TestHost, client: &mut TestHost) {
    server.start(SessionRole::Server);
    client.start(SessionRole::Client);
    server.on_peer_connected(CLIENT);
    client.on_peer_connected(SERVER);
    deliver(server, SERVER, client, CLIENT);
    deliver(client, CLIENT, server, SERVER);
    server.on_peer_info(CLIENT).unwrap();
    client.on_peer_info(SERVER).unwrap();
}

fn session(server_armor: bool) -> (TestHost, TestHost) {
    let config = SyncConfig::default();
    let mut server = host(&[CLIENT]);
    server.add_config_sync(engine(&config, 1.0, server_armor)).unwrap();
    let mut client = host(&[SERVER]);
    client.add_config_sync(engine(&config, 5.0, false)).unwrap();

    login(&mut server, &mut client);
    flush(&mut server);
    deliver(&mut server, SERVER, &mut client, CLIENT);
    (server, client)
}

#[test]
fn test_snapshot_shadows_local_values_until_disconnect() {
    let (_server, mut client) = session(false);
    assert_eq!(value(&client, "Speed"), Value::Float(1.0));

    let events = client.drain_events();
    let reports = applied(&events);
    assert_eq!(reports.len(), 1);
    assert!(!reports[0].partial);
    assert_eq!(reports[0].settings, 3);
    assert!(reports[0].skipped.is_empty());
    assert!(!client.config_sync(MOD).unwrap().is_source_of_truth());

    client.on_peer_disconnected(SERVER);
    assert_eq!(value(&client, "Speed"), Value::Float(5.0));
    assert!(client.config_sync(MOD).unwrap().is_source_of_truth());
}

#[test]
fn test_unknown_entry_is_skipped() {
    let (_server, mut client) = session(true);
    let events = client.drain_events();
    let reports = applied(&events);
    assert_eq!(reports[0].settings, 3);
    assert_eq!(reports[0].skipped.len(), 1);
    assert_eq!(reports[0].skipped[0].key, "Armor");
    assert_eq!(reports[0].skipped[0].reason, SkipReason::UnknownEntry);
    assert_eq!(value(&client, "Speed"), Value::Float(1.0));
}

#[test]
fn test_host_traffic_follows_snapshot() {
    let config = SyncConfig::default();
    let mut server = host(&[CLIENT]);
    server.add_config_sync(engine(&config, 1.0, false)).unwrap();
    let mut client = host(&[SERVER]);
    client.add_config_sync(engine(&config, 5.0, false)).unwrap();
    login(&mut server, &mut client);

    server.send_host_message(CLIENT, b"peer info".to_vec());
    assert!(server.is_gated(CLIENT));
    assert!(server.transport().outgoing.iter().all(|sent| sent.route != Route::Host));

    flush(&mut server);
    let routes: Vec<_> = server.transport().outgoing.iter().map(|sent| sent.route.clone()).collect();
    assert_eq!(routes, vec![Route::ConfigSync(MOD.into()), Route::Host]);

    let host_traffic = deliver(&mut server, SERVER, &mut client, CLIENT);
    assert_eq!(host_traffic, vec![b"peer info".to_vec()]);
    assert_eq!(value(&client, "Speed"), Value::Float(1.0));
}

#[test]
fn test_locked_client_cannot_push_changes() {
    let (mut server, mut client) = session(false);
    let speed = handle(&client, "Monsters", "Speed");
    assert!(!client.config_sync(MOD).unwrap().is_writable(client.context(), speed));

    client.set_value(MOD, speed, 9.0).unwrap();
    assert!(client.is_idle());

    let mut payload = ConfigPayload::partial();
    payload.push(Entry::new("Monsters", "Speed", ValueType::Float, Value::Float(9.0)));
    let data = payload.encode().unwrap();
    server.drain_events();
    server
        .on_message(CLIENT, &Route::ConfigSync(MOD.into()), &data)
        .unwrap();
    assert_eq!(value(&server, "Speed"), Value::Float(1.0));
    assert!(applied(&server.drain_events()).is_empty());
}

#[test]
fn test_admin_changes_are_relayed() {
    let config = SyncConfig::default();
    let mut server = host(&[CLIENT, 2]);
    server
        .transport_mut()
        .host_names
        .insert(CLIENT, "steam_1".to_string());
    server.set_admin_list(["steam_1".to_string()]);
    server.add_config_sync(engine(&config, 1.0, false)).unwrap();
    let mut client = host(&[SERVER]);
    client.add_config_sync(engine(&config, 5.0, false)).unwrap();

    login(&mut server, &mut client);
    flush(&mut server);
    deliver(&mut server, SERVER, &mut client, CLIENT);
    assert!(client.context().lock_exempt);

    let speed = handle(&client, "Monsters", "Speed");
    assert!(client.config_sync(MOD).unwrap().is_writable(client.context(), speed));
    client.set_value(MOD, speed, 7.0).unwrap();
    flush(&mut client);
    deliver(&mut client, CLIENT, &mut server, SERVER);
    assert_eq!(value(&server, "Speed"), Value::Float(7.0));

    flush(&mut server);
    let relayed: Vec<_> = server
        .transport()
        .outgoing
        .iter()
        .filter(|sent| sent.route == Route::ConfigSync(MOD.into()))
        .map(|sent| sent.peer)
        .collect();
    assert!(relayed.contains(&2));
}

#[test]
fn test_shutdown_returns_to_local_values() {
    let (mut server, mut client) = session(false);
    server.shutdown();
    assert_eq!(value(&server, "Speed"), Value::Float(1.0));
    assert_eq!(server.context().role, SessionRole::Offline);

    client.shutdown();
    assert_eq!(value(&client, "Speed"), Value::Float(5.0));
}

#[test]
fn test_backpressure_drops_only_the_stalled_peer() {
    let mut server = SyncHost::new(LoopbackTransport::with_peers(&[1, 2]), SyncConfig::default());
    server
        .add_config_sync(engine(&SyncConfig::default(), 1.0, false))
        .unwrap();
    server.start(SessionRole::Server);
    server.transport_mut().queue_depth.insert(1, 30_000);
    for peer in [1, 2] {
        server.on_peer_connected(peer);
        server.on_peer_info(peer).unwrap();
    }

    let start = Instant::now();
    server.tick_at(start);
    assert!(server.drain_events().contains(&HostEvent::VersionMatched { peer: 2 }));
    assert!(server.is_gated(1));

    server.tick_at(start + Duration::from_secs(29));
    assert!(server.transport().disconnects.is_empty());

    server.tick_at(start + Duration::from_secs(30));
    server.tick_at(start + Duration::from_secs(31));
    assert_eq!(
        server.transport().disconnects,
        vec![(1, SEND_TIMEOUT_REASON.to_string())]
    );
    assert!(server.drain_events().contains(&HostEvent::SendTimedOut { peer: 1 }));
    assert!(!server.is_gated(1));
    assert!(server.transport().is_connected(2));
}

#[test]
fn test_fragmented_snapshot_is_reassembled() {
    let config = SyncConfigBuilder::new()
        .fragment_slice_size(64)
        .compress_min_size(usize::MAX)
        .build();
    let mut server = SyncHost::new(LoopbackTransport::with_peers(&[CLIENT]), config.clone());
    let mut sync = engine(&config, 1.0, false);
    sync.add_setting("Monsters", "Notes", ValueType::String, "x".repeat(500))
        .unwrap();
    server.add_config_sync(sync).unwrap();

    let mut client = host(&[SERVER]);
    let mut sync = engine(&SyncConfig::default(), 5.0, false);
    sync.add_setting("Monsters", "Notes", ValueType::String, "").unwrap();
    client.add_config_sync(sync).unwrap();

    login(&mut server, &mut client);
    flush(&mut server);
    assert!(server.transport().sent_to(CLIENT) > 1);
    deliver(&mut server, SERVER, &mut client, CLIENT);

    assert_eq!(value(&client, "Notes"), Value::from("x".repeat(500)));
    assert_eq!(applied(&client.drain_events()).len(), 1);
}
