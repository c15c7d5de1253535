//! Version negotiation between a server and a client host.

mod common;

use common::{SERVER, TestHost, deliver, host};
use serversync::prelude::*;
use serversync::version::{Handshake, VersionFailure};

const CLIENT: PeerId = 1;

fn scaler(version: &str) -> VersionCheck {
    VersionCheck::new("dk.thrakal.DifficultyScaler")
        .with_display_name("Difficulty Scaler")
        .with_current_version(version)
}

fn connect(server: &mut TestHost, client: &mut TestHost) {
    server.start(SessionRole::Server);
    client.start(SessionRole::Client);
    server.on_peer_connected(CLIENT);
    client.on_peer_connected(SERVER);
    deliver(server, SERVER, client, CLIENT);
    deliver(client, CLIENT, server, SERVER);
}

fn failure(events: Vec<HostEvent>) -> Option<VersionFailure> {
    events.into_iter().find_map(|event| match event {
        HostEvent::VersionFailed { failure, .. } => Some(failure),
        _ => None,
    })
}

#[test]
fn test_outdated_client_is_refused_on_both_sides() {
    let mut server = host(&[CLIENT]);
    server.add_version_check(scaler("2.0.0")).unwrap();
    let mut client = host(&[SERVER]);
    client.add_version_check(scaler("1.5.0")).unwrap();
    connect(&mut server, &mut client);

    server.on_peer_info(CLIENT).unwrap();
    let disconnects = &server.transport().disconnects;
    assert_eq!(disconnects.len(), 1);
    assert!(disconnects[0].1.contains("requires minimum 2.0.0"));
    assert!(!server.transport().is_connected(CLIENT));
    let server_failure = failure(server.drain_events()).unwrap();
    assert_eq!(server_failure.checks, vec!["dk.thrakal.DifficultyScaler".to_string()]);

    client.on_peer_info(SERVER).unwrap();
    let client_failure = failure(client.drain_events()).unwrap();
    assert_eq!(
        client_failure.message,
        "Mod Difficulty Scaler requires minimum 2.0.0. Installed is version 1.5.0."
    );
}

#[test]
fn test_matching_versions_pass() {
    let mut server = host(&[CLIENT]);
    server.add_version_check(scaler("2.0.0")).unwrap();
    let mut client = host(&[SERVER]);
    client.add_version_check(scaler("2.0.0")).unwrap();
    connect(&mut server, &mut client);

    server.on_peer_info(CLIENT).unwrap();
    client.on_peer_info(SERVER).unwrap();

    assert!(server.transport().disconnects.is_empty());
    assert!(server.drain_events().contains(&HostEvent::VersionMatched { peer: CLIENT }));
    assert!(client.drain_events().contains(&HostEvent::VersionMatched { peer: SERVER }));
}

#[test]
fn test_newer_client_hits_maximum() {
    let mut server = host(&[CLIENT]);
    server.add_version_check(scaler("2.0.0")).unwrap();
    let mut client = host(&[SERVER]);
    client.add_version_check(scaler("3.0.0")).unwrap();
    connect(&mut server, &mut client);

    client.on_peer_info(SERVER).unwrap();
    let client_failure = failure(client.drain_events()).unwrap();
    assert_eq!(
        client_failure.message,
        "Mod Difficulty Scaler requires maximum 2.0.0. Installed is version 3.0.0."
    );
}

#[test]
fn test_missing_mod_and_unknown_server_mod() {
    let mut server = host(&[CLIENT]);
    server.add_version_check(scaler("2.0.0")).unwrap();
    server
        .add_version_check(VersionCheck::new("org.doors").with_current_version("1.0.0"))
        .unwrap();
    let mut client = host(&[SERVER]);
    client.add_version_check(scaler("1.5.0")).unwrap();
    connect(&mut server, &mut client);

    server.on_peer_info(CLIENT).unwrap();
    let server_failure = failure(server.drain_events()).unwrap();
    assert_eq!(server_failure.checks.len(), 2);
    assert!(server_failure.message.contains("Mod org.doors requires minimum 1.0.0. It is not installed."));

    client.on_peer_info(SERVER).unwrap();
    let client_failure = failure(client.drain_events()).unwrap();
    let lines: Vec<_> = client_failure.message.lines().collect();
    assert_eq!(
        lines,
        vec![
            "Mod Difficulty Scaler requires minimum 2.0.0. Installed is version 1.5.0.",
            "org.doors (Version: 1.0.0)",
        ]
    );
}

#[test]
fn test_optional_client_mod_is_not_announced() {
    let mut server = host(&[CLIENT]);
    let mut client = host(&[SERVER]);
    client
        .add_version_check(
            VersionCheck::new("client.minimap")
                .with_current_version("0.4.0")
                .with_mod_required(false),
        )
        .unwrap();
    connect(&mut server, &mut client);

    assert!(server.negotiator().not_processed().is_empty());
    server.on_peer_info(CLIENT).unwrap();
    client.on_peer_info(SERVER).unwrap();
    assert!(client.drain_events().contains(&HostEvent::VersionMatched { peer: SERVER }));
}

#[test]
fn test_fallback_consumes_unknown_handshake() {
    let mut server = host(&[CLIENT]);
    server
        .add_version_check(VersionCheck::new("org.doors").with_current_version("1.0.0"))
        .unwrap();
    let mut client = host(&[SERVER]);
    client
        .negotiator_mut()
        .set_fallback(Box::new(|_: PeerId, handshake: &Handshake| handshake.name == "org.doors"));
    connect(&mut server, &mut client);

    assert!(client.negotiator().not_processed().is_empty());
}
