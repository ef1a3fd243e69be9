// SPDX-License-Identifier: MIT

use super::*;

#[yare::parameterized(
    https      = { "https://ts1.x1.europe.example.com/dorf1.php", "ts1.x1.europe.example.com" },
    http       = { "http://play.example.org", "play.example.org" },
    with_port  = { "https://game.example.com:8443/build.php?id=3", "game.example.com" },
    uppercase  = { "https://TS2.Example.COM/", "ts2.example.com" },
    no_scheme  = { "server.example.net/path", "server.example.net" },
    with_creds = { "https://user:pw@host.example.com/", "host.example.com" },
    odd_chars  = { "https://spiel_welt.example.de/", "spiel_welt.example.de" },
)]
fn key_from_url(url: &str, expected: &str) {
    assert_eq!(ServerKey::from_url(url).as_str(), expected);
}

#[test]
fn empty_url_is_unknown() {
    assert_eq!(ServerKey::from_url(""), ServerKey::unknown());
    assert!(ServerKey::from_url("https:///path").is_unknown());
}

#[test]
fn key_serde_is_transparent() {
    let key = ServerKey::new("ts1.example.com");
    let json = serde_json::to_string(&key).unwrap();
    assert_eq!(json, "\"ts1.example.com\"");
    let parsed: ServerKey = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, key);
}

#[test]
fn registry_touch_creates_and_updates() {
    let mut registry = ServerRegistry::default();
    let key = ServerKey::new("s1.example.com");

    registry.touch(&key, 1_000);
    assert_eq!(registry.servers[&key].last_used_at_ms, 1_000);
    assert_eq!(registry.servers[&key].label, "s1.example.com");

    registry.touch(&key, 2_000);
    assert_eq!(registry.servers.len(), 1);
    assert_eq!(registry.servers[&key].last_used_at_ms, 2_000);
}
