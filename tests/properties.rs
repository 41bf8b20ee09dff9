//! Engine-wide properties over a schema covering every value kind

use pico_settings::core::settings::codec;
use pico_settings::core::settings::store::legacy_tag;
use pico_settings::core::settings::{
    EngineConfig, Identity, MemoryStore, Namespace, RestartTrigger, Schema, Setting, SettingFlags,
    Settings, StatePublisher, Transport,
};
use serde_json::json;

static SETTINGS: &[Setting] = &[
    Setting::unsigned("count", 2, "0"),
    Setting::signed("offset", 2, "-5").live(),
    Setting::unsigned("volts", 2, "12.50").decimal(2).live(),
    Setting::signed("trim", 1, "-0.5").decimal(1).live(),
    Setting::unsigned("gpio", 1, "4").flag_chars("IN").live(),
    Setting::unsigned("led", 1, "I2").flag_chars("I").leading_flags().live(),
    Setting::unsigned("pin", 1, "").sentinel().live(),
    Setting::signed("sda", 1, "-3").sentinel().live(),
    Setting::unsigned("mask", 2, "beef").hex().live(),
    Setting::unsigned("serial", 8, "18446744073709551615").live(),
    Setting::bit("debug", "false").live(),
    Setting::bit("relay", "1,0,1").array(3).live(),
    Setting::unsigned("chan", 1, "1,2,3").array(3).live(),
    Setting::string("motd", 40, "say \"hi\" \u{263A}").live(),
    Setting::heap_string("banner", "welcome").live(),
    Setting::octets("mac", 6, "02a1b2c3d4e5").hex().device().live(),
    Setting::octets("raw", 4, "").live(),
    Setting::blob("cert", "AQIDBA==").base64().live(),
    Setting::blob("empty", "").base64().live(),
    Setting::unsigned("level", 1, "3").fix().live(),
    Setting::string("wifi.ssid", 32, "home").group(1).live(),
    Setting::unsigned("wifi.chan", 1, "6").group(1).live(),
    Setting::string("wifi.pass", 32, "").group(1).secret().live(),
    Setting::string("token", 32, "").secret(),
    Setting::unsigned("ports", 2, "").array(5),
    Setting::unsigned("one", 1, "9").array(1),
];

#[derive(Default)]
struct Restarts {
    count: usize,
}

impl RestartTrigger for Restarts {
    fn schedule_restart(&mut self, _reason: &str, _delay_secs: u32) {
        self.count += 1;
    }
}

#[derive(Default)]
struct Capture {
    documents: Vec<Vec<u8>>,
}

impl Transport for Capture {
    fn publish(&mut self, _topic: &str, payload: &[u8], _retain: bool) {
        self.documents.push(payload.to_vec());
    }
}

fn boot(store: MemoryStore) -> Settings<MemoryStore> {
    let mut settings = Settings::new(
        Schema::new(SETTINGS).unwrap(),
        store,
        Identity::new("0a0b0c", "props"),
        EngineConfig::default(),
    )
    .unwrap();
    let report = settings.boot();
    assert_eq!(report.errors, 0);
    settings
}

fn publish_all(settings: &Settings<MemoryStore>) -> Vec<Vec<u8>> {
    let mut capture = Capture::default();
    StatePublisher::<128>::new()
        .publish(settings, &mut capture)
        .unwrap();
    capture.documents
}

#[test]
fn defaults_round_trip_through_text() {
    let settings = boot(MemoryStore::new());

    for setting in SETTINGS {
        for slot in 0..setting.slots() {
            let raw = settings.raw(setting.name, slot).unwrap();
            let text = settings.text(setting.name, slot).unwrap();
            assert_eq!(
                codec::parse(setting, &text).unwrap(),
                raw,
                "{}[{}] via {:?}",
                setting.name,
                slot,
                text
            );
        }
    }
}

#[test]
fn sentinel_bit_tracks_supplied_text() {
    for setting in SETTINGS
        .iter()
        .filter(|s| s.flags.contains(SettingFlags::SET))
    {
        let top = 1u64 << (setting.size as u32 * 8 - 1);
        for text in ["0", "1", "-1", "7"] {
            if let Ok(raw) = codec::parse(setting, text) {
                assert_ne!(codec::unsigned_value(&raw) & top, 0, "{} {:?}", setting.name, text);
            }
        }
        let raw = codec::parse(setting, "").unwrap();
        assert_eq!(codec::unsigned_value(&raw) & top, 0);
    }
}

#[test]
fn same_request_twice_writes_nothing() {
    let mut settings = boot(MemoryStore::new());
    let mut restarts = Restarts::default();
    let request = json!({
        "count": 7,
        "offset": -9,
        "volts": "3.3",
        "gpio": "12N",
        "pin": 0,
        "relay": [false, true],
        "chan": "4,5",
        "motd": "hello",
        "mac": "020000000001",
        "cert": "BQY=",
        "wifi": { "ssid": "lab", "pass": "pw" },
        "ports": [80, 443]
    });

    settings.apply(&request, &mut restarts).unwrap();
    settings.store_mut().reset_counters();

    let report = settings.apply(&request, &mut restarts).unwrap();
    assert_eq!(report.changed + report.erased, 0);
    assert_eq!(settings.store().write_count(), 0);
}

#[test]
fn null_resets_every_array_slot() {
    let mut settings = boot(MemoryStore::new());
    let mut restarts = Restarts::default();

    settings
        .apply(
            &json!({ "relay": [0, 1, 0], "chan": [7, 8, 9], "one": [1] }),
            &mut restarts,
        )
        .unwrap();
    settings
        .apply(&json!({ "relay": null, "chan": null, "one": null }), &mut restarts)
        .unwrap();

    for (name, defaults) in [("relay", &[1u64, 0, 1][..]), ("chan", &[1, 2, 3]), ("one", &[9])] {
        for (slot, default) in defaults.iter().enumerate() {
            let value = match name {
                "relay" => u64::from(settings.bit(name, slot).unwrap()),
                _ => settings.unsigned(name, slot).unwrap(),
            };
            assert_eq!(value, *default, "{}[{}]", name, slot);
        }
    }

    // Non-live: the reset undoes the pending values, a second reset erases
    settings
        .apply(&json!({ "ports": [1, 2, 3, 4, 5] }), &mut restarts)
        .unwrap();
    settings.apply(&json!({ "ports": null }), &mut restarts).unwrap();
    for slot in 0..5 {
        assert_eq!(settings.pending("ports", slot), None);
    }

    let report = settings.apply(&json!({ "ports": null }), &mut restarts).unwrap();
    assert_eq!(report.erased, 5);
    for slot in 0..5 {
        let tag = [b'p', b'o', b'r', b't', b's', 0x80 | slot as u8];
        assert!(!settings.store().contains(Namespace::Application, &tag));
    }
}

#[test]
fn one_restart_per_request() {
    for k in 1..=3 {
        let mut settings = boot(MemoryStore::new());
        let mut restarts = Restarts::default();
        let request = match k {
            1 => json!({ "count": 1 }),
            2 => json!({ "count": 1, "token": "a" }),
            _ => json!({ "count": 1, "token": "a", "ports": [1] }),
        };

        let report = settings.apply(&request, &mut restarts).unwrap();
        assert!(report.restart);
        assert_eq!(restarts.count, 1, "{} non-live changes", k);
    }
}

#[test]
fn published_state_applies_without_writes() {
    let mut settings = boot(MemoryStore::new());
    let mut restarts = Restarts::default();
    settings
        .apply(
            &json!({
                "offset": -300,
                "trim": "1.2",
                "led": "5",
                "sda": "",
                "relay": [true, true, false],
                "motd": "tab\there",
                "raw": "abcd",
                "wifi": { "ssid": "x", "chan": 11, "pass": "secret" }
            }),
            &mut restarts,
        )
        .unwrap();

    // Restart so the changes are live
    let mut settings = boot(settings.into_store());
    settings.store_mut().reset_counters();

    let documents = publish_all(&settings);
    assert!(documents.len() > 1);

    for document in documents {
        let response = settings.handle_request(&document, &mut restarts);
        assert_eq!(response, "", "{}", String::from_utf8_lossy(&document));
    }
    assert_eq!(settings.store().write_count(), 0);
    assert_eq!(settings.string("wifi.pass", 0).as_deref(), Some("secret"));
}

#[test]
fn echoed_state_keeps_pending_changes() {
    let mut settings = boot(MemoryStore::new());
    let mut restarts = Restarts::default();
    settings
        .apply(
            &json!({ "count": 42, "ports": [8080], "offset": 11 }),
            &mut restarts,
        )
        .unwrap();
    settings.store_mut().reset_counters();

    for document in publish_all(&settings) {
        let response = settings.handle_request(&document, &mut restarts);
        assert_eq!(response, "", "{}", String::from_utf8_lossy(&document));
    }

    assert_eq!(settings.store().write_count(), 0);
    assert_eq!(settings.pending("count", 0), Some(&[0u8, 42][..]));
    assert_eq!(settings.pending("ports", 0), Some(&[0x1Fu8, 0x90][..]));
    assert_eq!(restarts.count, 1);

    let settings = boot(settings.into_store());
    assert_eq!(settings.unsigned("count", 0), Some(42));
    assert_eq!(settings.unsigned("ports", 0), Some(8080));
}

#[test]
fn requests_apply_in_document_order() {
    let mut settings = boot(MemoryStore::new());
    let mut restarts = Restarts::default();

    let response = settings.handle_request(
        br#"{"zzz":1,"motd":"x","token":"0123456789012345678901234567890123"}"#,
        &mut restarts,
    );
    assert_eq!(response, "Not found");

    let response = settings.handle_request(
        br#"{"wifi":{"chan":"x","nope":1},"aaa":1}"#,
        &mut restarts,
    );
    assert_eq!(response, "Bad number");
    assert_eq!(settings.string("motd", 0).as_deref(), Some("x"));
}

#[test]
fn legacy_keys_never_return() {
    let mut store = MemoryStore::new();
    for slot in 0..3 {
        let tag = legacy_tag("chan", slot).unwrap();
        store.insert_raw(Namespace::Application, &tag, &[20 + slot as u8]);
    }
    store.insert_raw(Namespace::Application, b"ports9", &[1, 1]);

    let settings = boot(store);
    assert_eq!(settings.unsigned("chan", 2), Some(22));

    let store = settings.store();
    for slot in 0..3 {
        let tag = legacy_tag("chan", slot).unwrap();
        assert!(!store.contains(Namespace::Application, &tag));
    }
    assert!(!store.contains(Namespace::Application, b"ports9"));

    let mut settings = boot(settings.into_store());
    let report = settings.boot();
    assert_eq!(report.migrated, 0);
    assert_eq!(report.zapped, 0);
    assert_eq!(settings.unsigned("chan", 0), Some(20));
}
