//! Build settings the runtime relies on.
//!
//! Tool and observer panics are contained with `catch_unwind`, which only
//! works when panics unwind. Test binaries always unwind, so the shipped
//! profiles are checked from the manifest.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use toml::Value;

fn manifest() -> Value {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml");
    let raw = std::fs::read_to_string(path).unwrap();
    raw.parse::<Value>().unwrap()
}

fn panic_strategy(profiles: &toml::Table, name: &str) -> Option<String> {
    let profile = profiles.get(name)?.as_table()?;
    if let Some(strategy) = profile.get("panic").and_then(Value::as_str) {
        return Some(strategy.to_string());
    }
    let parent = profile.get("inherits").and_then(Value::as_str)?;
    panic_strategy(profiles, parent)
}

#[test]
fn shipped_profiles_unwind_on_panic() {
    let manifest = manifest();
    let profiles = manifest
        .get("profile")
        .and_then(Value::as_table)
        .cloned()
        .unwrap_or_default();

    for name in profiles.keys() {
        let strategy = panic_strategy(&profiles, name);
        assert_ne!(
            strategy.as_deref(),
            Some("abort"),
            "profile `{name}` aborts on panic, so a panicking tool would kill the process"
        );
    }
    assert_eq!(
        panic_strategy(&profiles, "release").as_deref(),
        Some("unwind")
    );
}
