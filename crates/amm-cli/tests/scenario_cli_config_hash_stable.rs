//! Scenario: `amm config-hash` is stable and layer-sensitive
//!
//! GREEN when:
//! - Two runs over the same file print the same 64-hex `config_hash`.
//! - An override layer changes the hash.

use assert_cmd::Command;

const DEALER_YAML: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/dealer.yaml");

fn config_hash(paths: &[&str]) -> String {
    let out = Command::cargo_bin("amm")
        .expect("amm binary")
        .arg("config-hash")
        .args(paths)
        .output()
        .expect("run amm");
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout).to_string();
    stdout
        .lines()
        .find_map(|l| l.strip_prefix("config_hash="))
        .expect("config_hash line")
        .to_string()
}

#[test]
fn hash_is_stable_and_layer_sensitive() -> anyhow::Result<()> {
    let a = config_hash(&[DEALER_YAML]);
    let b = config_hash(&[DEALER_YAML]);
    assert_eq!(a, b);
    assert_eq!(a.len(), 64);
    assert!(a.chars().all(|c| c.is_ascii_hexdigit()));

    let dir = tempfile::tempdir()?;
    let overlay = dir.path().join("override.yaml");
    std::fs::write(&overlay, "curve:\n  k: 1.0e-9\n")?;
    let overlay_s = overlay.to_string_lossy().to_string();

    let c = config_hash(&[DEALER_YAML, &overlay_s]);
    assert_ne!(a, c);
    Ok(())
}
