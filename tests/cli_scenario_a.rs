use assert_cmd::prelude::*;
use color_eyre::Result;
use std::path::Path;
use std::process::Command;

const KRANE_CONFIG: &str = "/etc/krane/krane.toml";

#[test]
fn test_krane_status_output() -> Result<()> {
    // Run the krane command with no arguments
    let mut cmd = Command::cargo_bin("krane")?;
    let output = cmd.output().expect("Failed to execute krane command");

    assert!(
        output.status.success(),
        "krane command failed. Stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout_str = String::from_utf8_lossy(&output.stdout);

    // Status line depends on whether a config file is present
    let is_configured = Path::new(KRANE_CONFIG).exists();
    if is_configured {
        assert!(
            stdout_str.contains("Status: Configured"),
            "Missing configured status"
        );
    } else {
        assert!(
            stdout_str.contains("Status: Not configured"),
            "Missing status message"
        );
    }
    assert!(stdout_str.contains("Config:"), "Missing config path");

    // Always check for help text
    assert!(stdout_str.contains("Usage: krane"), "Missing usage text");
    assert!(stdout_str.contains("serve"), "Missing serve command");
    assert!(stdout_str.contains("recover"), "Missing recover command");
    assert!(stdout_str.contains("status"), "Missing status command");

    Ok(())
}

#[test]
fn test_krane_recover_on_empty_store() -> Result<()> {
    let mut cmd = Command::cargo_bin("krane")?;
    let output = cmd
        .arg("recover")
        .output()
        .expect("Failed to execute krane recover");

    assert!(output.status.success());
    let stdout_str = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout_str.contains("Recovered: 0 clusters"),
        "Missing recovery report"
    );
    Ok(())
}
