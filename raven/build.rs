use std::env;
use std::process::Command;

/// Emits the version of the compiler building this crate, for the `runtime` context.
fn emit_rustc_version() {
    let rustc = env::var("RUSTC").unwrap_or_else(|_| "rustc".to_owned());

    let version = Command::new(rustc)
        .arg("--version")
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_owned())
        .unwrap_or_default();

    println!("cargo:rustc-env=RAVEN_RUSTC_VERSION={version}");
}

fn main() {
    emit_rustc_version();
    println!("cargo:rerun-if-env-changed=RUSTC");
    println!("cargo:rerun-if-changed=build.rs");
}
