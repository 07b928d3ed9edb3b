//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable that drives one full context lifecycle
//!   against the process-wide shared manager.
//! - Keep output deterministic for quick local sanity checks.

use localstore_core::{core_version, shared_manager, ManagerStatus};

fn main() {
    let manager = shared_manager();
    println!("localstore_core version={}", core_version());
    print_status("boot", &manager.status());

    if let Err(err) = manager.initialize() {
        eprintln!("initialize failed: {err}");
        std::process::exit(1);
    }
    print_status("initialized", &manager.status());

    if let Err(err) = manager.clear() {
        eprintln!("clear failed: {err}");
        std::process::exit(1);
    }
    print_status("cleared", &manager.status());
}

fn print_status(step: &str, status: &ManagerStatus) {
    match serde_json::to_string(status) {
        Ok(json) => println!("step={step} status={json}"),
        Err(err) => eprintln!("step={step} status serialization failed: {err}"),
    }
}
