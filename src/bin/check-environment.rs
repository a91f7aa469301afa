//! Tool to check which process monitor methods this host supports

use std::process::exit;

use policyd::config::ProcMonitorMethod;
use policyd::subsystems::host::{host_capabilities, IssueSeverity};

fn main() {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    println!("=== policyd Environment Check ===\n");

    let caps = host_capabilities();

    println!(
        "Kernel release: {}",
        caps.kernel_release.as_deref().unwrap_or("unknown")
    );
    println!("Running as root: {}", if caps.is_root { "Yes" } else { "No" });

    println!("\nProcess monitor methods:");
    for method in ProcMonitorMethod::ALL {
        let status = if caps.supports(method) { "available" } else { "unavailable" };
        println!("  - {:7} {}", method, status);
    }

    let issues = caps.issues();

    if !issues.is_empty() {
        println!("\nEnvironment issues:");

        let mut has_errors = false;

        for issue in &issues {
            let prefix = match issue.severity {
                IssueSeverity::Info => "INFO",
                IssueSeverity::Warning => "WARNING",
                IssueSeverity::Error => {
                    has_errors = true;
                    "ERROR"
                }
            };

            println!("  [{:7}] {}", prefix, issue.message);
            if let Some(resolution) = &issue.resolution {
                println!("            {}", resolution);
            }
        }

        if has_errors {
            println!("\nCritical issues were found. Please resolve them before starting the daemon.");
            exit(1);
        }
    } else {
        println!("\nNo issues found.");
    }

    println!("\n=== Summary ===");
    let methods: Vec<_> = caps.available_methods().iter().map(|m| m.to_string()).collect();
    println!("Usable process monitor methods: {}", methods.join(", "));
}
