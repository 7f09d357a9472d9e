//! `toolshed validate` - Exercise the Configuration
//!
//! Loads the config, then checks everything the server would touch at
//! runtime: resource roots, the audit directory, the auth table and the
//! rate-limit buckets. Prints one line per check; returns the number of
//! failures so the caller can exit 0/1.

use crate::config::FileConfig;
use anyhow::Result;
use std::path::Path;

struct Report {
    failures: usize,
}

impl Report {
    fn new() -> Self {
        Self { failures: 0 }
    }

    fn ok(&mut self, what: &str) {
        println!("  ok    {}", what);
    }

    fn fail(&mut self, what: &str) {
        println!("  FAIL  {}", what);
        self.failures += 1;
    }

    fn check(&mut self, passed: bool, what: &str) {
        if passed {
            self.ok(what);
        } else {
            self.fail(what);
        }
    }
}

/// Run every check. Returns the number of failures.
pub fn run(config_path: Option<&Path>) -> Result<usize> {
    let config = FileConfig::load(config_path)?;
    let mut report = Report::new();

    println!("Validating configuration...");

    check_roots(&config, &mut report);
    check_audit(&config, &mut report);
    check_auth(&config, &mut report);
    check_rate_limits(&config, &mut report);
    check_cache(&config, &mut report);

    if report.failures == 0 {
        println!("All checks passed");
    } else {
        println!("{} check(s) failed", report.failures);
    }
    Ok(report.failures)
}

fn check_roots(config: &FileConfig, report: &mut Report) {
    if config.server.allowed_roots.is_empty() {
        report.ok("resource roots: none configured (serving working directory)");
        return;
    }
    for root in &config.server.allowed_roots {
        report.check(
            root.is_dir(),
            &format!("resource root exists: {}", root.display()),
        );
    }
}

fn check_audit(config: &FileConfig, report: &mut Report) {
    if !config.audit.enabled {
        report.ok("audit: disabled");
        return;
    }
    let directory = config
        .audit
        .directory
        .clone()
        .unwrap_or_else(|| toolshed_logging::toolshed_home().join("audit"));
    report.check(
        audit_dir_writable(&directory),
        &format!("audit directory writable: {}", directory.display()),
    );
    report.check(
        config.audit.retention_days > 0,
        "audit retention_days is positive",
    );
}

fn audit_dir_writable(directory: &Path) -> bool {
    if std::fs::create_dir_all(directory).is_err() {
        return false;
    }
    let probe = directory.join(".toolshed-validate");
    match std::fs::write(&probe, b"probe") {
        Ok(()) => {
            let _ = std::fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}

fn check_auth(config: &FileConfig, report: &mut Report) {
    if !config.auth.enabled {
        report.ok("auth: disabled");
        return;
    }
    report.check(
        !(config.auth.require_authentication && config.auth.keys.is_empty()),
        "auth: require_authentication has at least one key",
    );

    let mut seen = std::collections::HashSet::new();
    let unique = config.auth.keys.iter().all(|k| seen.insert(&k.key));
    report.check(unique, "auth: API keys are unique");

    for key in &config.auth.keys {
        report.check(
            !key.key.is_empty() && !key.name.is_empty(),
            &format!("auth: key entry '{}' is complete", key.name),
        );
    }
}

fn check_rate_limits(config: &FileConfig, report: &mut Report) {
    if !config.rate_limit.enabled {
        report.ok("rate limit: disabled");
        return;
    }
    for (tool, bucket) in &config.rate_limit.buckets {
        report.check(
            bucket.capacity > 0 && bucket.refill_per_second > 0.0,
            &format!("rate limit bucket for '{}' is positive", tool),
        );
    }
}

fn check_cache(config: &FileConfig, report: &mut Report) {
    if !config.cache.enabled {
        report.ok("cache: disabled");
        return;
    }
    report.check(config.cache.max_entries > 0, "cache max_entries is positive");
}
