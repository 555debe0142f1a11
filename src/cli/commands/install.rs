use crate::colors::*;
use crate::config::Config;
use crate::fetch::HttpRegistry;
use crate::installer::Installer;
use crate::manifest;
use crate::resolver::PackageSpec;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

/// Requests for one install. Explicit specs are installed as given and the
/// manifest is not consulted; with no specs the manifest's dependencies and
/// devDependencies are installed.
pub(crate) fn collect_requests(packages: &[String], manifest_path: &Path) -> Result<Vec<PackageSpec>> {
    if !packages.is_empty() {
        return packages
            .iter()
            .map(|raw| Ok(PackageSpec::parse(raw)?))
            .collect();
    }
    let manifest = manifest::load(manifest_path)?;
    Ok(manifest.requested_specs()?)
}

pub(crate) fn format_status(kind: &str, detail: &str) -> String {
    let color = match kind {
        "resolving" => C_CYAN,
        "installing" => C_MAGENTA,
        "added" => C_GREEN,
        "warning" => C_YELLOW,
        _ => C_DIM,
    };
    format!("{C_GRAY}[hoistpm]{C_RESET} {color}{kind}{C_RESET} {detail}")
}

pub(crate) fn cmd_install(packages: &[String]) -> Result<()> {
    let project_root = std::env::current_dir().context("determine project directory")?;
    let specs = collect_requests(packages, &project_root.join("package.json"))?;
    if specs.is_empty() {
        println!("{}", format_status("added", "nothing to install"));
        return Ok(());
    }

    let config = Config::load().context("load configuration")?;
    let client = Arc::new(HttpRegistry::new(config.registry.clone())?);
    let installer = Installer::new(config, client);

    let listed: Vec<String> = specs.iter().map(|s| s.to_string()).collect();
    println!("{}", format_status("resolving", &listed.join(" ")));
    let report = installer.install(&specs, &project_root)?;

    for id in &report.plan.roots {
        println!("{C_GRAY}[hoistpm]{C_RESET} {C_GREEN}+{C_RESET} {id}");
    }
    let unresolved = report.plan.tree.unresolved_edges(&report.plan.graph).len();
    if unresolved > 0 {
        println!("{}", format_status("warning", &format!("{unresolved} dependency edges not reachable")));
    }
    println!(
        "{}",
        format_status(
            "added",
            &format!(
                "{} packages ({} directories) in {:.2?}",
                report.closure.table.len(),
                report.placed,
                report.elapsed
            )
        )
    );
    Ok(())
}
