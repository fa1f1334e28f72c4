//! `license-fetchr`: collect the license texts of a .NET project's NuGet packages.
//!
//! # Flow
//! 1. Parse CLI arguments ([`cli`]) and load config ([`config::load_config`]).
//! 2. Build the reference catalog ([`catalog`]), built-in texts plus an optional directory.
//! 3. Find projects and their package identities ([`package::discovery`]).
//! 4. Read each package's manifest from the global packages folder ([`package`]).
//! 5. Resolve license files, SPDX expressions and legacy URLs ([`resolver`]); every
//!    text lands once under the license folder ([`license::LicenseRegistry`]).
//! 6. Write `licenses.json` and render the requested report ([`report`]).
//! 7. Exit `0`, or `1` with `--strict` when a package is left unresolved. Fatal
//!    errors (I/O, registry contract violations) abort the run.

mod catalog;
mod cli;
mod config;
mod error;
mod fetch;
mod license;
mod models;
mod package;
mod report;
mod resolver;
mod similarity;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, warn};

use catalog::Catalog;
use cli::{Cli, ReportFormat};
use config::load_config;
use fetch::LicenseFetcher;
use license::LicenseRegistry;
use models::{Package, PackageReport};
use package::{DirectoryArchive, PackageArchive};
use resolver::LicenseResolver;

/// Packages resolved concurrently per batch.
const BATCH_SIZE: usize = 32;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_tracing(cli.verbose, cli.quiet);

    // Resolve project path
    let path = cli
        .path
        .canonicalize()
        .unwrap_or_else(|_| cli.path.clone());
    let project_dir = if path.is_file() {
        path.parent().map(Path::to_path_buf).unwrap_or_default()
    } else {
        path.clone()
    };

    let config = load_config(&project_dir, cli.config.as_deref())?;

    let mut catalog = Catalog::builtin();
    if let Some(dir) = &config.catalog.extra_dir {
        let added = catalog.load_dir(dir)?;
        debug!(dir = %dir.display(), added, total = catalog.len(), "loaded catalog texts");
    }

    if cli.list_catalog {
        let ids: Vec<&str> = catalog.ids().collect();
        println!("{}", serde_json::to_string_pretty(&ids)?);
        return Ok(());
    }

    let license_root = cli
        .licenses
        .clone()
        .unwrap_or_else(|| project_dir.join(&config.output.license_dir));
    let packages_dir = cli
        .packages_dir
        .clone()
        .or_else(|| config.nuget.resolve_packages_dir());

    // Discover projects and packages
    let projects = package::discovery::find_projects(&path)?;
    if projects.is_empty() {
        eprintln!("No .NET projects found in {}", path.display());
        std::process::exit(1);
    }

    let identities = package::discovery::discover_packages(&projects)?;
    if !cli.quiet {
        eprintln!(
            "  {} {} projects, {} packages",
            "→".cyan(),
            projects.len(),
            identities.len()
        );
    }

    let packages: Vec<Package> = identities
        .into_iter()
        .map(|identity| {
            package::load_package(packages_dir.as_deref(), identity.clone()).unwrap_or_else(|e| {
                warn!(package = %identity, error = %e, "unreadable package manifest");
                Package::new(identity)
            })
        })
        .collect();

    let registry = Arc::new(LicenseRegistry::new(Arc::new(catalog)));
    let fetcher = LicenseFetcher::new(&config.fetch)?;
    let resolver = LicenseResolver::new(registry, fetcher, license_root.clone());

    let reports = match resolve_all(&resolver, &packages, cli.quiet).await {
        Ok(reports) => reports,
        Err(e) => {
            error!(kind = e.kind(), "{e}");
            return Err(e.into());
        }
    };

    let artifacts = resolver.registry().artifacts();
    debug!(
        files = artifacts.len(),
        failed = artifacts.iter().filter(|a| !a.is_resolved()).count(),
        "license artifacts"
    );

    let summary = report::json::write_licenses_json(&license_root, &reports)?;
    debug!(path = %summary.display(), "wrote license summary");

    // Render report
    match cli.report {
        ReportFormat::Terminal => {
            report::terminal::render(&reports, &path, &license_root, cli.verbose, cli.quiet)?;
        }
        ReportFormat::Json => report::json::render(&reports)?,
    }

    if cli.strict && reports.iter().any(|r| !r.is_resolved()) {
        std::process::exit(1);
    }

    Ok(())
}

async fn resolve_all(
    resolver: &LicenseResolver,
    packages: &[Package],
    quiet: bool,
) -> Result<Vec<PackageReport>, error::ResolveError> {
    let pb = if !quiet {
        let pb = ProgressBar::new(packages.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        Some(pb)
    } else {
        None
    };

    let mut reports = Vec::with_capacity(packages.len());
    for batch in packages.chunks(BATCH_SIZE) {
        let futures: Vec<_> = batch
            .iter()
            .map(|package| async move {
                let archive = package
                    .package_dir
                    .as_ref()
                    .map(|dir| DirectoryArchive::new(dir.clone()));
                resolver
                    .resolve_package(package, archive.as_ref().map(|a| a as &dyn PackageArchive))
                    .await
            })
            .collect();

        for result in join_all(futures).await {
            reports.push(result?);
            if let Some(pb) = &pb {
                pb.inc(1);
            }
        }
    }

    if let Some(pb) = pb {
        pb.finish_with_message("Done");
    }

    Ok(reports)
}

fn setup_tracing(verbose: bool, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("license_fetchr=debug,warn")
        } else if quiet {
            EnvFilter::new("warn")
        } else {
            EnvFilter::new("license_fetchr=info,warn")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
