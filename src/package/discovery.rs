use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use tracing::{debug, warn};

use crate::models::PackageId;

const PROJECT_EXTENSIONS: [&str; 4] = ["csproj", "fsproj", "vbproj", "vcxproj"];

/// `Project("{type}") = "Name", "relative\path.csproj", "{guid}"`
static SLN_PROJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^Project\("\{[^}]+\}"\)\s*=\s*"[^"]*",\s*"([^"]+)""#)
        .expect("solution project regex must compile")
});

/// Project files reachable from `path`.
///
/// A file is taken as is. In a directory, solutions win over project files;
/// among project files the first extension present wins. Project references
/// are followed transitively.
pub fn find_projects(path: &Path) -> Result<Vec<PathBuf>> {
    let roots = if path.is_file() {
        vec![path.to_path_buf()]
    } else {
        let solutions = files_with_extension(path, "sln")?;
        if !solutions.is_empty() {
            solutions
        } else {
            let mut found = Vec::new();
            for ext in PROJECT_EXTENSIONS {
                found = files_with_extension(path, ext)?;
                if !found.is_empty() {
                    break;
                }
            }
            found
        }
    };

    let mut projects = Vec::new();
    let mut seen = HashSet::new();
    for root in roots {
        if has_extension(&root, "sln") {
            for project in parse_solution(&root)? {
                collect_project(&project, &mut projects, &mut seen);
            }
        } else {
            collect_project(&root, &mut projects, &mut seen);
        }
    }

    Ok(projects)
}

/// Package identities used by `projects`, de-duplicated by `id:version`.
pub fn discover_packages(projects: &[PathBuf]) -> Result<Vec<PackageId>> {
    let mut packages = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for project in projects {
        for package in packages_of(project)? {
            let key = format!("{}:{}", package.id.to_lowercase(), package.version.to_lowercase());
            if seen.insert(key) {
                packages.push(package);
            }
        }
    }

    Ok(packages)
}

/// `packages.config` next to the project, else `obj/project.assets.json`,
/// else the project's own `PackageReference` items.
fn packages_of(project: &Path) -> Result<Vec<PackageId>> {
    let dir = project.parent().unwrap_or(Path::new("."));

    let packages_config = dir.join("packages.config");
    if packages_config.exists() {
        return parse_packages_config(&packages_config);
    }

    let assets = dir.join("obj").join("project.assets.json");
    if assets.exists() {
        return parse_assets_file(&assets);
    }

    let content = std::fs::read_to_string(project)
        .with_context(|| format!("reading {}", project.display()))?;
    let parsed = parse_project_xml(&content);
    if parsed.sdk_style && !parsed.packages.is_empty() {
        warn!(
            project = %project.display(),
            "'{}' not found (missing nuget restore?), transitive packages are not included",
            assets.display()
        );
    }
    Ok(parsed.packages)
}

fn collect_project(path: &Path, projects: &mut Vec<PathBuf>, seen: &mut HashSet<PathBuf>) {
    let key = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    if !seen.insert(key) {
        return;
    }

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!(project = %path.display(), error = %e, "skipping unreadable project");
            return;
        }
    };
    debug!(project = %path.display(), "loaded project");
    projects.push(path.to_path_buf());

    let dir = path.parent().unwrap_or(Path::new("."));
    for reference in parse_project_xml(&content).project_references {
        collect_project(&dir.join(reference), projects, seen);
    }
}

#[derive(Debug, Default)]
struct ProjectXml {
    sdk_style: bool,
    packages: Vec<PackageId>,
    project_references: Vec<PathBuf>,
}

/// `<PackageReference Include="..." Version="..." />` (or a nested
/// `<Version>` element) and `<ProjectReference Include="..." />`.
fn parse_project_xml(content: &str) -> ProjectXml {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut result = ProjectXml::default();
    let mut buf = Vec::new();
    // PackageReference whose version comes from a child element
    let mut open_reference: Option<PackageId> = None;
    let mut in_version = false;

    loop {
        let event = reader.read_event_into(&mut buf);
        match event {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) => {
                let self_closing = matches!(event, Ok(Event::Empty(_)));
                let tag = String::from_utf8_lossy(e.name().local_name().as_ref()).into_owned();
                let mut include = String::new();
                let mut version = String::new();
                let mut sdk = false;
                for attr in e.attributes().flatten() {
                    let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
                    let val = attr.unescape_value().unwrap_or_default().into_owned();
                    match key.as_str() {
                        "Include" => include = val,
                        "Version" => version = val,
                        "Sdk" => sdk = true,
                        _ => {}
                    }
                }
                match tag.as_str() {
                    "Project" if sdk => result.sdk_style = true,
                    "Sdk" => result.sdk_style = true,
                    "PackageReference" if !include.is_empty() => {
                        let package = PackageId::new(include, version);
                        if package.version.is_empty() && !self_closing {
                            open_reference = Some(package);
                        } else {
                            result.packages.push(package);
                        }
                    }
                    "ProjectReference" if !include.is_empty() => {
                        result
                            .project_references
                            .push(include.split('\\').collect::<PathBuf>());
                    }
                    "Version" if open_reference.is_some() => in_version = true,
                    _ => {}
                }
            }
            Ok(Event::Text(ref e)) if in_version => {
                if let (Some(package), Ok(text)) = (open_reference.as_mut(), e.unescape()) {
                    package.version = text.trim().to_string();
                }
            }
            Ok(Event::End(ref e)) => {
                match e.name().local_name().as_ref() {
                    b"Version" => in_version = false,
                    b"PackageReference" => {
                        if let Some(package) = open_reference.take() {
                            result.packages.push(package);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    result
}

/// Parse `<package id="..." version="..." />` from `packages.config`.
fn parse_packages_config(path: &Path) -> Result<Vec<PackageId>> {
    let content = std::fs::read_to_string(path)?;
    let mut reader = Reader::from_str(&content);
    reader.config_mut().trim_text(true);

    let mut packages = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) => {
                let tag = String::from_utf8_lossy(e.name().local_name().as_ref()).into_owned();
                if tag == "package" {
                    let mut id = String::new();
                    let mut version = String::new();
                    for attr in e.attributes().flatten() {
                        let key =
                            String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
                        let val = attr.unescape_value().unwrap_or_default().into_owned();
                        match key.as_str() {
                            "id" => id = val,
                            "version" => version = val,
                            _ => {}
                        }
                    }
                    if !id.is_empty() {
                        packages.push(PackageId::new(id, version));
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(packages)
}

/// Libraries of type `package` from a restored `project.assets.json`.
fn parse_assets_file(path: &Path) -> Result<Vec<PackageId>> {
    let content = std::fs::read_to_string(path)?;
    let data: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("parsing {}", path.display()))?;

    let mut packages: Vec<PackageId> = data
        .get("libraries")
        .and_then(|l| l.as_object())
        .map(|libraries| {
            libraries
                .iter()
                .filter(|(_, lib)| lib.get("type").and_then(|t| t.as_str()) == Some("package"))
                .filter_map(|(key, _)| key.split_once('/'))
                .map(|(id, version)| PackageId::new(id, version))
                .collect()
        })
        .unwrap_or_default();

    packages.sort();
    Ok(packages)
}

/// Project paths listed in a `.sln` file, resolved against its directory.
fn parse_solution(path: &Path) -> Result<Vec<PathBuf>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let dir = path.parent().unwrap_or(Path::new("."));

    Ok(content
        .lines()
        .filter_map(|line| SLN_PROJECT.captures(line.trim()))
        .map(|caps| caps[1].split('\\').collect::<PathBuf>())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| PROJECT_EXTENSIONS.contains(&e))
        })
        .map(|p| dir.join(p))
        .collect())
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

fn files_with_extension(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .flatten()
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && has_extension(p, ext))
        .collect();
    files.sort();
    Ok(files)
}
