use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "license-fetchr",
    about = "Collect the license texts of a .NET project's NuGet packages",
    version
)]
pub struct Cli {
    /// Project, solution or directory to scan
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Config file [default: ./.license-fetchr/config.toml, fallback ~/.config/license-fetchr/config.toml]
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory the license texts are written to [default: <project>/licenses]
    #[arg(long, value_name = "DIR")]
    pub licenses: Option<PathBuf>,

    /// NuGet global packages folder [default: $NUGET_PACKAGES or ~/.nuget/packages]
    #[arg(long, value_name = "DIR")]
    pub packages_dir: Option<PathBuf>,

    /// Report format
    #[arg(long, default_value = "terminal", value_name = "FORMAT")]
    pub report: ReportFormat,

    /// Print the SPDX identifiers of the reference catalog and exit
    #[arg(long)]
    pub list_catalog: bool,

    /// Exit with status 1 when any package is left without a resolved license
    #[arg(long)]
    pub strict: bool,

    /// Show all packages (not just unresolved ones) and debug logs
    #[arg(short, long)]
    pub verbose: bool,

    /// Only print summary line
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Clone, clap::ValueEnum)]
pub enum ReportFormat {
    Terminal,
    Json,
}
