//! Command line and environment configuration.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;

use crate::layout::paged::{CellGeometry, DEFAULT_ROWS_PER_PAGE};
use crate::models::SourceProperties;
use crate::scanner::catalog::{SourceSpec, DEFAULT_CATALOG_TIMEOUT};
use crate::video::probe::DEFAULT_PROBE_TIMEOUT;

pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1000;

pub const USAGE: &str = "\
Usage: medialink -i <catalog> -s <dir>... -d <dir>... [options]

  -i, --interface <exe>          Source catalog executable
  -s, --source <dir>             Source of media to link (repeatable)
  -r, --read-only-source <dir>   Source shown for context only (repeatable)
  -d, --destination <dir>        Destination project directory (repeatable)
  -j, --jobs <n>                 Preload workers (default: available threads)
  -m, --map-database <file>      SQLite tile cache for track maps
  -O, --force-offline            Never fetch tiles from the network
      --viewport-width <px>      Grid width used for layout (default 1000)
      --play <file>              Play a multi-part video after loading
      --console                  Read grid and player commands from stdin
  -h, --help                     Print this help
  -v, --version                  Print the version

Environment: MEDIALINK_FFMPEG, MEDIALINK_FFPROBE, MEDIALINK_EXIFTOOL,
MEDIALINK_DECODE_TIMEOUT_MS, MEDIALINK_CATALOG_TIMEOUT_MS, MEDIALINK_OFFLINE,
RUST_LOG";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub catalog: PathBuf,
    /// Selectable sources first, then read-only ones, in command line order.
    pub sources: Vec<SourceSpec>,
    pub destinations: Vec<PathBuf>,
    pub jobs: usize,
    pub map_database: Option<PathBuf>,
    pub offline: bool,
    pub viewport_width: u32,
    pub rows_per_page: usize,
    pub cell: CellGeometry,
    pub play: Option<PathBuf>,
    pub console: bool,
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub exiftool: PathBuf,
    pub decode_timeout: Duration,
    pub catalog_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Run(Config),
    Help,
    Version,
}

fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
}

/// `<data dir>/tiles.sqlite` when it exists.
fn default_map_database() -> Option<PathBuf> {
    let dirs = ProjectDirs::from("", "", "medialink")?;
    let path = dirs.data_dir().join("tiles.sqlite");
    path.is_file().then_some(path)
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

impl Config {
    /// Parse the process arguments and environment.
    pub fn from_env() -> Result<Command> {
        Self::parse(env::args().skip(1), |key| env::var(key).ok())
    }

    pub fn parse<I, E>(args: I, var: E) -> Result<Command>
    where
        I: IntoIterator<Item = String>,
        E: Fn(&str) -> Option<String>,
    {
        let mut catalog: Option<PathBuf> = None;
        let mut sources: Vec<PathBuf> = Vec::new();
        let mut read_only: Vec<PathBuf> = Vec::new();
        let mut destinations: Vec<PathBuf> = Vec::new();
        let mut jobs: Option<usize> = None;
        let mut map_database: Option<PathBuf> = None;
        let mut offline = false;
        let mut viewport_width = DEFAULT_VIEWPORT_WIDTH;
        let mut play: Option<PathBuf> = None;
        let mut console = false;

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => return Ok(Command::Help),
                "-v" | "--version" => return Ok(Command::Version),
                "-i" | "--interface" => {
                    let value = args.next().context("Missing value for --interface")?;
                    catalog = Some(PathBuf::from(value));
                }
                "-s" | "--source" => {
                    let value = args.next().context("Missing value for --source")?;
                    sources.push(PathBuf::from(value));
                }
                "-r" | "--read-only-source" => {
                    let value = args
                        .next()
                        .context("Missing value for --read-only-source")?;
                    read_only.push(PathBuf::from(value));
                }
                "-d" | "--destination" => {
                    let value = args.next().context("Missing value for --destination")?;
                    destinations.push(PathBuf::from(value));
                }
                "-j" | "--jobs" => {
                    let value = args.next().context("Missing value for --jobs")?;
                    jobs = Some(
                        value
                            .parse::<usize>()
                            .context("Failed to parse --jobs as a positive integer")?,
                    );
                }
                "-m" | "--map-database" => {
                    let value = args.next().context("Missing value for --map-database")?;
                    map_database = Some(PathBuf::from(value));
                }
                "-O" | "--force-offline" => offline = true,
                "--no-force-offline" => offline = false,
                "--viewport-width" => {
                    let value = args.next().context("Missing value for --viewport-width")?;
                    viewport_width = value
                        .parse::<u32>()
                        .context("Failed to parse --viewport-width as a pixel count")?;
                }
                "--play" => {
                    let value = args.next().context("Missing value for --play")?;
                    play = Some(PathBuf::from(value));
                }
                "--console" => console = true,
                other => bail!("Unrecognised argument: {other}"),
            }
        }

        let catalog = catalog.context("--interface <exe> is required")?;
        if sources.is_empty() {
            bail!("At least one --source <dir> is required");
        }
        if destinations.is_empty() {
            bail!("At least one --destination <dir> is required");
        }
        let jobs = jobs.unwrap_or_else(default_jobs);
        if jobs == 0 {
            bail!("--jobs must be greater than 0");
        }

        let decode_timeout = match var("MEDIALINK_DECODE_TIMEOUT_MS") {
            Some(ms) => Duration::from_millis(
                ms.parse::<u64>()
                    .context("Failed to parse MEDIALINK_DECODE_TIMEOUT_MS as milliseconds")?,
            ),
            None => DEFAULT_PROBE_TIMEOUT,
        };
        let catalog_timeout = match var("MEDIALINK_CATALOG_TIMEOUT_MS") {
            Some(ms) => Duration::from_millis(
                ms.parse::<u64>()
                    .context("Failed to parse MEDIALINK_CATALOG_TIMEOUT_MS as milliseconds")?,
            ),
            None => DEFAULT_CATALOG_TIMEOUT,
        };
        let tool = |key: &str, default: &str| PathBuf::from(var(key).unwrap_or_else(|| default.into()));

        let sources = sources
            .into_iter()
            .map(|path| SourceSpec {
                path,
                properties: SourceProperties::Normal,
            })
            .chain(read_only.into_iter().map(|path| SourceSpec {
                path,
                properties: SourceProperties::ReadOnly,
            }))
            .collect();

        Ok(Command::Run(Config {
            catalog,
            sources,
            destinations,
            jobs,
            map_database: map_database.or_else(default_map_database),
            offline: offline || var("MEDIALINK_OFFLINE").is_some_and(|v| is_truthy(&v)),
            viewport_width,
            rows_per_page: DEFAULT_ROWS_PER_PAGE,
            cell: CellGeometry::default(),
            play,
            console,
            ffmpeg: tool("MEDIALINK_FFMPEG", "ffmpeg"),
            ffprobe: tool("MEDIALINK_FFPROBE", "ffprobe"),
            exiftool: tool("MEDIALINK_EXIFTOOL", "exiftool"),
            decode_timeout,
            catalog_timeout,
        }))
    }

    /// Check that every named path exists with the right kind.
    pub fn validate(&self) -> Result<()> {
        check_executable(&self.catalog)?;
        for source in &self.sources {
            if !source.path.is_dir() {
                bail!("Source is not a directory: {}", source.path.display());
            }
        }
        for destination in &self.destinations {
            if !destination.is_dir() {
                bail!("Destination is not a directory: {}", destination.display());
            }
        }
        if let Some(db) = &self.map_database {
            if !db.is_file() {
                bail!("Map database does not exist: {}", db.display());
            }
        }
        Ok(())
    }
}

fn check_executable(path: &Path) -> Result<()> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("Catalog executable not found: {}", path.display()))?;
    if !meta.is_file() {
        bail!("Catalog is not a file: {}", path.display());
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if meta.permissions().mode() & 0o111 == 0 {
            bail!("Catalog is not executable: {}", path.display());
        }
    }
    Ok(())
}
