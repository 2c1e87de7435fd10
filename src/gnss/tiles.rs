//! Map tile lookup for track thumbnails.
//!
//! Order: shared in-memory LRU, the OpenStreetMap tile server (unless offline),
//! the offline tile database, and finally a flat placeholder tile. A tile
//! lookup never fails.

use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use lru::LruCache;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, trace, warn};

use crate::image_loader;

pub const TILE_SIZE: u32 = 256;

const TILE_URL: &str = "https://tile.openstreetmap.org";

/// Server key the offline database stores tiles under.
const DATABASE_SERVER_KEY: &str = "https://a.tile.openstreetmap.org/{z}/{x}/{y}.png";

const PLACEHOLDER_FILL: Rgb<u8> = Rgb([0x99, 0xff, 0x99]);

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default capacity of the in-memory cache (number of tiles).
const DEFAULT_LRU_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

/// Anything that can supply a 256x256 map tile.
pub trait TileProvider: Send + Sync {
    fn tile(&self, key: TileKey) -> Arc<RgbImage>;
}

pub struct TileSource {
    memory: Mutex<LruCache<TileKey, Arc<RgbImage>>>,
    client: Option<reqwest::blocking::Client>,
    database: Option<Mutex<Connection>>,
}

impl TileSource {
    /// `offline` disables network fetches; `database` is the optional offline cache.
    pub fn new(offline: bool, database: Option<&Path>) -> Result<Self> {
        let client = if offline {
            None
        } else {
            Some(
                reqwest::blocking::Client::builder()
                    .user_agent(concat!("medialink/", env!("CARGO_PKG_VERSION")))
                    .timeout(HTTP_TIMEOUT)
                    .build()
                    .context("Failed to build tile HTTP client")?,
            )
        };

        let database = database
            .map(|path| {
                Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
                    .with_context(|| format!("Failed to open tile database: {:?}", path))
                    .map(Mutex::new)
            })
            .transpose()?;

        debug!(offline, has_database = database.is_some(), "Initialized tile source");

        Ok(Self {
            memory: Mutex::new(LruCache::new(
                NonZeroUsize::new(DEFAULT_LRU_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            )),
            client,
            database,
        })
    }

    fn fetch_network(&self, key: TileKey) -> Option<RgbImage> {
        let client = self.client.as_ref()?;
        let url = format!("{}/{}/{}/{}.png", TILE_URL, key.zoom, key.x, key.y);
        let fetched = client
            .get(&url)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.bytes());
        match fetched {
            Ok(bytes) => decode_tile(bytes.to_vec()),
            Err(e) => {
                warn!(%url, error = %e, "Tile download failed");
                None
            }
        }
    }

    fn fetch_database(&self, key: TileKey) -> Option<RgbImage> {
        let conn = self.database.as_ref()?.lock();
        let blob: Option<Vec<u8>> = conn
            .query_row(
                "SELECT t.tile_image FROM tiles t WHERE t.zoom = ?1 AND t.x = ?2 AND t.y = ?3 AND t.server = ?4",
                params![key.zoom, key.x, key.y, DATABASE_SERVER_KEY],
                |row| row.get(0),
            )
            .optional()
            .unwrap_or_else(|e| {
                warn!(?key, error = %e, "Tile database query failed");
                None
            });
        blob.and_then(decode_tile)
    }
}

impl TileProvider for TileSource {
    fn tile(&self, key: TileKey) -> Arc<RgbImage> {
        if let Some(tile) = self.memory.lock().get(&key) {
            trace!(?key, "Tile memory cache hit");
            return Arc::clone(tile);
        }

        let found = self
            .fetch_network(key)
            .or_else(|| self.fetch_database(key));

        match found {
            Some(tile) => {
                let tile = Arc::new(tile);
                self.memory.lock().put(key, Arc::clone(&tile));
                tile
            }
            None => {
                debug!(?key, "No tile available, using placeholder");
                Arc::new(placeholder_tile())
            }
        }
    }
}

fn decode_tile(bytes: Vec<u8>) -> Option<RgbImage> {
    match image_loader::decode_bytes(bytes) {
        Ok(img) => Some(img.to_rgb8()),
        Err(e) => {
            warn!(error = %e, "Undecodable tile");
            None
        }
    }
}

pub fn placeholder_tile() -> RgbImage {
    RgbImage::from_pixel(TILE_SIZE, TILE_SIZE, PLACEHOLDER_FILL)
}
