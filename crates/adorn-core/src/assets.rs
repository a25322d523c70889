//! Jewelry asset loading and the active-image slots.
//!
//! At most one image per category is active at a time. Loads are
//! asynchronous and cancellation-free, so a slow load can resolve after a
//! newer request; every load carries a per-category monotonic generation and
//! only the most recently issued one may commit. A failed load leaves the
//! active image unchanged.

use std::path::{Path, PathBuf};

use image::RgbaImage;
use thiserror::Error;

use crate::types::JewelryCategory;

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("asset not found: {0}")]
    NotFound(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },
}

/// A decoded jewelry image plus its source identifier.
#[derive(Debug, Clone)]
pub struct JewelryAsset {
    /// Source identifier (path or URL the bytes came from).
    pub id: String,
    pub category: JewelryCategory,
    pub image: RgbaImage,
}

impl JewelryAsset {
    /// Decode an asset from a file. Blocking; call from a blocking context
    /// (the engine uses `tokio::task::spawn_blocking`).
    pub fn load(path: &Path, category: JewelryCategory) -> Result<Self, AssetError> {
        let id = path.to_string_lossy().into_owned();
        if !path.exists() {
            return Err(AssetError::NotFound(id));
        }
        let bytes = std::fs::read(path).map_err(|source| AssetError::Io {
            path: id.clone(),
            source,
        })?;
        Self::decode(&bytes, id, category)
    }

    /// Decode an asset from raw encoded bytes.
    pub fn decode(
        bytes: &[u8],
        id: String,
        category: JewelryCategory,
    ) -> Result<Self, AssetError> {
        let image = image::load_from_memory(bytes)
            .map_err(|source| AssetError::Decode {
                path: id.clone(),
                source,
            })?
            .to_rgba8();
        Ok(Self { id, category, image })
    }
}

/// Proof that a load was requested; carries the generation that must still
/// be current for the result to apply.
#[derive(Debug, Clone, Copy)]
pub struct LoadTicket {
    category: JewelryCategory,
    generation: u64,
}

impl LoadTicket {
    pub fn category(&self) -> JewelryCategory {
        self.category
    }
}

/// The active earring/necklace slots with per-category generation guards.
#[derive(Default)]
pub struct ActiveAssets {
    earring: Option<JewelryAsset>,
    necklace: Option<JewelryAsset>,
    earring_gen: u64,
    necklace_gen: u64,
}

impl ActiveAssets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new load request for a category, invalidating any load
    /// still in flight for it.
    pub fn begin_load(&mut self, category: JewelryCategory) -> LoadTicket {
        let generation = match category {
            JewelryCategory::Earring => {
                self.earring_gen += 1;
                self.earring_gen
            }
            JewelryCategory::Necklace => {
                self.necklace_gen += 1;
                self.necklace_gen
            }
        };
        LoadTicket {
            category,
            generation,
        }
    }

    /// Apply a completed load. Returns false (and drops the asset) when a
    /// newer request for the category was issued after this ticket.
    pub fn commit(&mut self, ticket: LoadTicket, asset: JewelryAsset) -> bool {
        let (slot, latest) = match ticket.category {
            JewelryCategory::Earring => (&mut self.earring, self.earring_gen),
            JewelryCategory::Necklace => (&mut self.necklace, self.necklace_gen),
        };
        if ticket.generation != latest {
            tracing::debug!(
                category = ticket.category.name(),
                id = %asset.id,
                generation = ticket.generation,
                latest,
                "dropping stale asset load result"
            );
            return false;
        }
        tracing::info!(category = ticket.category.name(), id = %asset.id, "asset activated");
        *slot = Some(asset);
        true
    }

    /// The currently active image for a category.
    pub fn active(&self, category: JewelryCategory) -> Option<&JewelryAsset> {
        match category {
            JewelryCategory::Earring => self.earring.as_ref(),
            JewelryCategory::Necklace => self.necklace.as_ref(),
        }
    }

    /// Deactivate a category, releasing the image.
    pub fn clear(&mut self, category: JewelryCategory) {
        match category {
            JewelryCategory::Earring => self.earring = None,
            JewelryCategory::Necklace => self.necklace = None,
        }
    }
}

/// List image files in an asset directory, sorted numerically where the stem
/// is a number (the asset folders use 1.png .. N.png) and by name otherwise.
pub fn list_asset_files(dir: &Path) -> Result<Vec<PathBuf>, AssetError> {
    let entries = std::fs::read_dir(dir).map_err(|source| AssetError::Io {
        path: dir.to_string_lossy().into_owned(),
        source,
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            matches!(
                p.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref(),
                Some("png" | "jpg" | "jpeg" | "webp")
            )
        })
        .collect();

    let numeric_stem = |p: &Path| -> Option<u64> {
        p.file_stem()?.to_str()?.parse().ok()
    };
    files.sort_by(|a, b| match (numeric_stem(a), numeric_stem(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => a.file_name().cmp(&b.file_name()),
    });

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn asset(id: &str, category: JewelryCategory) -> JewelryAsset {
        JewelryAsset {
            id: id.to_string(),
            category,
            image: RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 255])),
        }
    }

    #[test]
    fn test_commit_applies_latest() {
        let mut slots = ActiveAssets::new();
        let ticket = slots.begin_load(JewelryCategory::Earring);
        assert!(slots.commit(ticket, asset("a.png", JewelryCategory::Earring)));
        assert_eq!(
            slots.active(JewelryCategory::Earring).unwrap().id,
            "a.png"
        );
    }

    #[test]
    fn test_stale_result_never_overwrites_newer() {
        // Request A, then B. B resolves first; A resolving late must not win.
        let mut slots = ActiveAssets::new();
        let ticket_a = slots.begin_load(JewelryCategory::Necklace);
        let ticket_b = slots.begin_load(JewelryCategory::Necklace);

        assert!(slots.commit(ticket_b, asset("b.png", JewelryCategory::Necklace)));
        assert!(!slots.commit(ticket_a, asset("a.png", JewelryCategory::Necklace)));

        assert_eq!(
            slots.active(JewelryCategory::Necklace).unwrap().id,
            "b.png"
        );
    }

    #[test]
    fn test_generations_are_per_category() {
        let mut slots = ActiveAssets::new();
        let ear = slots.begin_load(JewelryCategory::Earring);
        // A necklace request must not invalidate the earring load.
        let _ = slots.begin_load(JewelryCategory::Necklace);
        assert!(slots.commit(ear, asset("e.png", JewelryCategory::Earring)));
    }

    #[test]
    fn test_failed_load_leaves_active_unchanged() {
        let mut slots = ActiveAssets::new();
        let ticket = slots.begin_load(JewelryCategory::Earring);
        assert!(slots.commit(ticket, asset("old.png", JewelryCategory::Earring)));

        // New request whose load fails: nothing to commit, old stays active.
        let _failed = slots.begin_load(JewelryCategory::Earring);
        assert_eq!(
            slots.active(JewelryCategory::Earring).unwrap().id,
            "old.png"
        );
    }

    #[test]
    fn test_clear_releases_image() {
        let mut slots = ActiveAssets::new();
        let ticket = slots.begin_load(JewelryCategory::Earring);
        slots.commit(ticket, asset("a.png", JewelryCategory::Earring));
        slots.clear(JewelryCategory::Earring);
        assert!(slots.active(JewelryCategory::Earring).is_none());
    }

    #[test]
    fn test_load_missing_file_is_not_found() {
        let err = JewelryAsset::load(
            Path::new("/nonexistent/earring.png"),
            JewelryCategory::Earring,
        )
        .unwrap_err();
        assert!(matches!(err, AssetError::NotFound(_)));
    }

    #[test]
    fn test_decode_garbage_fails() {
        let err = JewelryAsset::decode(b"not an image", "x".into(), JewelryCategory::Earring)
            .unwrap_err();
        assert!(matches!(err, AssetError::Decode { .. }));
    }

    #[test]
    fn test_list_asset_files_numeric_order() {
        let dir = std::env::temp_dir().join(format!("adorn-assets-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        for name in ["10.png", "2.png", "1.png", "notes.txt"] {
            std::fs::write(dir.join(name), b"x").unwrap();
        }
        let files = list_asset_files(&dir).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["1.png", "2.png", "10.png"]);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
