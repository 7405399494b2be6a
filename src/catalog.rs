/// # catalog
///
/// The ROM list, read once at startup, plus fetching a ROM's bytes. A
/// fetch only ever yields a complete image; there is no way to build a
/// `RomImage` from a partial read.
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};

use log::{debug, info};
use serde::Deserialize;

use crate::error::CatalogError;
use crate::keymap::KeyMapping;

/// One catalog entry: `{ "file", "title", "keyMapping"? }`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RomEntry {
    pub file: String,
    pub title: String,
    #[serde(default)]
    pub key_mapping: Option<KeyMapping>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomCatalog {
    pub entries: Vec<RomEntry>,
    /// ROM files are relative to here
    pub base: PathBuf,
}

impl RomCatalog {
    pub fn from_json(json: &str, base: impl Into<PathBuf>) -> Result<Self, CatalogError> {
        let entries: Vec<RomEntry> = serde_json::from_str(json)?;
        Ok(RomCatalog {
            entries,
            base: base.into(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let json = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let catalog = Self::from_json(&json, base)?;
        info!("catalog {} lists {} ROMs", path.display(), catalog.entries.len());
        Ok(catalog)
    }

    /// catalog of a single ROM file with the default mapping
    pub fn single(path: &Path) -> Self {
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        RomCatalog {
            entries: vec![RomEntry {
                file: path.display().to_string(),
                title,
                key_mapping: None,
            }],
            base: PathBuf::new(),
        }
    }

    pub fn position(&self, title: &str) -> Result<usize, CatalogError> {
        self.entries
            .iter()
            .position(|e| e.title == title)
            .ok_or_else(|| CatalogError::UnknownTitle(title.to_string()))
    }

    pub fn path_of(&self, entry: &RomEntry) -> PathBuf {
        self.base.join(&entry.file)
    }

    /// read the entry's ROM in full
    pub fn fetch(&self, index: usize) -> Result<RomImage, CatalogError> {
        let entry = self.entries.get(index).ok_or(CatalogError::Empty)?;
        let path = self.path_of(entry);
        let bytes = fs::read(&path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        debug!("fetched {} ({} bytes)", path.display(), bytes.len());
        Ok(RomImage {
            title: entry.title.clone(),
            bytes,
            key_mapping: entry.key_mapping.clone(),
        })
    }

    /// fetch on a background thread, handing the result to `deliver`
    pub fn fetch_in_background<T, F>(&self, index: usize, tx: Sender<T>, deliver: F) -> JoinHandle<()>
    where
        T: Send + 'static,
        F: FnOnce(Result<RomImage, CatalogError>) -> T + Send + 'static,
    {
        let catalog = self.clone();
        thread::spawn(move || {
            // a closed channel means the host has gone; nothing to do
            let _ = tx.send(deliver(catalog.fetch(index)));
        })
    }
}

/// A fully buffered ROM, ready to hand to a VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomImage {
    pub title: String,
    pub bytes: Vec<u8>,
    pub key_mapping: Option<KeyMapping>,
}

impl RomImage {
    pub fn new(title: &str, bytes: Vec<u8>) -> Self {
        RomImage {
            title: title.to_string(),
            bytes,
            key_mapping: None,
        }
    }

    pub fn with_mapping(mut self, mapping: KeyMapping) -> Self {
        self.key_mapping = Some(mapping);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    const CATALOG: &str = r#"[
        { "file": "pong.ch8", "title": "Pong" },
        { "file": "tetris.ch8", "title": "Tetris", "keyMapping": { "ArrowLeft": 5, "ArrowRight": 6 } }
    ]"#;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("chip8-host-{}-{}", name, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_parse_catalog() -> Result<(), CatalogError> {
        let c = RomCatalog::from_json(CATALOG, "roms")?;
        assert_eq!(c.entries.len(), 2);
        assert_eq!(c.entries[0].key_mapping, None);
        let tetris = c.entries[1].key_mapping.as_ref().unwrap();
        assert_eq!(tetris.resolve("ArrowLeft"), Some(5));
        assert_eq!(c.path_of(&c.entries[1]), PathBuf::from("roms/tetris.ch8"));
        assert_eq!(c.position("Tetris")?, 1);
        Ok(())
    }

    #[test]
    fn test_bad_mapping_rejects_catalog() {
        let json = r#"[{ "file": "a.ch8", "title": "A", "keyMapping": { "q": 99 } }]"#;
        assert!(RomCatalog::from_json(json, "").is_err());
    }

    #[test]
    fn test_unknown_title() {
        let c = RomCatalog::from_json(CATALOG, "").unwrap();
        assert!(matches!(c.position("Brix"), Err(CatalogError::UnknownTitle(_))));
    }

    #[test]
    fn test_single_file_catalog() {
        let c = RomCatalog::single(Path::new("roms/ibm_logo.ch8"));
        assert_eq!(c.entries[0].title, "ibm_logo");
        assert_eq!(c.path_of(&c.entries[0]), PathBuf::from("roms/ibm_logo.ch8"));
    }

    #[test]
    fn test_load_and_fetch() -> Result<(), CatalogError> {
        let dir = scratch_dir("fetch");
        fs::write(dir.join("roms.json"), CATALOG).unwrap();
        fs::write(dir.join("pong.ch8"), [0x12, 0x00]).unwrap();

        let c = RomCatalog::load(&dir.join("roms.json"))?;
        let rom = c.fetch(0)?;
        assert_eq!(rom.title, "Pong");
        assert_eq!(rom.bytes, vec![0x12, 0x00]);
        assert!(matches!(c.fetch(1), Err(CatalogError::Io { .. })));
        assert!(matches!(c.fetch(9), Err(CatalogError::Empty)));
        Ok(())
    }

    #[test]
    fn test_background_fetch_delivers_whole_rom() {
        let dir = scratch_dir("background");
        fs::write(dir.join("pong.ch8"), [0xa0, 0x50, 0xd0, 0x05]).unwrap();
        let c = RomCatalog::from_json(CATALOG, &dir).unwrap();

        let (tx, rx) = channel();
        c.fetch_in_background(0, tx, |res| res.map(|rom| rom.bytes.len()).ok())
            .join()
            .unwrap();
        assert_eq!(rx.recv().unwrap(), Some(4));
    }
}
