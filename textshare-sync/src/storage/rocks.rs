//! RocksDB-backed persistent document backend.
//!
//! Column families:
//! - `documents`: LZ4-compressed bincode documents, keyed by
//!   `<collection bytes><0x00><document id:16 bytes>`
//!
//! Collections are key prefixes rather than column families, so new
//! collections need no schema change and a scan is a single prefix
//! iteration.
//!
//! Reference: Kleppmann, DDIA, Chapter 3 (LSM Trees, SSTables)

use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DBCompressionType, DBWithThreadMode,
    Direction, IteratorMode, Options, SingleThreaded, WriteOptions,
};
use std::path::{Path, PathBuf};

use textshare_core::{Document, DocumentId};

use super::{Backend, StoreError};

const CF_DOCUMENTS: &str = "documents";

const COLUMN_FAMILIES: &[&str] = &[CF_DOCUMENTS];

/// Backend configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database directory path
    pub path: PathBuf,
    /// Block cache size in bytes (default: 64MB)
    pub block_cache_size: usize,
    /// Bloom filter bits per key (default: 10)
    pub bloom_filter_bits: i32,
    /// Enable fsync on every write (default: true)
    pub sync_writes: bool,
    /// Max open files for RocksDB (default: 256)
    pub max_open_files: i32,
    /// Write buffer size (default: 16MB)
    pub write_buffer_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("textshare_data"),
            block_cache_size: 64 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: true,
            max_open_files: 256,
            write_buffer_size: 16 * 1024 * 1024,
        }
    }
}

impl StoreConfig {
    /// Create config for testing (small caches, no fsync).
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 8 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 64,
            write_buffer_size: 4 * 1024 * 1024,
        }
    }
}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// RocksDB-backed document backend.
pub struct RocksBackend {
    db: DBWithThreadMode<SingleThreaded>,
    config: StoreConfig,
}

impl RocksBackend {
    /// Open the backend at the configured path, creating it if missing.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_keep_log_file_num(5);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(&config)))
            .collect();

        let db = DBWithThreadMode::<SingleThreaded>::open_cf_descriptors(
            &db_opts,
            &config.path,
            cf_descriptors,
        )?;

        log::info!("Opened RocksDB backend at {}", config.path.display());
        Ok(Self { db, config })
    }

    fn cf_options(config: &StoreConfig) -> Options {
        let mut opts = Options::default();

        let mut block_opts = BlockBasedOptions::default();
        let cache = Cache::new_lru_cache(config.block_cache_size);
        block_opts.set_block_cache(&cache);
        block_opts.set_bloom_filter(config.bloom_filter_bits as f64, false);
        opts.set_block_based_table_factory(&block_opts);

        // Values are already LZ4 compressed
        opts.set_compression_type(DBCompressionType::None);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_max_write_buffer_number(2);
        opts
    }

    /// Get the database path.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    fn cf(&self) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(CF_DOCUMENTS)
            .ok_or_else(|| StoreError::Backend(format!("Column family '{CF_DOCUMENTS}' not found")))
    }

    fn write_options(&self) -> WriteOptions {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        write_opts
    }

    /// Every key of a collection starts with `<collection><0x00>`.
    fn prefix(collection: &str) -> Vec<u8> {
        let mut prefix = Vec::with_capacity(collection.len() + 1);
        prefix.extend_from_slice(collection.as_bytes());
        prefix.push(0);
        prefix
    }

    fn key(collection: &str, id: DocumentId) -> Vec<u8> {
        let mut key = Self::prefix(collection);
        key.extend_from_slice(id.as_uuid().as_bytes());
        key
    }
}

impl Backend for RocksBackend {
    fn put(&self, collection: &str, doc: &Document) -> Result<(), StoreError> {
        let cf = self.cf()?;
        let value = encode_document(doc)?;
        self.db
            .put_cf_opt(cf, Self::key(collection, doc.id), value, &self.write_options())?;
        Ok(())
    }

    fn get(&self, collection: &str, id: DocumentId) -> Result<Option<Document>, StoreError> {
        let cf = self.cf()?;
        match self.db.get_cf(cf, Self::key(collection, id))? {
            Some(bytes) => decode_document(&bytes).map(Some),
            None => Ok(None),
        }
    }

    fn remove(&self, collection: &str, id: DocumentId) -> Result<Option<Document>, StoreError> {
        let existing = self.get(collection, id)?;
        if existing.is_some() {
            let cf = self.cf()?;
            self.db
                .delete_cf_opt(cf, Self::key(collection, id), &self.write_options())?;
        }
        Ok(existing)
    }

    fn scan(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let cf = self.cf()?;
        let prefix = Self::prefix(collection);

        let mut docs = Vec::new();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward));

        for item in iter {
            let (key, value) = item?;
            // Stop once we've passed this collection's key prefix
            if !key.starts_with(&prefix) {
                break;
            }
            docs.push(decode_document(&value)?);
        }

        Ok(docs)
    }
}

fn encode_document(doc: &Document) -> Result<Vec<u8>, StoreError> {
    let bytes = bincode::serde::encode_to_vec(doc, bincode::config::standard())
        .map_err(|e| StoreError::SerializationError(e.to_string()))?;
    Ok(lz4_flex::compress_prepend_size(&bytes))
}

fn decode_document(bytes: &[u8]) -> Result<Document, StoreError> {
    let raw = lz4_flex::decompress_size_prepended(bytes)
        .map_err(|e| StoreError::CompressionError(e.to_string()))?;
    let (doc, _) = bincode::serde::decode_from_slice(&raw, bincode::config::standard())
        .map_err(|e| StoreError::DeserializationError(e.to_string()))?;
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use textshare_core::{FieldValue, Fields, TextRecord, TextStatus};

    fn open_temp() -> (tempfile::TempDir, RocksBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = RocksBackend::open(StoreConfig::for_testing(dir.path().join("db"))).unwrap();
        (dir, backend)
    }

    fn text(content: &str) -> Document {
        Document::new(
            DocumentId::new(),
            TextRecord::new_fields(content, TextStatus::Draft, 1),
        )
    }

    #[test]
    fn test_put_get_roundtrip() {
        let (_dir, backend) = open_temp();
        let doc = text("persist me");

        backend.put("texts", &doc).unwrap();
        assert_eq!(backend.get("texts", doc.id).unwrap(), Some(doc));
        assert!(backend.path().exists());
    }

    #[test]
    fn test_scan_respects_collection_prefix() {
        let (_dir, backend) = open_temp();
        for i in 0..5 {
            backend.put("texts", &text(&format!("t{i}"))).unwrap();
        }
        // "texts" is a prefix of "textsX"; the separator keeps them apart
        backend.put("textsX", &text("other")).unwrap();
        backend.put("feedbacks", &text("fb")).unwrap();

        assert_eq!(backend.scan("texts").unwrap().len(), 5);
        assert_eq!(backend.scan("textsX").unwrap().len(), 1);
        assert_eq!(backend.scan("feedbacks").unwrap().len(), 1);
        assert!(backend.scan("missing").unwrap().is_empty());
    }

    #[test]
    fn test_remove() {
        let (_dir, backend) = open_temp();
        let doc = text("gone soon");
        backend.put("texts", &doc).unwrap();

        assert_eq!(backend.remove("texts", doc.id).unwrap(), Some(doc.clone()));
        assert_eq!(backend.get("texts", doc.id).unwrap(), None);
        assert_eq!(backend.remove("texts", doc.id).unwrap(), None);
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db");
        let doc = text("durable");

        {
            let backend = RocksBackend::open(StoreConfig::for_testing(&path)).unwrap();
            backend.put("texts", &doc).unwrap();
        }

        let backend = RocksBackend::open(StoreConfig::for_testing(&path)).unwrap();
        let stored = backend.get("texts", doc.id).unwrap().unwrap();
        assert_eq!(stored.get("content"), Some(&FieldValue::from("durable")));
    }

    #[test]
    fn test_corrupt_value_is_an_error() {
        assert!(decode_document(&[0xFF, 0x00, 0x01]).is_err());
        let mut fields = Fields::new();
        fields.insert("k".into(), FieldValue::Null);
        let encoded = encode_document(&Document::new(DocumentId::nil(), fields)).unwrap();
        assert!(decode_document(&encoded).is_ok());
    }
}
