use anyhow::{Context, Result};
use log::debug;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// File cache for provider responses, keyed by the request that produced them
pub struct Cache {
    cache_dir: PathBuf,
}

impl Cache {
    /// Create a new cache with the given directory
    pub fn new<P: AsRef<Path>>(cache_dir: P) -> Result<Self> {
        let cache_dir = cache_dir.as_ref().to_path_buf();

        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir).context("Failed to create cache directory")?;
        }

        Ok(Self { cache_dir })
    }

    /// Cached bytes for the given request key, if any
    pub fn get(&self, key: &str, extension: &str) -> Option<Vec<u8>> {
        let file_path = self.get_cache_path(key, extension);
        match fs::read(&file_path) {
            Ok(data) => {
                debug!("Cache hit at {}", file_path.display());
                Some(data)
            }
            Err(_) => None,
        }
    }

    /// Save data to the cache
    pub fn save_to_cache(&self, key: &str, extension: &str, data: &[u8]) -> Result<PathBuf> {
        let file_path = self.get_cache_path(key, extension);

        let mut file = File::create(&file_path).context("Failed to create cache file")?;
        file.write_all(data)
            .context("Failed to write data to cache file")?;

        Ok(file_path)
    }

    /// Get the cache path for a request key
    fn get_cache_path(&self, key: &str, extension: &str) -> PathBuf {
        // Create a hash of the key to use as the file name
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        let hash = format!("{:x}", hasher.finalize());

        let file_name = if extension.is_empty() {
            hash
        } else {
            format!("{}.{}", hash, extension)
        };

        self.cache_dir.join(file_name)
    }
}
