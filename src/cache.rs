//! Persistent response cache for text generation.
//!
//! Responses are keyed by the exact serialized request, so a rerun over
//! unchanged input is answered entirely from disk.

use crate::{
    artifact::{to_pretty_json, write_file_atomic},
    error::{Error, Result},
    llm::TextGenerator,
};
use serde::Serialize;
use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, trace};

/// Request string → response string, stored as one JSON file.
#[derive(Debug)]
pub struct ResponseCache {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl ResponseCache {
    /// Opens the cache at `path`. A missing file is an empty cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let entries = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
            serde_json::from_str(&content).map_err(|e| Error::json(&path, &e))?
        } else {
            BTreeMap::new()
        };

        debug!("Opened response cache {} ({} entries)", path.display(), entries.len());
        Ok(Self { path, entries })
    }

    /// Location of the cache file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of cached responses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up the response stored for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Stores a response and persists the cache before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache file cannot be written.
    pub fn insert(&mut self, key: String, response: String) -> Result<()> {
        self.entries.insert(key, response);
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        let content = to_pretty_json(&self.entries)?;
        write_file_atomic(&self.path, &content)?;
        trace!("Persisted {} cached responses", self.entries.len());
        Ok(())
    }
}

/// Serialized form of a generation request, used as the cache key.
#[derive(Serialize)]
struct RequestKey<'a> {
    model: &'a str,
    prompt: &'a str,
}

/// Hit/miss counters of a [`CachedGenerator`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Prompts answered from the cache
    pub hits: usize,
    /// Prompts sent to the wrapped generator
    pub misses: usize,
}

/// Wraps a generator so that every answer is cached on disk.
///
/// A fresh answer is persisted before it is handed back, so an
/// interrupted run never loses a response it already paid for.
pub struct CachedGenerator<'a> {
    inner: &'a dyn TextGenerator,
    cache: RefCell<ResponseCache>,
    stats: Cell<CacheStats>,
}

impl<'a> CachedGenerator<'a> {
    /// Wraps `inner` with `cache`.
    #[must_use]
    pub fn new(inner: &'a dyn TextGenerator, cache: ResponseCache) -> Self {
        Self {
            inner,
            cache: RefCell::new(cache),
            stats: Cell::new(CacheStats::default()),
        }
    }

    /// Returns the hit/miss counters so far.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats.get()
    }

    /// Unwraps the cache.
    #[must_use]
    pub fn into_cache(self) -> ResponseCache {
        self.cache.into_inner()
    }

    fn key(&self, prompt: &str) -> Result<String> {
        let key = RequestKey {
            model: self.inner.model_name(),
            prompt,
        };
        Ok(serde_json::to_string(&key)?)
    }
}

impl TextGenerator for CachedGenerator<'_> {
    fn generate(&self, prompt: &str) -> Result<String> {
        let key = self.key(prompt)?;
        let mut stats = self.stats.get();

        if let Some(cached) = self.cache.borrow().get(&key) {
            trace!("Cache hit");
            stats.hits += 1;
            self.stats.set(stats);
            return Ok(cached.to_string());
        }

        let response = self.inner.generate(prompt)?;
        self.cache.borrow_mut().insert(key, response.clone())?;

        stats.misses += 1;
        self.stats.set(stats);
        Ok(response)
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
