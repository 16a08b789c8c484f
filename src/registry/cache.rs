//! TTL cache for PyPI lookup results.
//!
//! Both positive (exists) and negative (404) answers are cached, in memory
//! for the session and on disk under the user cache dir
//! (`~/.cache/codeguard/registry/` on Linux).

use directories::ProjectDirs;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::PackageStatus;

pub struct RegistryCache {
    memory: RwLock<HashMap<String, CacheEntry>>,
    /// None disables the file layer.
    cache_dir: Option<PathBuf>,
    ttl_hours: u32,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    status: PackageStatus,
    timestamp: u64,
}

impl RegistryCache {
    /// Cache backed by memory and the user cache directory.
    pub fn new(ttl_hours: u32) -> Self {
        let cache_dir =
            ProjectDirs::from("", "", "codeguard").map(|dirs| dirs.cache_dir().join("registry"));
        if let Some(ref dir) = cache_dir {
            let _ = fs::create_dir_all(dir);
        }
        Self::with_dir(ttl_hours, cache_dir)
    }

    /// Session-only cache.
    pub fn in_memory(ttl_hours: u32) -> Self {
        Self::with_dir(ttl_hours, None)
    }

    fn with_dir(ttl_hours: u32, cache_dir: Option<PathBuf>) -> Self {
        Self {
            memory: RwLock::new(HashMap::new()),
            cache_dir,
            ttl_hours,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    fn cache_key(package: &str) -> String {
        format!("pypi:{}", package)
    }

    /// Cached status for a normalized package name, if fresh.
    pub fn get(&self, package: &str) -> Option<PackageStatus> {
        let found = self.lookup(package);
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    fn lookup(&self, package: &str) -> Option<PackageStatus> {
        let key = Self::cache_key(package);
        let now = current_timestamp();
        let ttl_secs = u64::from(self.ttl_hours) * 3600;

        {
            let cache = self.memory.read().ok()?;
            if let Some(entry) = cache.get(&key) {
                if now.saturating_sub(entry.timestamp) < ttl_secs {
                    return Some(entry.status.clone());
                }
            }
        }

        let entry = self.read_file_cache(&key)?;
        if now.saturating_sub(entry.timestamp) >= ttl_secs {
            return None;
        }
        if let Ok(mut cache) = self.memory.write() {
            cache.insert(key, entry.clone());
        }
        Some(entry.status)
    }

    pub fn set(&self, package: &str, status: PackageStatus) {
        let key = Self::cache_key(package);
        let entry = CacheEntry {
            status,
            timestamp: current_timestamp(),
        };
        self.write_file_cache(&key, &entry);
        if let Ok(mut cache) = self.memory.write() {
            cache.insert(key, entry);
        }
    }

    /// (hits, misses) since creation.
    pub fn stats(&self) -> (usize, usize) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }

    fn read_file_cache(&self, key: &str) -> Option<CacheEntry> {
        let path = self.cache_file_path(key)?;
        let content = fs::read_to_string(path).ok()?;
        parse_cache_entry(&content)
    }

    fn write_file_cache(&self, key: &str, entry: &CacheEntry) {
        if let Some(path) = self.cache_file_path(key) {
            let _ = fs::write(path, format_cache_entry(entry));
        }
    }

    fn cache_file_path(&self, key: &str) -> Option<PathBuf> {
        self.cache_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.cache", key.replace([':', '/'], "_"))))
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

/// `exists:<ts>`, `notfound:<ts>` or `unknown:<ts>:<reason>`.
fn format_cache_entry(entry: &CacheEntry) -> String {
    match &entry.status {
        PackageStatus::Exists => format!("exists:{}", entry.timestamp),
        PackageStatus::NotFound => format!("notfound:{}", entry.timestamp),
        PackageStatus::Unknown(reason) => format!("unknown:{}:{}", entry.timestamp, reason),
    }
}

fn parse_cache_entry(content: &str) -> Option<CacheEntry> {
    let parts: Vec<&str> = content.trim().splitn(3, ':').collect();
    if parts.len() < 2 {
        return None;
    }

    let timestamp = parts[1].parse().ok()?;
    let status = match parts[0] {
        "exists" => PackageStatus::Exists,
        "notfound" => PackageStatus::NotFound,
        "unknown" => PackageStatus::Unknown(parts.get(2).unwrap_or(&"unknown error").to_string()),
        _ => return None,
    };
    Some(CacheEntry { status, timestamp })
}
