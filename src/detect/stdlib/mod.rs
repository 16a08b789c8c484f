//! Python standard library detection.
//!
//! Lookups go through:
//! 1. An in-memory cache
//! 2. A disk cache
//! 3. The installed interpreter (`sys.stdlib_module_names`)
//! 4. An embedded module list
//!
//! Querying the interpreter keeps the answer accurate for the installed
//! version; the caches make repeat lookups O(1).

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::sync::RwLock;
use std::time::{Duration, SystemTime};

use once_cell::sync::Lazy;

mod fallback;

/// Cache entry with metadata.
struct StdlibCache {
    modules: HashSet<String>,
    timestamp: SystemTime,
}

/// Global in-memory cache.
static STDLIB_CACHE: Lazy<RwLock<Option<StdlibCache>>> = Lazy::new(|| RwLock::new(None));

/// Cache TTL - 24 hours.
const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Check if a top-level module is part of the Python standard library.
pub fn is_stdlib(module: &str) -> bool {
    let root = module.split('.').next().unwrap_or(module);

    if let Some(result) = check_memory_cache(root) {
        return result;
    }

    get_or_refresh_stdlib().contains(root)
}

fn check_memory_cache(module: &str) -> Option<bool> {
    let cache = STDLIB_CACHE.read().ok()?;
    let entry = cache.as_ref()?;

    if entry.timestamp.elapsed().ok()? < CACHE_TTL {
        return Some(entry.modules.contains(module));
    }
    None
}

fn get_or_refresh_stdlib() -> HashSet<String> {
    if let Some(cached) = load_disk_cache() {
        update_memory_cache(cached.clone(), "disk cache");
        return cached;
    }

    // CI runs always use the embedded list.
    let queried = if is_ci() { None } else { query_python_stdlib() };
    match queried {
        Some((modules, version)) => {
            tracing::debug!(%version, count = modules.len(), "stdlib modules from interpreter");
            save_disk_cache(&modules, &version);
            update_memory_cache(modules.clone(), "interpreter");
            modules
        }
        None => {
            let embedded = fallback::python_stdlib();
            update_memory_cache(embedded.clone(), "embedded");
            embedded
        }
    }
}

fn is_ci() -> bool {
    std::env::var("CI").is_ok()
        || std::env::var("GITHUB_ACTIONS").is_ok()
        || std::env::var("GITLAB_CI").is_ok()
        || std::env::var("JENKINS_URL").is_ok()
}

fn cache_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "codeguard")
        .map(|d| d.cache_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".").join(".codeguard_cache"))
}

fn cache_file() -> PathBuf {
    cache_dir().join("python_stdlib.txt")
}

fn load_disk_cache() -> Option<HashSet<String>> {
    let path = cache_file();
    let metadata = fs::metadata(&path).ok()?;

    if metadata.modified().ok()?.elapsed().ok()? > CACHE_TTL {
        return None;
    }

    let content = fs::read_to_string(&path).ok()?;
    let modules: HashSet<String> = content
        .lines()
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| l.to_string())
        .collect();

    if modules.is_empty() {
        return None;
    }

    Some(modules)
}

fn save_disk_cache(modules: &HashSet<String>, version: &str) {
    let path = cache_file();

    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    let mut content = format!("# version: {}\n", version);
    let mut sorted: Vec<_> = modules.iter().collect();
    sorted.sort();
    for m in sorted {
        content.push_str(m);
        content.push('\n');
    }

    if let Err(e) = fs::write(&path, content) {
        tracing::debug!(path = %path.display(), error = %e, "could not write stdlib cache");
    }
}

fn update_memory_cache(modules: HashSet<String>, source: &str) {
    if let Ok(mut cache) = STDLIB_CACHE.write() {
        tracing::trace!(%source, "stdlib cache refreshed");
        *cache = Some(StdlibCache {
            modules,
            timestamp: SystemTime::now(),
        });
    }
}

/// Query the interpreter using `sys.stdlib_module_names` (Python 3.10+).
fn query_python_stdlib() -> Option<(HashSet<String>, String)> {
    let python = find_python()?;

    let version_output = Command::new(&python).arg("--version").output().ok()?;
    let version = String::from_utf8_lossy(&version_output.stdout)
        .trim()
        .to_string();

    let script = r#"
import sys
if hasattr(sys, 'stdlib_module_names'):
    print('\n'.join(sorted(sys.stdlib_module_names)))
else:
    import pkgutil
    import os
    stdlib_path = os.path.dirname(os.__file__)
    modules = set(sys.builtin_module_names)
    for importer, modname, ispkg in pkgutil.iter_modules([stdlib_path]):
        modules.add(modname)
    print('\n'.join(sorted(modules)))
"#;

    let output = Command::new(&python).args(["-c", script]).output().ok()?;
    if !output.status.success() {
        return None;
    }

    let modules: HashSet<String> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|l| !l.is_empty())
        .map(|l| l.to_string())
        .collect();

    if modules.is_empty() {
        return None;
    }

    Some((modules, version))
}

fn find_python() -> Option<String> {
    for cmd in ["python3", "python"] {
        if let Ok(output) = Command::new(cmd).arg("--version").output() {
            if output.status.success() {
                return Some(cmd.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python_stdlib_detection() {
        assert!(is_stdlib("os"));
        assert!(is_stdlib("sys"));
        assert!(is_stdlib("json"));
        assert!(is_stdlib("os.path"));
        assert!(is_stdlib("collections.abc"));

        assert!(!is_stdlib("requests"));
        assert!(!is_stdlib("numpy"));
        assert!(!is_stdlib("nonexistent_package_xyz"));
    }

    #[test]
    fn test_embedded_fallback_covers_common_modules() {
        let embedded = fallback::python_stdlib();
        for module in ["math", "random", "itertools", "functools", "typing", "dataclasses"] {
            assert!(embedded.contains(module), "{} missing", module);
        }
    }

    #[test]
    fn test_submodules_resolve_to_root() {
        assert_eq!(is_stdlib("xml.etree.ElementTree"), is_stdlib("xml"));
        assert!(!is_stdlib("sklearn.linear_model"));
    }
}
