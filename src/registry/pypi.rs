//! PyPI JSON API: `GET {base}/pypi/{package}/json`.

use reqwest::Client;
use std::time::Duration;

use super::{PackageStatus, RegistryError};

pub const DEFAULT_BASE_URL: &str = "https://pypi.org";

pub async fn check(
    client: &Client,
    base_url: &str,
    package: &str,
    timeout: Duration,
) -> Result<PackageStatus, RegistryError> {
    let url = format!(
        "{}/pypi/{}/json",
        base_url.trim_end_matches('/'),
        normalize_package_name(package)
    );

    let response = client
        .get(&url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                RegistryError::Timeout
            } else {
                RegistryError::Network(e)
            }
        })?;

    match response.status().as_u16() {
        200 => Ok(PackageStatus::Exists),
        404 => Ok(PackageStatus::NotFound),
        429 => Err(RegistryError::RateLimited),
        status => Ok(PackageStatus::Unknown(format!("HTTP {}", status))),
    }
}

/// PEP 503: lowercase, runs of `-`, `_` and `.` collapse to one `-`.
pub fn normalize_package_name(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let mut prev_separator = false;

    for c in name.chars() {
        if matches!(c, '-' | '_' | '.') {
            if !prev_separator {
                result.push('-');
            }
            prev_separator = true;
        } else {
            result.push(c.to_ascii_lowercase());
            prev_separator = false;
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_package_name() {
        assert_eq!(normalize_package_name("Requests"), "requests");
        assert_eq!(normalize_package_name("Flask_RESTful"), "flask-restful");
        assert_eq!(normalize_package_name("zope.interface"), "zope-interface");
        assert_eq!(normalize_package_name("a__b--c..d"), "a-b-c-d");
    }
}
