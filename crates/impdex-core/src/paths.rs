use dirs::home_dir;
use std::path::PathBuf;

/// Returns the data directory, or None if the user's home cannot be resolved.
pub fn try_impdex_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("IMPDEX_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".impdex"))
}

/// `SQLite` catalog path: ~/.impdex/catalog.db
pub fn catalog_path() -> Option<PathBuf> {
    try_impdex_home().map(|home| home.join("catalog.db"))
}

/// Listing feed path: ~/.impdex/listings.json
pub fn listings_path() -> Option<PathBuf> {
    try_impdex_home().map(|home| home.join("listings.json"))
}

/// Extract the filename from a URL.
pub fn filename_from_url(url: &str) -> &str {
    url.split('/').next_back().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_from_url() {
        assert_eq!(
            filename_from_url("https://conda.anaconda.org/conda-forge/noarch/foo-1.0-0.conda"),
            "foo-1.0-0.conda"
        );
        assert_eq!(filename_from_url(""), "");
    }
}
