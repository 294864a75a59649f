//! Catalog queries: by imported module, package name or archive filename

use std::path::Path;

use anyhow::{Context, Result};
use crossterm::style::Stylize;
use impdex_schema::{PackageName, PackageRecord};

use crate::store::Catalog;
use crate::ui::table::records_table;

fn open(catalog: &Path) -> Result<Catalog> {
    if !catalog.exists() {
        anyhow::bail!(
            "No catalog at {}. Run 'impdex build' first.",
            catalog.display()
        );
    }
    Catalog::open_at(catalog).with_context(|| format!("Failed to open catalog {}", catalog.display()))
}

fn print_records(records: &[PackageRecord], what: &str) {
    if records.is_empty() {
        eprintln!("{}", format!("No packages found for {what}").yellow());
        return;
    }
    println!("{}", records_table(records));
}

/// Packages that provide `module`
pub fn lookup(catalog: &Path, module: &str) -> Result<Vec<PackageRecord>> {
    let records = open(catalog)?
        .find_by_imported_name(module)
        .context("Catalog query failed")?;
    print_records(&records, &format!("module '{module}'"));
    Ok(records)
}

/// Every archive cataloged for package `name`
pub fn package(catalog: &Path, name: &str) -> Result<Vec<PackageRecord>> {
    let records = open(catalog)?
        .find_by_name(&PackageName::new(name))
        .context("Catalog query failed")?;
    print_records(&records, &format!("package '{name}'"));
    Ok(records)
}

/// The row(s) stored for archive `filename`
pub fn file(catalog: &Path, filename: &str) -> Result<Vec<PackageRecord>> {
    let records = open(catalog)?
        .find_by_filename(filename)
        .context("Catalog query failed")?;
    print_records(&records, &format!("file '{filename}'"));
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use impdex_schema::{Channel, Version};
    use tempfile::tempdir;

    #[test]
    fn test_missing_catalog_is_an_error() {
        let dir = tempdir().unwrap();
        let err = lookup(&dir.path().join("catalog.db"), "yaml").unwrap_err();
        assert!(err.to_string().contains("impdex build"));
    }

    #[test]
    fn test_queries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.db");
        let record = PackageRecord {
            package_name: PackageName::new("pyyaml"),
            imported_names: Some("yaml,_yaml".to_string()),
            channel: Channel::CondaForge,
            depends: "[]".to_string(),
            filename: "pyyaml-6.0-0.conda".to_string(),
            url: "https://conda.anaconda.org/conda-forge/linux-64/pyyaml-6.0-0.conda".to_string(),
            version: Version::new("6.0"),
            root_package_names: String::new(),
        };
        Catalog::open_at(&path).unwrap().insert(&record).unwrap();

        assert_eq!(lookup(&path, "yaml").unwrap(), [record.clone()]);
        assert!(lookup(&path, "json").unwrap().is_empty());
        assert_eq!(package(&path, "PyYAML").unwrap(), [record.clone()]);
        assert_eq!(file(&path, "pyyaml-6.0-0.conda").unwrap(), [record]);
    }
}
