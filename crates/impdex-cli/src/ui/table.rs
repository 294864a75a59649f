//! Catalog rows as terminal tables.

use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use impdex_schema::PackageRecord;

/// One row per record: package, version, channel, imported names, filename.
pub fn records_table(records: &[PackageRecord]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(["Package", "Version", "Channel", "Imports", "Filename"]);

    for record in records {
        table.add_row(vec![
            Cell::new(record.package_name.as_str()).fg(Color::Cyan),
            Cell::new(record.version.as_str()),
            Cell::new(record.channel.as_str()),
            Cell::new(record.imported_names.as_deref().unwrap_or("-")),
            Cell::new(&record.filename).fg(Color::DarkGrey),
        ]);
    }
    table
}

/// Every field of a single record, one per line.
pub fn record_detail(record: &PackageRecord) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);

    let rows = [
        ("package_name", record.package_name.as_str()),
        ("version", record.version.as_str()),
        ("channel", record.channel.as_str()),
        ("imported_names", record.imported_names.as_deref().unwrap_or("")),
        ("depends", record.depends.as_str()),
        ("root_package_names", record.root_package_names.as_str()),
        ("filename", record.filename.as_str()),
        ("url", record.url.as_str()),
    ];
    for (field, value) in rows {
        table.add_row(vec![Cell::new(field).fg(Color::DarkGrey), Cell::new(value)]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use impdex_schema::{Channel, PackageName, Version};

    fn record() -> PackageRecord {
        PackageRecord {
            package_name: PackageName::new("attrs"),
            imported_names: Some("attr,attrs".to_string()),
            channel: Channel::Anaconda,
            depends: r#"["python >=3.6"]"#.to_string(),
            filename: "attrs-22.1.0-py39_0.conda".to_string(),
            url: "https://repo.anaconda.com/pkgs/main/linux-64/attrs-22.1.0-py39_0.conda"
                .to_string(),
            version: Version::new("22.1.0"),
            root_package_names: String::new(),
        }
    }

    #[test]
    fn test_records_table_rows() {
        let table = records_table(&[record(), record()]);
        assert_eq!(table.row_iter().count(), 2);
        let rendered = table.to_string();
        assert!(rendered.contains("attr,attrs"));
        assert!(rendered.contains("anaconda"));
    }

    #[test]
    fn test_record_detail_lists_every_field() {
        let rendered = record_detail(&record()).to_string();
        for field in ["package_name", "depends", "root_package_names", "url"] {
            assert!(rendered.contains(field), "missing {field}");
        }
    }
}
