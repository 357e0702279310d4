//! Listing table

use apkvc_core::schema::ArtifactView;
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::{Cell, Color, ContentArrangement, Table};

/// Render ranked views; tags show in the last column.
pub fn artifact_table(views: &[ArtifactView]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_BORDERS_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "id", "name", "version", "client", "size (MB)", "created", "",
        ]);

    for view in views {
        let record = &view.record;
        table.add_row(vec![
            Cell::new(record.id),
            Cell::new(&record.name).fg(Color::Cyan),
            Cell::new(&record.version),
            Cell::new(record.client.as_deref().unwrap_or("-")),
            Cell::new(format!("{:.2}", view.size_mb)),
            Cell::new(record.created_at.format("%Y-%m-%d %H:%M")),
            tag_cell(view),
        ]);
    }
    table
}

fn tag_cell(view: &ArtifactView) -> Cell {
    if view.is_current_version {
        Cell::new("current").fg(Color::Green)
    } else if view.is_previous_version {
        Cell::new("previous").fg(Color::Yellow)
    } else {
        Cell::new("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apkvc_core::schema::ArtifactRecord;
    use chrono::Utc;
    use std::path::PathBuf;

    fn view(id: i64, version: &str, current: bool, previous: bool) -> ArtifactView {
        let mut view = ArtifactView::new(ArtifactRecord {
            id,
            name: "maps".to_string(),
            version: version.to_string(),
            client: None,
            size_bytes: 3 * 1024 * 1024,
            created_at: Utc::now(),
            storage_path: PathBuf::from("/srv/files"),
            stored_file_name: format!("maps-{version}--20240105.apk"),
        });
        view.is_current_version = current;
        view.is_previous_version = previous;
        view
    }

    #[test]
    fn test_table_shows_tags() {
        let table = artifact_table(&[view(2, "2.0", true, false), view(1, "1.0", false, true)]);
        let text = table.to_string();
        assert!(text.contains("current"));
        assert!(text.contains("previous"));
        assert!(text.contains("3.00"));
    }
}
