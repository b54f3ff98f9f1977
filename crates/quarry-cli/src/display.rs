use comfy_table::{presets, Cell, ContentArrangement, Table};
use quarry_common::spec::{Row, Schema};

/// Renders rows as a table with one header cell per column.
pub fn format_rows(schema: &Schema, rows: &[Row]) -> String {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(schema.fields().iter().map(|f| Cell::new(&f.name)));
    for row in rows {
        table.add_row(row.values().iter().map(|v| Cell::new(v.to_string())));
    }
    table.to_string()
}
