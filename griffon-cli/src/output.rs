//! Terminal rendering shared by the commands

use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use griffon_core::{InstanceState, LogEvent, PluginDescriptor};

/// Table of plugins, with a state column when states are known
pub fn plugin_table<'a>(
    rows: impl IntoIterator<Item = (&'a PluginDescriptor, Option<InstanceState>)>,
    with_state: bool,
) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    let mut header = vec![
        Cell::new("Id").fg(Color::Cyan),
        Cell::new("Name").fg(Color::Cyan),
        Cell::new("Functions").fg(Color::Cyan),
    ];
    if with_state {
        header.push(Cell::new("State").fg(Color::Cyan));
    }
    table.set_header(header);

    for (descriptor, state) in rows {
        let mut row = vec![
            Cell::new(descriptor.id()),
            Cell::new(descriptor.name()),
            Cell::new(descriptor.functions().join(", ")),
        ];
        if with_state {
            row.push(state_cell(state));
        }
        table.add_row(row);
    }
    table
}

fn state_cell(state: Option<InstanceState>) -> Cell {
    match state {
        None => Cell::new("-"),
        Some(InstanceState::Terminated) => Cell::new("terminated").fg(Color::Red),
        Some(state) => Cell::new(state).fg(Color::Green),
    }
}

/// One event as a log line: `12:00:01.250 scanner#3 [INFO] text`
pub fn format_event(name: &str, event: &LogEvent) -> String {
    format!(
        "{} {}#{} {}",
        event.timestamp.format("%H:%M:%S%.3f"),
        name,
        event.seq,
        event.text()
    )
}
