// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Text and JSON rendering of command results.

use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use ualink_opcua::client::{DataChange, ReadResult, ServerInfo};
use ualink_opcua::messages::ReferenceDescription;

// =============================================================================
// Server Info
// =============================================================================

/// Renders server information as indented lines.
pub fn server_info_text(info: &ServerInfo) -> String {
    let build = &info.build_info;
    let mut lines = vec![
        format!("  Product:       {}", info.product()),
        format!("  Manufacturer:  {}", text_or_dash(build.manufacturer_name.as_deref())),
        format!("  Product URI:   {}", text_or_dash(build.product_uri.as_deref())),
        format!("  Build:         {}", text_or_dash(build.build_number.as_deref())),
        format!("  State:         {}", info.state),
        format!("  Start time:    {}", time_or_dash(info.start_time)),
        format!("  Current time:  {}", time_or_dash(info.current_time)),
    ];
    if info.seconds_till_shutdown > 0 {
        lines.push(format!("  Shutdown in:   {}s", info.seconds_till_shutdown));
    }
    if !info.server_array.is_empty() {
        lines.push(format!("  Server array:  {}", info.server_array.join(", ")));
    }
    lines.join("\n")
}

/// Renders server information as JSON.
pub fn server_info_json(info: &ServerInfo) -> Value {
    let build = &info.build_info;
    json!({
        "product_name": build.product_name,
        "software_version": build.software_version,
        "build_number": build.build_number,
        "manufacturer_name": build.manufacturer_name,
        "product_uri": build.product_uri,
        "build_date": build.build_date.map(|t| t.to_rfc3339()),
        "state": info.state.to_string(),
        "start_time": info.start_time.map(|t| t.to_rfc3339()),
        "current_time": info.current_time.map(|t| t.to_rfc3339()),
        "seconds_till_shutdown": info.seconds_till_shutdown,
        "server_array": info.server_array,
    })
}

// =============================================================================
// Browse
// =============================================================================

/// One line per reference: display name, node id and class.
pub fn reference_text(reference: &ReferenceDescription) -> String {
    format!(
        "  {} ({}) [{}]",
        reference.display_name, reference.node_id, reference.node_class
    )
}

/// Renders a reference as JSON.
pub fn reference_json(reference: &ReferenceDescription) -> Value {
    json!({
        "display_name": reference.display_name.to_string(),
        "browse_name": reference.browse_name.to_string(),
        "node_id": reference.node_id.to_string(),
        "node_class": reference.node_class.to_string(),
        "type_definition": reference.type_definition.to_string(),
    })
}

// =============================================================================
// Read
// =============================================================================

/// Renders a read result, prefixed with `label`.
pub fn read_text(label: &str, result: &ReadResult) -> String {
    if result.is_good() {
        format!(
            "  ✓ {} = {} ({})",
            label,
            result.value,
            result.value.data_type()
        )
    } else {
        format!("  ✗ {} - Status: {}", label, result.status)
    }
}

/// Renders a read result as JSON.
pub fn read_json(result: &ReadResult) -> Value {
    json!({
        "node_id": result.node_id.to_string(),
        "value": result.value.to_string(),
        "data_type": result.value.data_type().to_string(),
        "status": result.status.to_string(),
        "good": result.is_good(),
        "source_timestamp": result.source_timestamp.map(|t| t.to_rfc3339()),
        "server_timestamp": result.server_timestamp.map(|t| t.to_rfc3339()),
    })
}

// =============================================================================
// Data Changes
// =============================================================================

/// Line printed for a delivered data change.
pub fn change_text(name: &str, change: &DataChange) -> String {
    let value = &change.value;
    match value.source_timestamp {
        Some(ts) => format!(
            "• {} changed: {} [{}] at {}",
            name,
            value.value,
            value.quality,
            ts.format("%H:%M:%S%.3f")
        ),
        None => format!("• {} changed: {} [{}]", name, value.value, value.quality),
    }
}

fn text_or_dash(text: Option<&str>) -> &str {
    text.filter(|t| !t.is_empty()).unwrap_or("-")
}

fn time_or_dash(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "-".to_string())
}

// =============================================================================
// Tests
// =============================================================================
