//! Icon URL extraction from item JSON

use serde_json::Value;

/// Icon URLs of every item in `document`, socketed items included.
///
/// Looks at the `items` array of a tab or character document. Duplicates are
/// dropped while keeping first-seen order.
pub fn icons_in(document: &Value) -> Vec<String> {
    let mut icons = Vec::new();
    if let Some(items) = document.get("items").and_then(Value::as_array) {
        collect(items, &mut icons);
    }
    icons
}

fn collect(items: &[Value], icons: &mut Vec<String>) {
    for item in items {
        if let Some(icon) = item.get("icon").and_then(Value::as_str) {
            if !icons.iter().any(|seen| seen == icon) {
                icons.push(icon.to_string());
            }
        }
        if let Some(socketed) = item.get("socketedItems").and_then(Value::as_array) {
            collect(socketed, icons);
        }
    }
}
