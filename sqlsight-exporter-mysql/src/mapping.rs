//! Mapping from MySQL result values and names to Prometheus conventions.

/// Sanitize a metric name to be Prometheus-compatible.
///
/// Prometheus metric names must match `[a-zA-Z_:][a-zA-Z0-9_:]*`.
/// This function:
/// - Lowercases the name (MySQL variable names are case-insensitive)
/// - Replaces invalid characters with underscores
/// - Ensures the name starts with a letter or underscore
/// - Collapses multiple underscores into one
pub fn sanitize_metric_name(name: &str) -> String {
    let mut result = String::with_capacity(name.len() + 1);
    let mut last_was_underscore = false;
    let mut chars = name.chars().peekable();

    // A leading digit gets an underscore prefix
    if let Some(&first) = chars.peek()
        && first.is_ascii_digit()
    {
        result.push('_');
        last_was_underscore = true;
    }

    for c in chars {
        let is_valid_char = c.is_ascii_alphanumeric() || c == '_' || c == ':';

        if is_valid_char {
            if c == '_' {
                if !last_was_underscore {
                    result.push(c);
                    last_was_underscore = true;
                }
            } else {
                result.push(c.to_ascii_lowercase());
                last_was_underscore = false;
            }
        } else if !last_was_underscore {
            result.push('_');
            last_was_underscore = true;
        }
    }

    while result.ends_with('_') {
        result.pop();
    }

    if result.is_empty() {
        result.push_str("unnamed");
    }

    result
}

/// Sanitize a label name to be Prometheus-compatible.
///
/// Prometheus label names must match `[a-zA-Z_][a-zA-Z0-9_]*`.
/// Labels starting with `__` are reserved for internal use.
pub fn sanitize_label_name(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let mut last_was_underscore = false;

    for (i, c) in name.chars().enumerate() {
        let valid = if i == 0 {
            c.is_ascii_alphabetic() || c == '_'
        } else {
            c.is_ascii_alphanumeric() || c == '_'
        };

        if valid {
            result.push(c.to_ascii_lowercase());
            last_was_underscore = c == '_';
        } else if !last_was_underscore {
            result.push('_');
            last_was_underscore = true;
        }
    }

    while result.ends_with('_') {
        result.pop();
    }

    if result.is_empty() {
        return "label".to_string();
    }

    // Reserved prefix
    if result.starts_with("__") {
        result.insert(0, 'z');
    }

    result
}

/// Check whether a name is a valid Prometheus metric name as-is.
pub fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// Parse a MySQL status or variable value into a sample value.
///
/// Numbers parse directly. Boolean-like words map to 1 or 0, and a
/// replication thread in `Connecting` state maps to 0.5. Anything else is
/// not exportable.
pub fn parse_status_value(value: &str) -> Option<f64> {
    let value = value.trim();

    match value.to_ascii_lowercase().as_str() {
        "yes" | "on" | "true" => return Some(1.0),
        "no" | "off" | "false" | "disabled" => return Some(0.0),
        "connecting" => return Some(0.5),
        _ => {}
    }

    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Normalize a free-form state string (e.g. a processlist state) for use as
/// a label value.
pub fn normalize_state(state: &str) -> String {
    let state = state.trim();
    if state.is_empty() {
        return "unknown".to_string();
    }

    state
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
