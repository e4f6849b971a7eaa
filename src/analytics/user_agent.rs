use woothee::parser::Parser;

pub const UNKNOWN_BROWSER: &str = "Unknown";

fn known(value: &str) -> Option<&str> {
    match value.trim() {
        "" | "UNKNOWN" => None,
        v => Some(v),
    }
}

/// Reduce a raw User-Agent header to a short label such as
/// `"Chrome on Windows 10"`. Never fails; anything unrecognised becomes
/// [`UNKNOWN_BROWSER`].
pub fn summarize_user_agent(raw: Option<&str>) -> String {
    let raw = match raw.map(str::trim) {
        Some(s) if !s.is_empty() => s,
        _ => return UNKNOWN_BROWSER.to_string(),
    };

    let parser = Parser::new();
    let Some(result) = parser.parse(raw) else {
        return UNKNOWN_BROWSER.to_string();
    };

    match (known(&result.name), known(&result.os)) {
        (Some(name), Some(os)) => format!("{name} on {os}"),
        (Some(name), None) => name.to_string(),
        (None, Some(os)) => format!("{UNKNOWN_BROWSER} on {os}"),
        (None, None) => UNKNOWN_BROWSER.to_string(),
    }
}
