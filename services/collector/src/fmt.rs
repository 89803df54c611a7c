//! Text formatting helpers for the human-oriented sinks.

use logtree_core::{ArgValue, MessageArg, MessageInfo};
use std::time::Duration;

/// Pad (or truncate) to exactly `width` characters.
pub fn padded_to(width: usize, s: &str) -> String {
    let mut out: String = s.chars().take(width).collect();
    while out.chars().count() < width {
        out.push(' ');
    }
    out
}

/// Compact relative-time rendering for tree columns.
pub fn format_reltime(d: Duration) -> String {
    let secs = d.as_secs();
    let millis = d.subsec_millis();
    if secs == 0 {
        format!("{millis}ms")
    } else if secs < 60 {
        format!("{secs}.{millis:03}s")
    } else if secs < 3600 {
        format!("{}:{:02}.{:03}", secs / 60, secs % 60, millis)
    } else {
        format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

/// Render one argument value for display.
pub fn format_arg(arg: &MessageArg) -> String {
    match &arg.value {
        ArgValue::Bool(b) => b.to_string(),
        ArgValue::SignedInt(v) => v.to_string(),
        ArgValue::UnsignedInt(v) => v.to_string(),
        ArgValue::Float(v) => v.to_string(),
        ArgValue::FloatSeconds(d) => format_reltime(*d),
        ArgValue::Text(s) => s.clone(),
    }
}

/// Substitute `${name}` placeholders with the matching argument values.
/// Placeholders without a matching argument stay verbatim.
pub fn format_message(info: &MessageInfo) -> String {
    let format = &info.format;
    let mut out = String::with_capacity(format.len());
    let mut rest = format.as_str();
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match info.find_arg(name) {
                    Some(arg) => out.push_str(&format_arg(arg)),
                    None => {
                        out.push_str("${");
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
