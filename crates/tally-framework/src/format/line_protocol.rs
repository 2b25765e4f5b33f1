//! Influx line protocol encoding and decoding.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::{Duration, SystemTime};

use crate::error::FormatError;
use crate::metric::{FieldValue, Metric};

const FORMAT: &str = "influx";

// ===== Encoding =====

fn escape_into(out: &mut String, text: &str, special: &[char]) {
    for c in text.chars() {
        if c == '\\' || special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}

/// Renders one metric as a line, without the trailing newline.
pub fn encode(metric: &Metric, uint_support: bool) -> String {
    let mut line = String::new();
    escape_into(&mut line, metric.name(), &[',', ' ']);
    for (key, value) in metric.tags() {
        line.push(',');
        escape_into(&mut line, key, &[',', '=', ' ']);
        line.push('=');
        escape_into(&mut line, value, &[',', '=', ' ']);
    }

    let mut separator = ' ';
    for (key, value) in metric.fields() {
        line.push(separator);
        separator = ',';
        escape_into(&mut line, key, &[',', '=', ' ']);
        line.push('=');
        match value {
            FieldValue::Float(v) => {
                let _ = write!(line, "{v}");
            }
            FieldValue::Integer(v) => {
                let _ = write!(line, "{v}i");
            }
            FieldValue::Unsigned(v) if uint_support => {
                let _ = write!(line, "{v}u");
            }
            FieldValue::Unsigned(v) => {
                let _ = write!(line, "{}i", (*v).min(i64::MAX as u64));
            }
            FieldValue::Bool(v) => {
                let _ = write!(line, "{v}");
            }
            FieldValue::String(v) => {
                line.push('"');
                escape_into(&mut line, v, &['"']);
                line.push('"');
            }
        }
    }
    let _ = write!(line, " {}", metric.unix_nanos());
    line
}

// ===== Decoding =====

/// Splits on `separator` outside of quotes and escapes.
fn split_unescaped(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    let mut quoted = false;
    for (index, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => quoted = !quoted,
            c if c == separator && !quoted => {
                parts.push(&text[start..index]);
                start = index + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn split_pair(text: &str) -> Option<(String, String)> {
    let parts = split_unescaped(text, '=');
    if parts.len() < 2 || parts[0].is_empty() {
        return None;
    }
    let value = &text[parts[0].len() + 1..];
    Some((unescape(parts[0]), value.to_string()))
}

fn parse_field_value(raw: &str) -> Option<FieldValue> {
    if let Some(quoted) = raw.strip_prefix('"') {
        return quoted.strip_suffix('"').map(|s| FieldValue::String(unescape(s)));
    }
    match raw {
        "t" | "T" | "true" | "True" | "TRUE" => return Some(FieldValue::Bool(true)),
        "f" | "F" | "false" | "False" | "FALSE" => return Some(FieldValue::Bool(false)),
        _ => {}
    }
    if let Some(digits) = raw.strip_suffix('i') {
        return digits.parse().ok().map(FieldValue::Integer);
    }
    if let Some(digits) = raw.strip_suffix('u') {
        return digits.parse().ok().map(FieldValue::Unsigned);
    }
    raw.parse().ok().map(FieldValue::Float)
}

fn time_from_nanos(nanos: i64) -> SystemTime {
    let offset = Duration::from_nanos(nanos.unsigned_abs());
    if nanos >= 0 {
        SystemTime::UNIX_EPOCH + offset
    } else {
        SystemTime::UNIX_EPOCH - offset
    }
}

/// Parses a single line; `line_no` is used in error messages.
pub fn decode_line(line: &str, line_no: usize, now: SystemTime) -> Result<Metric, FormatError> {
    let sections: Vec<&str> = split_unescaped(line.trim(), ' ')
        .into_iter()
        .filter(|section| !section.is_empty())
        .collect();
    if sections.len() < 2 || sections.len() > 3 {
        return Err(FormatError::parse(FORMAT, line_no, "expected measurement and fields"));
    }

    let series = split_unescaped(sections[0], ',');
    let name = unescape(series[0]);
    if name.is_empty() {
        return Err(FormatError::parse(FORMAT, line_no, "missing measurement"));
    }
    let mut tags = BTreeMap::new();
    for raw in &series[1..] {
        let (key, value) = split_pair(raw)
            .ok_or_else(|| FormatError::parse(FORMAT, line_no, format!("invalid tag '{raw}'")))?;
        tags.insert(key, unescape(&value));
    }

    let mut fields = BTreeMap::new();
    for raw in split_unescaped(sections[1], ',') {
        let (key, value) = split_pair(raw)
            .ok_or_else(|| FormatError::parse(FORMAT, line_no, format!("invalid field '{raw}'")))?;
        let value = parse_field_value(&value).ok_or_else(|| {
            FormatError::parse(FORMAT, line_no, format!("invalid value for field '{key}'"))
        })?;
        fields.insert(key, value);
    }

    let time = match sections.get(2) {
        Some(raw) => {
            let nanos: i64 = raw.parse().map_err(|_| {
                FormatError::parse(FORMAT, line_no, format!("invalid timestamp '{raw}'"))
            })?;
            time_from_nanos(nanos)
        }
        None => now,
    };

    Ok(Metric::new(name, tags, fields, time))
}

/// Parses every non-empty, non-comment line of `text`.
pub fn decode(text: &str) -> Result<Vec<Metric>, FormatError> {
    let now = SystemTime::now();
    text.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(index, line)| decode_line(line, index + 1, now))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_tags_fields_and_time() {
        let metrics = decode(
            "# comment\n\
             cpu,host=a,cpu=cpu0 usage_idle=99.5,count=3i,ok=true,note=\"hi there\" 1000000000\n",
        )
        .unwrap();
        assert_eq!(metrics.len(), 1);
        let metric = &metrics[0];
        assert_eq!(metric.name(), "cpu");
        assert_eq!(metric.tags()["host"], "a");
        assert_eq!(metric.fields()["usage_idle"], FieldValue::Float(99.5));
        assert_eq!(metric.fields()["count"], FieldValue::Integer(3));
        assert_eq!(metric.fields()["ok"], FieldValue::Bool(true));
        assert_eq!(metric.fields()["note"], FieldValue::String("hi there".into()));
        assert_eq!(metric.unix_nanos(), 1_000_000_000);
    }

    #[test]
    fn escapes_round_trip() {
        let metric = Metric::new(
            "disk usage",
            BTreeMap::from([("path".to_string(), "/mnt/a b,c".to_string())]),
            BTreeMap::from([
                ("free".to_string(), FieldValue::Unsigned(10)),
                ("label".to_string(), FieldValue::String("say \"x\"".to_string())),
            ]),
            SystemTime::UNIX_EPOCH + Duration::from_secs(5),
        );
        let line = encode(&metric, true);
        assert_eq!(
            line,
            "disk\\ usage,path=/mnt/a\\ b\\,c free=10u,label=\"say \\\"x\\\"\" 5000000000"
        );
        assert_eq!(decode_line(&line, 1, SystemTime::now()).unwrap(), metric);
    }

    #[test]
    fn unsigned_falls_back_to_integer() {
        let metric = Metric::new(
            "m",
            BTreeMap::new(),
            BTreeMap::from([("v".to_string(), FieldValue::Unsigned(7))]),
            SystemTime::UNIX_EPOCH,
        );
        assert_eq!(encode(&metric, false), "m v=7i 0");
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(decode("cpu").is_err());
        assert!(decode("cpu value=").is_err());
        assert!(decode("cpu,host value=1").is_err());
        assert!(decode("cpu value=1 soon").is_err());
    }
}
