use crate::config::{TIMESTAMP_FORMAT, TIMESTAMP_WIDTH};
use crate::error::ParseError;
use crate::types::{ArgValue, Arguments, CallEvent, EventKind};
use chrono::{NaiveDateTime, TimeDelta};

/// Structural delimiters, stripped in this order from the text after the timestamp:
/// name@ip[pid] api(args) = retval (status)
const DELIMITERS: [&str; 8] = ["@", "[", "]", "(", ")", "= ", " (", ")"];

/// Parse one SystemTap trace line:
/// `Thu May  7 14:58:43 2015.390178 python@7f798cb95240[2114] close(6) = 0 (0)`
pub fn parse_line(line: &str) -> Result<CallEvent, ParseError> {
    let (datetime_part, rest) = split_timestamp(line)?;
    let timestamp = parse_timestamp(datetime_part)?;

    let [process_name, instruction_pointer, pid, api, args, _, return_value, status] =
        tokenize(rest);

    Ok(CallEvent {
        timestamp,
        process_name: process_name.to_string(),
        pid: parse_pid(pid),
        instruction_pointer: instruction_pointer.to_string(),
        api: api.to_string(),
        arguments: parse_arguments(args),
        return_value: return_value.to_string(),
        status: status.to_string(),
        kind: Some(EventKind::ApiCall),
        raw: line.to_string(),
    })
}

/// Cut the fixed-width date/time field off the front of the line.
/// One separator character follows the field.
fn split_timestamp(line: &str) -> Result<(&str, &str), ParseError> {
    if line.len() < TIMESTAMP_WIDTH {
        return Err(ParseError::TooShort(line.len()));
    }
    let field = line
        .get(..TIMESTAMP_WIDTH)
        .ok_or(ParseError::NotCharBoundary(TIMESTAMP_WIDTH))?;
    let rest = line.get(TIMESTAMP_WIDTH + 1..).unwrap_or_default();
    Ok((field, rest))
}

/// `Thu May  7 14:58:43 2015.390178` -> 2015-05-07T14:58:43.390178
pub fn parse_timestamp(field: &str) -> Result<NaiveDateTime, ParseError> {
    let (datetime, micros) = field
        .split_once('.')
        .ok_or_else(|| ParseError::MissingMicros(field.to_string()))?;

    let micros: i64 = micros
        .trim()
        .parse()
        .map_err(|_| ParseError::InvalidMicros(micros.to_string()))?;

    // The weekday is dropped: it is redundant and chrono would reject a mismatch.
    // Whitespace runs collapse so space-padded days parse.
    let normalized = datetime
        .split_whitespace()
        .skip(1)
        .collect::<Vec<_>>()
        .join(" ");
    let base = NaiveDateTime::parse_from_str(&normalized, TIMESTAMP_FORMAT)
        .map_err(|_| ParseError::InvalidDateTime(datetime.to_string()))?;

    base.checked_add_signed(TimeDelta::microseconds(micros))
        .ok_or_else(|| ParseError::InvalidMicros(micros.to_string()))
}

/// Split `a, b` style text at the first `delim`, like a partition: when the
/// delimiter is absent the whole text is the head and the tail is empty.
fn partition<'a>(s: &'a str, delim: &str) -> (&'a str, &'a str) {
    s.split_once(delim).unwrap_or((s, ""))
}

/// Run the fixed delimiter sequence over the text after the timestamp
fn tokenize(mut rest: &str) -> [&str; 8] {
    let mut parts = [""; 8];
    for (part, delim) in parts.iter_mut().zip(DELIMITERS) {
        (*part, rest) = partition(rest.trim(), delim);
    }
    parts
}

fn parse_pid(pid: &str) -> i64 {
    if pid.is_empty() || !pid.bytes().all(|b| b.is_ascii_digit()) {
        return -1;
    }
    pid.parse().unwrap_or(-1)
}

/// Decode a raw argument list left to right.
///
/// Every iteration either consumes a delimiter, an opening bracket, or the
/// whole remainder, so the loop always terminates.
pub fn parse_arguments(raw: &str) -> Arguments {
    let mut arguments = Arguments::default();
    let mut rest = raw;

    while !rest.is_empty() {
        rest = rest.trim_matches(|c| c == ',' || c == ' ');

        let value = if is_array(rest) {
            let (inner, remainder) = partition(&rest[1..], "]");
            rest = remainder;
            ArgValue::Array(split_array(inner).into_iter().map(parse_arg).collect())
        } else {
            let delim = if is_string(rest) { "\", " } else { ", " };
            let (arg, remainder) = partition(rest, delim);
            rest = remainder;
            parse_arg(arg)
        };

        arguments.push(value);
    }

    arguments
}

fn parse_arg(arg: &str) -> ArgValue {
    match arg.strip_prefix('"') {
        Some(quoted) => ArgValue::Scalar(unescape(quoted)),
        None => ArgValue::Scalar(arg.to_string()),
    }
}

fn split_array(inner: &str) -> Vec<&str> {
    if is_string(inner) {
        inner.trim_matches('"').split("\", \"").collect()
    } else {
        inner.split(", ").collect()
    }
}

// Collapsed varlists ("[/* 20 vars */]") stay opaque
fn is_array(arg: &str) -> bool {
    arg.starts_with('[') && !arg.starts_with("[/*")
}

fn is_string(arg: &str) -> bool {
    arg.starts_with('"')
}

/// Decode C-style backslash escapes as the probe writes them.
/// Malformed escapes are kept verbatim. Decoded bytes that are not valid
/// UTF-8 map one byte per char (Latin-1) so distinct inputs stay distinct.
pub fn unescape(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'\\' || i + 1 == bytes.len() {
            out.push(bytes[i]);
            i += 1;
            continue;
        }

        let escaped = bytes[i + 1];
        i += 2;
        match escaped {
            b'\\' => out.push(b'\\'),
            b'\'' => out.push(b'\''),
            b'"' => out.push(b'"'),
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'v' => out.push(0x0b),
            b'\n' => {}
            b'x' => match bytes.get(i..i + 2).and_then(hex_byte) {
                Some(byte) => {
                    out.push(byte);
                    i += 2;
                }
                None => out.extend_from_slice(b"\\x"),
            },
            b'0'..=b'7' => {
                let mut value = u32::from(escaped - b'0');
                let mut digits = 1;
                while digits < 3 && i < bytes.len() && (b'0'..=b'7').contains(&bytes[i]) {
                    value = value * 8 + u32::from(bytes[i] - b'0');
                    i += 1;
                    digits += 1;
                }
                out.push((value & 0xff) as u8);
            }
            other => {
                out.push(b'\\');
                out.push(other);
            }
        }
    }

    match String::from_utf8(out) {
        Ok(s) => s,
        Err(e) => e.into_bytes().into_iter().map(char::from).collect(),
    }
}

fn hex_byte(digits: &[u8]) -> Option<u8> {
    let s = std::str::from_utf8(digits).ok()?;
    u8::from_str_radix(s, 16).ok()
}
