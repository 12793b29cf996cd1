//! mboxrd framing: a `From ` separator line, the body with every `>*From ` line quoted by one
//! more `>`, a final newline and an empty separator line.

use jiff::{Timestamp, tz::TimeZone};

const UNKNOWN_SENDER: &str = "MAILER-DAEMON";

pub fn frame(sender: Option<&str>, date: Option<Timestamp>, body: &[u8]) -> Vec<u8> {
    let mut record = separator(sender, date).into_bytes();
    record.reserve(body.len() + 2);
    for line in body.split_inclusive(|&b| b == b'\n') {
        if is_from_line(line) {
            record.push(b'>');
        }
        record.extend_from_slice(line);
    }
    if !body.ends_with(b"\n") {
        record.push(b'\n');
    }
    record.push(b'\n');
    record
}

/// Reverses [`frame`], returning the first `body_length` bytes of the unquoted body.
pub fn unframe(record: &[u8], body_length: usize) -> Result<Vec<u8>, &'static str> {
    if !record.starts_with(b"From ") {
        return Err("record does not start with a From line");
    }
    let body_start = record
        .iter()
        .position(|&b| b == b'\n')
        .ok_or("From line is not terminated")?
        + 1;
    let mut body = Vec::with_capacity(body_length);
    for line in record[body_start..].split_inclusive(|&b| b == b'\n') {
        if body.len() >= body_length {
            break;
        }
        if line.starts_with(b">") && is_from_line(line) {
            body.extend_from_slice(&line[1..]);
        } else {
            body.extend_from_slice(line);
        }
    }
    if body.len() < body_length {
        return Err("record is shorter than the indexed body");
    }
    body.truncate(body_length);
    Ok(body)
}

fn separator(sender: Option<&str>, date: Option<Timestamp>) -> String {
    let sender = sender
        .filter(|sender| !sender.is_empty() && !sender.contains(char::is_whitespace))
        .unwrap_or(UNKNOWN_SENDER);
    let date = date
        .unwrap_or(Timestamp::UNIX_EPOCH)
        .to_zoned(TimeZone::UTC)
        .strftime("%a %b %e %H:%M:%S %Y");
    format!("From {sender} {date}\n")
}

fn is_from_line(line: &[u8]) -> bool {
    let quotes = line.iter().take_while(|&&b| b == b'>').count();
    line[quotes..].starts_with(b"From ")
}
