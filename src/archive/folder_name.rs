use std::fmt::Write as _;

fn is_safe(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'-')
}

/// File name stem for a remote folder. Everything outside `[A-Za-z0-9._-]`, and a leading dot,
/// becomes `=XX`, so hierarchy separators never turn into directories.
pub fn encode(name: &str) -> String {
    let mut encoded = String::with_capacity(name.len());
    for (i, &byte) in name.as_bytes().iter().enumerate() {
        if is_safe(byte) && !(i == 0 && byte == b'.') {
            encoded.push(char::from(byte));
        } else {
            let _ = write!(encoded, "={byte:02X}");
        }
    }
    encoded
}
