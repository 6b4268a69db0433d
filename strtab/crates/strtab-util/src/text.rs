//! Text dump escaping
//!
//! One line per string: `<utf8 byte length>: <escaped content>`. Control
//! characters never appear raw in a dump line so that the output can be
//! split on newlines and fed back through a loader.

use std::fmt::Write;

/// Append `s` to `out`, escaping characters that would break a dump line
pub fn put_utf8(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            '\\' => out.push_str("\\\\"),
            c if c.is_ascii() && !(' '..='~').contains(&c) => {
                // write! into a String cannot fail
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
}

/// Format a single verbose dump line
///
/// # Examples
///
/// ```rust
/// use strtab_util::dump_line;
///
/// assert_eq!(dump_line("a\tb"), "3: a\\tb");
/// ```
pub fn dump_line(s: &str) -> String {
    let mut line = String::with_capacity(s.len() + 8);
    let _ = write!(line, "{}: ", s.len());
    put_utf8(&mut line, s);
    line
}
