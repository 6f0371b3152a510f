use std::borrow::Cow;

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Calculates the display width of a string in columns.
///
/// CJK characters and emoji count as two columns, combining marks as zero.
///
/// # Examples
///
/// ```
/// use feedwatch::util::display_width;
///
/// assert_eq!(display_width("Hello"), 5);
/// assert_eq!(display_width("日本"), 4);
/// ```
pub fn display_width(s: &str) -> usize {
    UnicodeWidthStr::width(s)
}

/// Marker appended to truncated titles.
pub const ELLIPSIS: &str = " …";
/// Display width of [`ELLIPSIS`].
const ELLIPSIS_WIDTH: usize = 2;

/// Truncates a string to fit within a maximum display width.
///
/// If truncation is necessary the result ends with [`ELLIPSIS`] and its total
/// width never exceeds `max_width`.
///
/// # Returns
///
/// - `Cow::Borrowed(s)` if the string already fits (no allocation)
/// - `Cow::Borrowed("")` if `max_width == 0`
/// - for `max_width <= 2`, as many characters as fit, without the marker
/// - otherwise the longest prefix that fits in `max_width - 2` columns, followed by `" …"`
///
/// # Examples
///
/// ```
/// use feedwatch::util::truncate_to_width;
///
/// assert_eq!(truncate_to_width("Short", 10), "Short");
/// assert_eq!(truncate_to_width("Hello World", 8), "Hello  …");
/// assert_eq!(truncate_to_width("Test", 0), "");
/// ```
pub fn truncate_to_width(s: &str, max_width: usize) -> Cow<'_, str> {
    if max_width == 0 {
        return Cow::Borrowed("");
    }

    // Too narrow for "char + marker": keep what fits
    if max_width <= ELLIPSIS_WIDTH {
        let mut byte_end = 0;
        let mut current_width = 0;
        for (idx, c) in s.char_indices() {
            let char_width = UnicodeWidthChar::width(c).unwrap_or(0);
            if current_width + char_width > max_width {
                break;
            }
            current_width += char_width;
            byte_end = idx + c.len_utf8();
        }
        if byte_end == s.len() {
            return Cow::Borrowed(s);
        }
        return Cow::Owned(s[..byte_end].to_string());
    }
    let target_width = max_width - ELLIPSIS_WIDTH;

    let mut current_width = 0;
    let mut cut_point = None;
    let mut exceeded_max = false;

    for (idx, c) in s.char_indices() {
        let char_width = UnicodeWidthChar::width(c).unwrap_or(0);

        if cut_point.is_none() && current_width + char_width > target_width {
            cut_point = Some(idx);
        }

        if current_width + char_width > max_width {
            exceeded_max = true;
            break;
        }

        current_width += char_width;
    }

    if exceeded_max {
        let cut = cut_point.unwrap_or(s.len());
        Cow::Owned(format!("{}{}", &s[..cut], ELLIPSIS))
    } else {
        Cow::Borrowed(s)
    }
}

fn is_stripped_control(b: u8) -> bool {
    b == 0x1b || b == 0x7f || (b < 0x20 && b != 0x09 && b != 0x0a && b != 0x0d)
}

fn is_line_break(b: u8) -> bool {
    b == 0x09 || b == 0x0a || b == 0x0d
}

/// Strips control characters and ANSI escape sequences from remote text and
/// folds it onto a single line.
///
/// Feed titles and links are attacker-controlled. A notification is one line,
/// so tab, newline and carriage return each become a single space; every other
/// C0 control, DEL, and CSI (`\x1b[...`) / OSC (`\x1b]...`) sequence is removed.
///
/// Returns `Cow::Borrowed` when the input is already clean.
pub fn sanitize_line(s: &str) -> Cow<'_, str> {
    let bytes = s.as_bytes();
    let len = bytes.len();

    if !bytes
        .iter()
        .any(|&b| is_stripped_control(b) || is_line_break(b))
    {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(len);
    let mut i = 0;

    while i < len {
        let b = bytes[i];

        if b == 0x1b {
            if i + 1 < len && bytes[i + 1] == b'[' {
                // CSI: parameters until the final byte
                i += 2;
                while i < len {
                    let c = bytes[i];
                    i += 1;
                    if (0x40..=0x7e).contains(&c) {
                        break;
                    }
                }
            } else if i + 1 < len && bytes[i + 1] == b']' {
                // OSC: until BEL or ST
                i += 2;
                while i < len {
                    if bytes[i] == 0x07 {
                        i += 1;
                        break;
                    }
                    if bytes[i] == 0x1b && i + 1 < len && bytes[i + 1] == b'\\' {
                        i += 2;
                        break;
                    }
                    i += 1;
                }
            } else {
                i += 1;
            }
        } else if is_line_break(b) {
            out.push(' ');
            i += 1;
        } else if is_stripped_control(b) {
            i += 1;
        } else {
            let start = i;
            i += 1;
            while i < len && !is_stripped_control(bytes[i]) && !is_line_break(bytes[i]) {
                i += 1;
            }
            // SAFETY: we only stop on ASCII bytes, which never appear mid-codepoint
            // in valid UTF-8, so s[start..i] is valid UTF-8.
            out.push_str(&s[start..i]);
        }
    }

    Cow::Owned(out)
}
