//! A minimal `printf`-family formatter for the `PRTF` built-in.
//!
//! `spec.md` §4.5 describes `PRTF`'s arguments as translated "argument-by-
//! argument: any argument whose value lies in the Data segment is
//! translated to a host string pointer before being forwarded" — a
//! necessary hack in the original because C varargs carry no type
//! information at the call site, so the host side guesses from the raw
//! value. This formatter keeps both the raw integer and (when it looked
//! like a data-segment address) the translated string for each argument,
//! and each conversion specifier picks whichever form it needs.

/// One positional `PRTF` argument: its raw integer value, and — if that
/// value fell inside the data segment — the guest string it points to.
#[derive(Debug, Clone)]
pub struct Arg {
    /// The raw value as passed on the stack.
    pub raw: i32,
    /// Present when `raw` looked like a data-segment address.
    pub translated: Option<String>,
}

impl Arg {
    /// An argument that is just an integer, never translated.
    pub fn int(raw: i32) -> Self {
        Self { raw, translated: None }
    }

    fn as_str(&self) -> &str {
        self.translated.as_deref().unwrap_or("")
    }
}

/// Render `fmt` against `args`, consuming one argument per `%` conversion
/// (`%%` consumes none). Unrecognized conversions are copied through
/// verbatim, matching a permissive guest `printf` rather than panicking on
/// unsupported format strings.
pub fn format(fmt: &[u8], args: &[Arg]) -> String {
    let mut out = String::new();
    let mut args = args.iter();
    let mut i = 0;
    while i < fmt.len() {
        if fmt[i] != b'%' {
            out.push(fmt[i] as char);
            i += 1;
            continue;
        }
        i += 1;
        // Skip flags, width, precision and length modifiers we don't act on
        // ("l", "h", digits, ".") — we only care about the final conversion
        // character.
        while i < fmt.len() && matches!(fmt[i], b'0'..=b'9' | b'.' | b'-' | b'+' | b' ' | b'l' | b'h') {
            i += 1;
        }
        let Some(&spec) = fmt.get(i) else {
            out.push('%');
            break;
        };
        i += 1;
        match spec {
            b'%' => out.push('%'),
            b'd' | b'i' => {
                if let Some(arg) = args.next() {
                    out.push_str(&arg.raw.to_string());
                }
            }
            b'u' => {
                if let Some(arg) = args.next() {
                    out.push_str(&(arg.raw as u32).to_string());
                }
            }
            b'x' => {
                if let Some(arg) = args.next() {
                    out.push_str(&format!("{:x}", arg.raw as u32));
                }
            }
            b'X' => {
                if let Some(arg) = args.next() {
                    out.push_str(&format!("{:X}", arg.raw as u32));
                }
            }
            b'o' => {
                if let Some(arg) = args.next() {
                    out.push_str(&format!("{:o}", arg.raw as u32));
                }
            }
            b'c' => {
                if let Some(arg) = args.next() {
                    out.push(arg.raw as u8 as char);
                }
            }
            b's' => {
                if let Some(arg) = args.next() {
                    out.push_str(arg.as_str());
                }
            }
            other => {
                out.push('%');
                out.push(other as char);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_integers_and_strings() {
        let args = vec![Arg::int(10), Arg { raw: 0, translated: Some("hi".to_owned()) }];
        assert_eq!(format(b"%d and %s", &args), "10 and hi");
    }

    #[test]
    fn percent_literal_consumes_no_argument() {
        let args = vec![Arg::int(5)];
        assert_eq!(format(b"100%% done, %d left", &args), "100% done, 5 left");
    }

    #[test]
    fn newline_escape_passes_through_as_a_real_newline_byte() {
        // The lexer/parser translate "\n" to byte 0x0a before it reaches
        // `data`; the formatter just echoes bytes it doesn't recognize as
        // `%`.
        let args: Vec<Arg> = vec![];
        assert_eq!(format(b"line\n", &args), "line\n");
    }
}
