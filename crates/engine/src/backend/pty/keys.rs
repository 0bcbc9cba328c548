//! tmux-style key names to the bytes a terminal sends

/// Encode one key token. Unknown tokens are sent as literal text.
pub fn encode(token: &str) -> Vec<u8> {
    if let Some(bytes) = named(token) {
        return bytes.to_vec();
    }

    if let Some(rest) = token.strip_prefix("M-") {
        if !rest.is_empty() {
            let mut bytes = vec![0x1b];
            bytes.extend(encode(rest));
            return bytes;
        }
    }

    if let Some(rest) = token.strip_prefix("C-") {
        let mut chars = rest.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if let Some(byte) = control(c) {
                return vec![byte];
            }
        }
    }

    token.as_bytes().to_vec()
}

fn named(token: &str) -> Option<&'static [u8]> {
    Some(match token {
        "Enter" => b"\r",
        "Tab" => b"\t",
        "BTab" => b"\x1b[Z",
        "Escape" | "Esc" => b"\x1b",
        "BSpace" | "Backspace" => b"\x7f",
        "Space" => b" ",
        "Up" => b"\x1b[A",
        "Down" => b"\x1b[B",
        "Right" => b"\x1b[C",
        "Left" => b"\x1b[D",
        "Home" => b"\x1b[H",
        "End" => b"\x1b[F",
        "PageUp" | "PPage" => b"\x1b[5~",
        "PageDown" | "NPage" => b"\x1b[6~",
        "Insert" | "IC" => b"\x1b[2~",
        "Delete" | "DC" => b"\x1b[3~",
        "F1" => b"\x1bOP",
        "F2" => b"\x1bOQ",
        "F3" => b"\x1bOR",
        "F4" => b"\x1bOS",
        "F5" => b"\x1b[15~",
        "F6" => b"\x1b[17~",
        "F7" => b"\x1b[18~",
        "F8" => b"\x1b[19~",
        "F9" => b"\x1b[20~",
        "F10" => b"\x1b[21~",
        "F11" => b"\x1b[23~",
        "F12" => b"\x1b[24~",
        _ => return None,
    })
}

fn control(c: char) -> Option<u8> {
    match c {
        'a'..='z' | 'A'..='Z' => Some(c.to_ascii_lowercase() as u8 & 0x1f),
        '@' | ' ' | '2' => Some(0x00),
        '[' | '3' => Some(0x1b),
        '\\' | '4' => Some(0x1c),
        ']' | '5' => Some(0x1d),
        '^' | '6' => Some(0x1e),
        '_' | '7' | '/' => Some(0x1f),
        '?' | '8' => Some(0x7f),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("Enter", b"\r" ; "enter")]
    #[test_case("Esc", b"\x1b" ; "escape alias")]
    #[test_case("BSpace", b"\x7f" ; "backspace")]
    #[test_case("Up", b"\x1b[A" ; "arrow up")]
    #[test_case("NPage", b"\x1b[6~" ; "page down alias")]
    #[test_case("F5", b"\x1b[15~" ; "function key")]
    #[test_case("C-c", b"\x03" ; "control c")]
    #[test_case("C-M", b"\r" ; "control m uppercase")]
    #[test_case("C-[", b"\x1b" ; "control bracket")]
    #[test_case("M-x", b"\x1bx" ; "meta letter")]
    #[test_case("M-Enter", b"\x1b\r" ; "meta named key")]
    #[test_case("hello", b"hello" ; "unknown token is literal")]
    #[test_case("C-", b"C-" ; "bare control prefix is literal")]
    fn test_encode(token: &str, expected: &[u8]) {
        assert_eq!(encode(token), expected);
    }
}
