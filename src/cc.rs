#[must_use]
pub(crate) const fn make_four(cc: &[u8]) -> u32 {
    let buffer = match cc.len() {
        0 => [0, 0, 0, 0],
        1 => [cc[0], 0, 0, 0],
        2 => [cc[0], cc[1], 0, 0],
        3 => [cc[0], cc[1], cc[2], 0],
        _ => [cc[0], cc[1], cc[2], cc[3]],
    };
    u32::from_le_bytes(buffer)
}

/// Renders a four-character-code for error messages, e.g. `"ZZZZ" (0x5A5A5A5A)`.
#[must_use]
pub(crate) fn display_four(cc: u32) -> String {
    let bytes = cc.to_le_bytes();
    if bytes.iter().all(|x| x.is_ascii_graphic() || *x == 0) {
        let text: String = bytes
            .iter()
            .take_while(|x| **x != 0)
            .map(|x| char::from(*x))
            .collect();
        format!("\"{text}\" (0x{cc:08X})")
    } else {
        format!("0x{cc:08X}")
    }
}
