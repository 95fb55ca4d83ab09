//! Column-tracking content and header encoders.
//!
//! Supports Quoted-Printable (RFC 2045), line-wrapped Base64 (RFC 2045) and
//! RFC 2047 Q-encoded words. None of the encoders ever splits a multi-byte
//! UTF-8 sequence across a soft line break or a header fold.

use std::borrow::Cow;

const HEX: &[u8; 16] = b"0123456789ABCDEF";
const BASE64: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Maximum Base64 line length, excluding CRLF.
const BASE64_LINE: usize = 76;

/// Maximum Quoted-Printable column before a soft break, leaving room for `=`.
const QP_MAX_COLUMN: usize = 75;

/// Maximum header column before an encoded-word is closed, leaving room for `?=`.
const Q_MAX_COLUMN: usize = 74;

const Q_OPEN: &[u8] = b"=?utf-8?q?";
const Q_CLOSE: &[u8] = b"?=";

/// Rules for which bytes pass through unencoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    /// Quoted-Printable body text.
    Body,
    /// RFC 2047 Q-encoding.
    Header,
}

/// Encodes the unit of input starting at `start` into `unit`.
///
/// A unit is a single byte, or a whole UTF-8 sequence when `src[start]` is a
/// lead byte. Returns the index of the next unit and whether the unit is
/// literal whitespace.
fn encode_unit(src: &[u8], start: usize, flavor: Flavor, unit: &mut Vec<u8>) -> (usize, bool) {
    let c = src[start];
    match (flavor, c) {
        (Flavor::Body, b'\t' | b' ') => {
            unit.push(c);
            return (start + 1, true);
        }
        (Flavor::Header, b' ') => unit.push(b'_'),
        (Flavor::Body, b'!'..=b'~') if c != b'=' => unit.push(c),
        (Flavor::Header, b'!'..=b'~') if !matches!(c, b'=' | b'?' | b'_') => unit.push(c),
        _ if c & 0xC0 == 0xC0 => {
            push_hex(unit, c);
            let mut next = start + 1;
            while next < src.len() && src[next] & 0xC0 == 0x80 {
                push_hex(unit, src[next]);
                next += 1;
            }
            return (next, false);
        }
        _ => push_hex(unit, c),
    }
    (start + 1, false)
}

fn push_hex(dst: &mut Vec<u8>, byte: u8) {
    dst.extend_from_slice(&[b'=', HEX[usize::from(byte >> 4)], HEX[usize::from(byte & 0x0F)]]);
}

/// Encodes data using Quoted-Printable (RFC 2045).
///
/// Lines are soft-broken (`=\r\n`) so that no line exceeds 76 characters.
/// Multi-byte UTF-8 characters always move to the next line as a whole.
/// If the output would end in a space or tab, a trailing `=` is appended so
/// that transports do not strip it.
#[must_use]
pub fn quoted_printable_encode(src: &[u8]) -> Vec<u8> {
    let mut dst = Vec::with_capacity(2 * src.len());
    let mut unit = Vec::with_capacity(12);
    let mut column = 0;
    let mut ends_in_space = false;
    let mut i = 0;

    while i < src.len() {
        unit.clear();
        (i, ends_in_space) = encode_unit(src, i, Flavor::Body, &mut unit);
        column += unit.len();
        if column > QP_MAX_COLUMN {
            dst.extend_from_slice(b"=\r\n");
            column = unit.len();
        }
        dst.extend_from_slice(&unit);
    }

    if ends_in_space {
        dst.push(b'=');
    }
    dst
}

/// Returns the exact length of [`base64_encode`] output for `len` input bytes.
#[must_use]
pub const fn base64_encoded_len(len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let encoded = len.div_ceil(3) * 4;
    encoded + (encoded - 1) / BASE64_LINE * 2
}

/// Encodes data as Base64, wrapped at 76 characters per line with CRLF.
///
/// Encoding and line breaking happen in one pass over a single, exactly
/// sized allocation. The result equals standard Base64 re-wrapped at 76
/// columns; there is no trailing line break.
#[must_use]
pub fn base64_encode(src: &[u8]) -> Vec<u8> {
    let mut dst = vec![0; base64_encoded_len(src.len())];
    let mut pos = 0;
    let mut line = 0;

    for group in src.chunks(3) {
        // Destination offsets for the four output characters of this group,
        // shifted around a CRLF when the line fills up inside the group.
        let slots = match BASE64_LINE - line {
            0 => {
                dst[pos..pos + 2].copy_from_slice(b"\r\n");
                line = 4;
                [pos + 2, pos + 3, pos + 4, pos + 5]
            }
            1 => {
                dst[pos + 1..pos + 3].copy_from_slice(b"\r\n");
                line = 3;
                [pos, pos + 3, pos + 4, pos + 5]
            }
            2 => {
                dst[pos + 2..pos + 4].copy_from_slice(b"\r\n");
                line = 2;
                [pos, pos + 1, pos + 4, pos + 5]
            }
            3 => {
                dst[pos + 3..pos + 5].copy_from_slice(b"\r\n");
                line = 1;
                [pos, pos + 1, pos + 2, pos + 5]
            }
            _ => {
                line += 4;
                [pos, pos + 1, pos + 2, pos + 3]
            }
        };
        pos = slots[3] + 1;

        let a = group[0];
        dst[slots[0]] = BASE64[usize::from(a >> 2)];
        match *group {
            [_] => {
                dst[slots[1]] = BASE64[usize::from((a << 4) & 0x3F)];
                dst[slots[2]] = b'=';
                dst[slots[3]] = b'=';
            }
            [_, b] => {
                dst[slots[1]] = BASE64[usize::from(((a << 4) | (b >> 4)) & 0x3F)];
                dst[slots[2]] = BASE64[usize::from((b << 2) & 0x3F)];
                dst[slots[3]] = b'=';
            }
            [_, b, c, ..] => {
                dst[slots[1]] = BASE64[usize::from(((a << 4) | (b >> 4)) & 0x3F)];
                dst[slots[2]] = BASE64[usize::from(((b << 2) | (c >> 6)) & 0x3F)];
                dst[slots[3]] = BASE64[usize::from(c & 0x3F)];
            }
            [] => unreachable!("chunks never yields an empty slice"),
        }
    }

    dst
}

/// Encodes header text as RFC 2047 Q-encoded words (`=?utf-8?q?...?=`).
///
/// `offset` is the header column already used, e.g. by `"Subject: "`. When
/// the next character would push the line past 76 columns, the current
/// encoded-word is closed and a new one is opened on a folded continuation
/// line. Returns the encoded bytes and the column after the last byte.
#[must_use]
pub fn q_encode(src: &[u8], offset: usize) -> (Vec<u8>, usize) {
    if src.is_empty() {
        return (Vec::new(), offset);
    }

    // An empty first line still needs one column so that encoded-words stay
    // within 75 characters; continuation lines get it from the fold space.
    let offset = offset.max(1);
    // The opening "=?utf-8?q?" is counted but written only once the first
    // unit is known to fit on this line.
    let mut column = offset + Q_OPEN.len();
    let mut dst = Vec::with_capacity(12 + 2 * src.len());
    let mut unit = Vec::with_capacity(12);
    let mut i = 0;

    while i < src.len() {
        unit.clear();
        (i, _) = encode_unit(src, i, Flavor::Header, &mut unit);
        column += unit.len();
        if column > Q_MAX_COLUMN {
            if !dst.is_empty() {
                dst.extend_from_slice(Q_CLOSE);
            }
            dst.extend_from_slice(b"\r\n ");
            dst.extend_from_slice(Q_OPEN);
            column = unit.len() + Q_OPEN.len() + 1;
        } else if dst.is_empty() {
            dst.extend_from_slice(Q_OPEN);
        }
        dst.extend_from_slice(&unit);
    }

    dst.extend_from_slice(Q_CLOSE);
    (dst, column + Q_CLOSE.len())
}

/// Q-encodes header text only if it contains bytes outside printable ASCII.
///
/// Text made only of `' '..='~'` is returned unchanged.
#[must_use]
pub fn q_encode_if_needed(src: &[u8], offset: usize) -> Cow<'_, [u8]> {
    if is_printable_ascii(src) {
        Cow::Borrowed(src)
    } else {
        Cow::Owned(q_encode(src, offset).0)
    }
}

/// Returns true if every byte is printable ASCII, including space.
#[must_use]
pub fn is_printable_ascii(src: &[u8]) -> bool {
    src.iter().all(|c| (b' '..=b'~').contains(c))
}

/// Wraps text in double quotes, backslash-escaping `"` and `\`.
#[must_use]
pub fn quoted_string(text: &str) -> Vec<u8> {
    let mut dst = Vec::with_capacity(text.len() + 2);
    dst.push(b'"');
    for c in text.bytes() {
        if c == b'"' || c == b'\\' {
            dst.push(b'\\');
        }
        dst.push(c);
    }
    dst.push(b'"');
    dst
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::unreadable_literal,
    clippy::cast_possible_truncation
)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use proptest::prelude::*;

    const LOREM: &str = "Lorem ipsum dolor sit amet, no sit enim fugit, solum omittam evertitur qui cu. Usu ad sonet facilisis, cu partem platonem conceptam has. Tincidunt scribentur nec ex, eu hinc quodsi consequat quo, ex est labore fuisset. Vel semper salutatus ne.";
    const GREEK: &str = "Δεσωρε αππελλανθυρ υθ μει, αν ηαβεο ομνες νυμκυαμ μεα. Αδ φιξ αλικυιπ ινφιδυντ, ηις εξ σαπερεθ δετρασθο σαεφολα, αδ δολορ αλικυανδο ηας.";

    fn wrapped_standard(data: &[u8]) -> Vec<u8> {
        let encoded = STANDARD.encode(data);
        let lines: Vec<&[u8]> = encoded.as_bytes().chunks(76).collect();
        lines.join(&b"\r\n"[..])
    }

    fn unhex(digit: u8) -> u8 {
        match digit {
            b'0'..=b'9' => digit - b'0',
            b'A'..=b'F' => digit - b'A' + 10,
            _ => panic!("invalid hex digit {digit}"),
        }
    }

    fn unescape(src: &[u8], underscore_is_space: bool) -> Vec<u8> {
        let mut out = Vec::new();
        let mut i = 0;
        while i < src.len() {
            match src[i] {
                b'=' => {
                    out.push((unhex(src[i + 1]) << 4) | unhex(src[i + 2]));
                    i += 3;
                }
                b'_' if underscore_is_space => {
                    out.push(b' ');
                    i += 1;
                }
                c => {
                    out.push(c);
                    i += 1;
                }
            }
        }
        out
    }

    fn qp_decode(src: &[u8]) -> Vec<u8> {
        let text = std::str::from_utf8(src).unwrap();
        let mut body = text.replace("=\r\n", "");
        if body.ends_with('=') {
            body.pop();
        }
        unescape(body.as_bytes(), false)
    }

    /// Splits Q-encoded output into the payload of each encoded-word.
    fn q_words(src: &[u8]) -> Vec<Vec<u8>> {
        let text = std::str::from_utf8(src).unwrap();
        text.split("\r\n ")
            .filter(|line| !line.is_empty())
            .map(|word| {
                let inner = word
                    .strip_prefix("=?utf-8?q?")
                    .and_then(|w| w.strip_suffix("?="))
                    .expect("well-formed encoded-word");
                unescape(inner.as_bytes(), true)
            })
            .collect()
    }

    #[test]
    fn test_quoted_printable_trailing_space() {
        assert_eq!(quoted_printable_encode(b"test "), b"test =");
        assert_eq!(quoted_printable_encode(b"test\t"), b"test\t=");
    }

    #[test]
    fn test_quoted_printable_escapes() {
        assert_eq!(quoted_printable_encode(b"test\n me"), b"test=0A me");
        assert_eq!(
            quoted_printable_encode("test\\/me=again…".as_bytes()),
            b"test\\/me=3Dagain=E2=80=A6"
        );
        assert!(quoted_printable_encode(b"").is_empty());
    }

    #[test]
    fn test_quoted_printable_soft_breaks() {
        let expected = concat!(
            "Lorem ipsum dolor sit amet, no sit enim fugit, solum omittam evertitur qui =\r\n",
            "cu. Usu ad sonet facilisis, cu partem platonem conceptam has. Tincidunt scr=\r\n",
            "ibentur nec ex, eu hinc quodsi consequat quo, ex est labore fuisset. Vel se=\r\n",
            "mper salutatus ne."
        );
        assert_eq!(
            String::from_utf8(quoted_printable_encode(LOREM.as_bytes())).unwrap(),
            expected
        );
    }

    #[test]
    fn test_quoted_printable_keeps_runes_together() {
        let encoded = String::from_utf8(quoted_printable_encode(GREEK.as_bytes())).unwrap();
        let first = encoded.lines().next().unwrap();
        assert_eq!(
            first,
            "=CE=94=CE=B5=CF=83=CF=89=CF=81=CE=B5 =CE=B1=CF=80=CF=80=CE=B5=CE=BB=CE=BB="
        );
        for line in encoded.split("\r\n") {
            assert!(line.len() <= 76, "line too long: {line}");
            let body = line.strip_suffix('=').unwrap_or(line);
            assert!(std::str::from_utf8(&unescape(body.as_bytes(), false)).is_ok());
        }
    }

    #[test]
    fn test_base64_known_values() {
        assert!(base64_encode(b"").is_empty());
        assert_eq!(base64_encode(b"f"), b"Zg==");
        assert_eq!(base64_encode(b"fo"), b"Zm8=");
        assert_eq!(base64_encode(b"foo"), b"Zm9v");
        assert_eq!(base64_encode(b"Hello, World!"), b"SGVsbG8sIFdvcmxkIQ==");
    }

    #[test]
    fn test_base64_wraps_at_76() {
        // 57 bytes fill exactly one line, 58 spill onto a second one.
        let full = base64_encode(&[0xAB; 57]);
        assert_eq!(full.len(), 76);
        assert!(!full.contains(&b'\r'));

        let spill = base64_encode(&[0xAB; 58]);
        assert_eq!(&spill[76..78], b"\r\n");
        assert_eq!(spill.len(), base64_encoded_len(58));
    }

    #[test]
    fn test_base64_matches_standard_for_all_small_lengths() {
        let data: Vec<u8> = (0..3000u32).map(|i| (i * 7 + i / 13) as u8).collect();
        for len in 0..data.len() {
            assert_eq!(
                base64_encode(&data[..len]),
                wrapped_standard(&data[..len]),
                "length {len}"
            );
        }
    }

    #[test]
    fn test_q_encode_short() {
        assert_eq!(q_encode(b"test ", 32), (b"=?utf-8?q?test_?=".to_vec(), 49));
        assert_eq!(
            q_encode(b"test\n me", 32).0,
            b"=?utf-8?q?test=0A_me?=".to_vec()
        );
        assert_eq!(
            q_encode("test\\/me=again…".as_bytes(), 32).0,
            b"=?utf-8?q?test\\/me=3Dagain=E2=80=A6?=".to_vec()
        );
        assert_eq!(q_encode(b"a?_b", 0).0, b"=?utf-8?q?a=3F=5Fb?=".to_vec());
    }

    #[test]
    fn test_q_encode_empty_keeps_offset() {
        assert_eq!(q_encode(b"", 17), (Vec::new(), 17));
    }

    #[test]
    fn test_q_encode_folds_long_text() {
        let expected = concat!(
            "=?utf-8?q?Lorem_ipsum_dolor_sit_amet,_no_s?=\r\n",
            " =?utf-8?q?it_enim_fugit,_solum_omittam_evertitur_qui_cu._Usu_ad_sonet_fac?=\r\n",
            " =?utf-8?q?ilisis,_cu_partem_platonem_conceptam_has._Tincidunt_scribentur_?=\r\n",
            " =?utf-8?q?nec_ex,_eu_hinc_quodsi_consequat_quo,_ex_est_labore_fuisset._Ve?=\r\n",
            " =?utf-8?q?l_semper_salutatus_ne.?="
        );
        let (encoded, column) = q_encode(LOREM.as_bytes(), 32);
        assert_eq!(String::from_utf8(encoded).unwrap(), expected);
        assert_eq!(column, " =?utf-8?q?l_semper_salutatus_ne.?=".len());
    }

    #[test]
    fn test_q_encode_folds_before_first_word() {
        let (encoded, column) = q_encode("é".as_bytes(), 70);
        assert_eq!(encoded, b"\r\n =?utf-8?q?=C3=A9?=".to_vec());
        assert_eq!(column, 19);
    }

    #[test]
    fn test_q_encode_greek_first_lines() {
        let (encoded, _) = q_encode(GREEK.as_bytes(), 32);
        let text = String::from_utf8(encoded).unwrap();
        let mut lines = text.split("\r\n");
        assert_eq!(lines.next(), Some("=?utf-8?q?=CE=94=CE=B5=CF=83=CF=89=CF=81?="));
        assert_eq!(
            lines.next(),
            Some(" =?utf-8?q?=CE=B5_=CE=B1=CF=80=CF=80=CE=B5=CE=BB=CE=BB=CE=B1=CE=BD=CE=B8?=")
        );
    }

    #[test]
    fn test_q_encode_if_needed() {
        assert_eq!(&*q_encode_if_needed(b"Test #1", 9), b"Test #1");
        assert!(matches!(q_encode_if_needed(b"Test #1", 9), Cow::Borrowed(_)));
        assert_eq!(
            &*q_encode_if_needed("Test… #3".as_bytes(), 9),
            b"=?utf-8?q?Test=E2=80=A6_#3?="
        );
        assert_eq!(
            &*q_encode_if_needed(b"tab\there", 9),
            b"=?utf-8?q?tab=09here?="
        );
    }

    #[test]
    fn test_quoted_string() {
        assert_eq!(quoted_string("test name"), b"\"test name\"");
        assert_eq!(quoted_string(r#"a "b" \c"#), br#""a \"b\" \\c""#);
    }

    proptest! {
        #[test]
        fn prop_base64_matches_standard(data in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let encoded = base64_encode(&data);
            prop_assert_eq!(encoded.len(), base64_encoded_len(data.len()));
            prop_assert_eq!(encoded, wrapped_standard(&data));
        }

        #[test]
        fn prop_quoted_printable_round_trips(text in "\\PC{0,400}") {
            let encoded = quoted_printable_encode(text.as_bytes());
            prop_assert_eq!(qp_decode(&encoded), text.as_bytes().to_vec());
            for line in encoded.split(|&c| c == b'\n') {
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                prop_assert!(line.len() <= 76);
                let body = line.strip_suffix(b"=").unwrap_or(line);
                prop_assert!(std::str::from_utf8(&unescape(body, false)).is_ok());
            }
        }

        #[test]
        fn prop_q_encode_round_trips(text in "\\PC{1,200}", offset in 0usize..40) {
            let (encoded, column) = q_encode(text.as_bytes(), offset);
            let words = q_words(&encoded);
            let mut joined = Vec::new();
            for word in &words {
                prop_assert!(std::str::from_utf8(word).is_ok());
                joined.extend_from_slice(word);
            }
            prop_assert_eq!(joined, text.as_bytes().to_vec());

            let text = String::from_utf8(encoded).unwrap();
            let lines: Vec<&str> = text.split("\r\n").collect();
            prop_assert!(offset.max(1) + lines[0].len() <= 76);
            for line in &lines[1..] {
                prop_assert!(line.len() <= 76);
            }
            let last = lines[lines.len() - 1].len();
            if lines.len() == 1 {
                prop_assert_eq!(column, offset.max(1) + last);
            } else {
                prop_assert_eq!(column, last);
            }
        }
    }
}
