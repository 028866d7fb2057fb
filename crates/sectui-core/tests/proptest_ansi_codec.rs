//! Property-based tests for the ANSI codec.
//!
//! 1. **Round trip by value**: for every op code the encoder produces,
//!    encode → decode → encode yields an equal parsed code.
//!
//! 2. **Padding is not meaning**: integers written with leading zeros decode
//!    to the same code as the unpadded form.
//!
//! 3. **Length accounting**: decoding a sequence followed by arbitrary text
//!    reports exactly the sequence's length.
//!
//! 4. **Prefixes are incomplete, never unrecognized**: every strict prefix
//!    of a valid sequence decodes to `Incomplete`.
//!
//! 5. **Decoder never panics** on arbitrary bytes.

use proptest::prelude::*;
use sectui_core::ansi::{
    self, AnsiError, Color, ColorLayer, CsiCode, Sequence, cursor, decode, decode_csi, sgr,
};

fn any_color() -> impl Strategy<Value = Color> {
    prop_oneof![
        (0u8..16).prop_map(|n| match n {
            0 => Color::Black,
            1 => Color::Red,
            2 => Color::Green,
            3 => Color::Yellow,
            4 => Color::Blue,
            5 => Color::Magenta,
            6 => Color::Cyan,
            7 => Color::White,
            8 => Color::BrightBlack,
            9 => Color::BrightRed,
            10 => Color::BrightGreen,
            11 => Color::BrightYellow,
            12 => Color::BrightBlue,
            13 => Color::BrightMagenta,
            14 => Color::BrightCyan,
            _ => Color::BrightWhite,
        }),
        any::<u8>().prop_map(Color::Indexed),
        (any::<u8>(), any::<u8>(), any::<u8>()).prop_map(|(r, g, b)| Color::Rgb(r, g, b)),
    ]
}

fn any_layer() -> impl Strategy<Value = ColorLayer> {
    prop_oneof![Just(ColorLayer::Foreground), Just(ColorLayer::Background)]
}

fn any_op_code() -> impl Strategy<Value = CsiCode> {
    prop_oneof![
        (any_color(), any_layer()).prop_map(|(color, layer)| color.sgr(layer)),
        (0u32..1000).prop_map(cursor::up),
        (0u32..1000).prop_map(cursor::down),
        (0u32..1000).prop_map(cursor::forward),
        (0u32..1000).prop_map(cursor::back),
        prop_oneof![
            Just(cursor::EraseLine::ToEnd),
            Just(cursor::EraseLine::ToStart),
            Just(cursor::EraseLine::All),
        ]
        .prop_map(cursor::erase_line),
        prop_oneof![
            Just(sgr::reset()),
            Just(sgr::bold()),
            Just(sgr::underline()),
            Just(sgr::invert()),
            Just(sgr::strikethrough()),
            Just(sgr::clear_bold()),
            Just(sgr::clear_underline()),
            Just(sgr::clear_invert()),
            Just(sgr::clear_strikethrough()),
            Just(sgr::clear_fg()),
            Just(sgr::clear_bg()),
        ],
    ]
}

proptest! {
    #[test]
    fn encode_decode_encode_is_stable(code in any_op_code()) {
        let encoded = code.encode();
        let decoded = decode_csi(&encoded).unwrap();
        prop_assert_eq!(&decoded, &code);
        let reencoded = decode_csi(&decoded.encode()).unwrap();
        prop_assert_eq!(reencoded, decoded);
    }

    #[test]
    fn sgr_colors_keep_their_meaning(color in any_color(), layer in any_layer()) {
        let decoded = decode_csi(&color.sgr(layer).encode()).unwrap();
        prop_assert_eq!(decoded.sgr_meaning(), Some(ansi::SgrMeaning::Color(layer, color)));
    }

    #[test]
    fn leading_zeros_do_not_change_the_code(n in 0u32..10_000, zeros in 1usize..4) {
        let padded = format!("\x1b[{}{n}A", "0".repeat(zeros));
        prop_assert_eq!(decode_csi(&padded).unwrap(), cursor::up(n));
    }

    #[test]
    fn decode_reports_exact_length(code in any_op_code(), tail in "[a-z ]{0,12}") {
        let encoded = code.encode();
        let input = format!("{encoded}{tail}");
        let (sequence, len) = decode(input.as_bytes()).unwrap();
        prop_assert_eq!(len, encoded.len());
        prop_assert_eq!(sequence, Sequence::Csi(code));
    }

    #[test]
    fn strict_prefixes_are_incomplete(code in any_op_code()) {
        let encoded = code.encode();
        for end in 1..encoded.len() {
            prop_assert_eq!(decode(&encoded.as_bytes()[..end]), Err(AnsiError::Incomplete));
        }
    }

    #[test]
    fn hyperlinks_round_trip(uri in "https://[a-z]{1,10}\\.com/[a-z0-9/]{0,10}", id in "[a-z0-9]{0,6}") {
        let params = if id.is_empty() { String::new() } else { format!("id={id}") };
        let open = ansi::hyperlink_open(&uri, &params);
        let (sequence, len) = decode(open.as_bytes()).unwrap();
        prop_assert_eq!(len, open.len());
        let Sequence::Osc(osc) = sequence else {
            return Err(TestCaseError::fail("expected OSC"));
        };
        prop_assert_eq!(osc.hyperlink(), Some((params.as_str(), uri.as_str())));
    }

    #[test]
    fn decoder_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..32)) {
        let mut input = vec![0x1b];
        input.extend(bytes);
        let _ = decode(&input);
    }
}
