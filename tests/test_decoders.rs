//! Integration tests for stream decoder chains.
//!
//! Chains are built from stream dictionaries the way the document builds
//! them, on top of in-memory sources.

mod common;

use bytes::Bytes;
use pdf_oxide_reader::decoders::{build_chain, BoxedDecoder, MemorySource, StreamFormat};
use pdf_oxide_reader::object::{Dict, NoResolve, Object};
use pdf_oxide_reader::Error;
use proptest::prelude::*;
use weezl::{encode::Encoder as LzwEncoder, BitOrder};

fn source(data: &[u8]) -> BoxedDecoder {
    Box::new(MemorySource::new(Bytes::copy_from_slice(data)))
}

fn dict(entries: Vec<(&str, Object)>) -> Dict {
    entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn decode(data: &[u8], entries: Vec<(&str, Object)>) -> pdf_oxide_reader::Result<Vec<u8>> {
    build_chain(source(data), &dict(entries), &NoResolve)?.read_all(0)
}

fn run_length_encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    for chunk in data.chunks(128) {
        out.push((chunk.len() - 1) as u8);
        out.extend_from_slice(chunk);
    }
    out.push(128);
    out
}

fn ascii_hex_encode(data: &[u8]) -> Vec<u8> {
    let mut out: Vec<u8> = data.iter().flat_map(|b| format!("{:02X}", b).into_bytes()).collect();
    out.push(b'>');
    out
}

fn ascii85_encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    for chunk in data.chunks(4) {
        if chunk.len() == 4 && chunk.iter().all(|&b| b == 0) {
            out.push(b'z');
            continue;
        }
        let mut group = [0u8; 4];
        group[..chunk.len()].copy_from_slice(chunk);
        let mut value = u32::from_be_bytes(group);
        let mut chars = [0u8; 5];
        for c in chars.iter_mut().rev() {
            *c = (value % 85) as u8 + b'!';
            value /= 85;
        }
        out.extend_from_slice(&chars[..chunk.len() + 1]);
    }
    out.extend_from_slice(b"~>");
    out
}

#[test]
fn test_flate_chain() {
    common::init_logging();
    let original = b"This is a test of FlateDecode compression in a PDF stream.";
    let decoded = decode(
        &common::deflate(original),
        vec![("Filter", Object::name("FlateDecode"))],
    )
    .unwrap();
    assert_eq!(decoded, original);
}

#[test]
fn test_flate_with_png_up_predictor() {
    // three rows of four bytes, every row tagged Up
    let encoded = [2u8, 1, 2, 3, 4, 2, 4, 4, 4, 4, 2, 0, 0, 0, 0];
    let params = dict(vec![
        ("Predictor", Object::Integer(12)),
        ("Columns", Object::Integer(4)),
    ]);
    let decoded = decode(
        &common::deflate(&encoded),
        vec![
            ("Filter", Object::name("FlateDecode")),
            ("DecodeParms", Object::dict(params)),
        ],
    )
    .unwrap();
    assert_eq!(decoded, [1, 2, 3, 4, 5, 6, 7, 8, 5, 6, 7, 8]);
}

#[test]
fn test_exactly_one_predictor_row() {
    let params = dict(vec![
        ("Predictor", Object::Integer(11)),
        ("Columns", Object::Integer(4)),
    ]);
    let decoded = decode(
        &common::deflate(&[1, 10, 5, 5, 5]),
        vec![
            ("Filter", Object::name("FlateDecode")),
            ("DecodeParms", Object::dict(params)),
        ],
    )
    .unwrap();
    assert_eq!(decoded, [10, 15, 20, 25]);
}

#[test]
fn test_lzw_chain_aaaabbbb() {
    let mut encoder = LzwEncoder::with_tiff_size_switch(BitOrder::Msb, 8);
    let compressed = encoder.encode(b"AAAABBBB").unwrap();
    let params = dict(vec![("EarlyChange", Object::Integer(1))]);
    let decoded = decode(
        &compressed,
        vec![
            ("Filter", Object::name("LZWDecode")),
            ("DecodeParms", Object::dict(params)),
        ],
    )
    .unwrap();
    assert_eq!(decoded, b"AAAABBBB");
}

#[test]
fn test_filter_array_applies_in_order() {
    let inner = run_length_encode(b"Hello, PDF!");
    let outer = ascii_hex_encode(&common::deflate(&inner));
    let decoded = decode(
        &outer,
        vec![(
            "Filter",
            Object::array(vec![
                Object::name("AHx"),
                Object::name("FlateDecode"),
                Object::name("RunLengthDecode"),
            ]),
        )],
    )
    .unwrap();
    assert_eq!(decoded, b"Hello, PDF!");
}

#[test]
fn test_dct_is_returned_encoded() {
    let jpeg = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
    let mut stream = build_chain(
        source(&jpeg),
        &dict(vec![("Filter", Object::name("DCTDecode"))]),
        &NoResolve,
    )
    .unwrap();
    assert_eq!(stream.format(), StreamFormat::JpegEncoded);
    assert_eq!(stream.read_all(0).unwrap(), jpeg);
}

#[test]
fn test_filters_after_dct_are_not_applied() {
    let hex = ascii_hex_encode(b"\xFF\xD8 not really jpeg");
    let mut stream = build_chain(
        source(&hex),
        &dict(vec![(
            "Filter",
            Object::array(vec![
                Object::name("ASCIIHexDecode"),
                Object::name("DCTDecode"),
                Object::name("FlateDecode"),
            ]),
        )]),
        &NoResolve,
    )
    .unwrap();
    assert_eq!(stream.format(), StreamFormat::JpegEncoded);
    assert_eq!(stream.read_all(0).unwrap(), b"\xFF\xD8 not really jpeg");
}

#[test]
fn test_unsupported_filters_fail_construction() {
    let jbig2 = build_chain(
        source(b""),
        &dict(vec![("Filter", Object::name("JBIG2Decode"))]),
        &NoResolve,
    );
    assert!(matches!(jbig2, Err(Error::Unsupported(_))));

    let unknown = build_chain(
        source(b""),
        &dict(vec![("Filter", Object::name("NoSuchDecode"))]),
        &NoResolve,
    );
    assert!(matches!(unknown, Err(Error::UnsupportedFilter(_))));

    let crypt = build_chain(
        source(b""),
        &dict(vec![
            ("Filter", Object::name("Crypt")),
            (
                "DecodeParms",
                Object::dict(dict(vec![("Name", Object::name("StdCF"))])),
            ),
        ]),
        &NoResolve,
    );
    assert!(crypt.is_err());
}

#[test]
fn test_identity_crypt_is_passthrough() {
    let decoded = decode(b"clear", vec![("Filter", Object::name("Crypt"))]).unwrap();
    assert_eq!(decoded, b"clear");
}

#[test]
fn test_image_output_is_limited() {
    // 2x2 gray image, but the compressed data holds ten bytes
    let decoded = decode(
        &common::deflate(&[7u8; 10]),
        vec![
            ("Filter", Object::name("FlateDecode")),
            ("Subtype", Object::name("Image")),
            ("Width", Object::Integer(2)),
            ("Height", Object::Integer(2)),
            ("BitsPerComponent", Object::Integer(8)),
            ("ColorSpace", Object::name("DeviceGray")),
        ],
    )
    .unwrap();
    assert_eq!(decoded, [7u8; 4]);
}

#[test]
fn test_rewind_restarts_chain() {
    let mut stream = build_chain(
        source(&common::deflate(b"again and again")),
        &dict(vec![("Filter", Object::name("FlateDecode"))]),
        &NoResolve,
    )
    .unwrap();
    let mut head = [0u8; 5];
    assert_eq!(stream.read_fully(&mut head).unwrap(), 5);
    assert_eq!(&head, b"again");
    stream.rewind().unwrap();
    assert_eq!(stream.read_all(0).unwrap(), b"again and again");
}

#[test]
fn test_std_io_read_adapter() {
    use std::io::Read;

    let mut stream = build_chain(
        source(b"48 65 6C 6C 6F>"),
        &dict(vec![("Filter", Object::name("ASCIIHexDecode"))]),
        &NoResolve,
    )
    .unwrap();
    let mut text = String::new();
    stream.read_to_string(&mut text).unwrap();
    assert_eq!(text, "Hello");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_flate_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let decoded = decode(&common::deflate(&data), vec![("Filter", Object::name("FlateDecode"))]).unwrap();
        prop_assert_eq!(decoded, data);
    }

    #[test]
    fn test_run_length_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let decoded = decode(&run_length_encode(&data), vec![("Filter", Object::name("RunLengthDecode"))]).unwrap();
        prop_assert_eq!(decoded, data);
    }

    #[test]
    fn test_ascii_hex_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let decoded = decode(&ascii_hex_encode(&data), vec![("Filter", Object::name("ASCIIHexDecode"))]).unwrap();
        prop_assert_eq!(decoded, data);
    }

    #[test]
    fn test_ascii85_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let decoded = decode(&ascii85_encode(&data), vec![("Filter", Object::name("ASCII85Decode"))]).unwrap();
        prop_assert_eq!(decoded, data);
    }

    #[test]
    fn test_lzw_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let mut encoder = LzwEncoder::with_tiff_size_switch(BitOrder::Msb, 8);
        let compressed = encoder.encode(&data).unwrap();
        let decoded = decode(&compressed, vec![("Filter", Object::name("LZWDecode"))]).unwrap();
        prop_assert_eq!(decoded, data);
    }
}
