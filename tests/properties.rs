//! Property-based tests for the codec and the stream framer.
//!
//! These tests use proptest to check that decoding agrees with encoding for
//! all generated inputs:
//! - Commands survive encode and peer-side decode unchanged
//! - Replies survive serialize and decode unchanged
//! - The framer's output does not depend on how the bytes were split
//! - Nothing panics on arbitrary input

use bytes::Bytes;
use proptest::prelude::*;
use shardis::{Command, ParseError, Reply, StreamFramer, SyncReader, Verb};

// Strategy for picking any verb from the table
fn verb_strategy() -> impl Strategy<Value = Verb> {
    proptest::sample::select(Verb::ALL.to_vec())
}

// Strategy for binary-safe arguments, including empty ones and embedded CRLF
fn arg_strategy() -> impl Strategy<Value = Bytes> {
    prop_oneof![
        proptest::collection::vec(any::<u8>(), 0..48).prop_map(Bytes::from),
        Just(Bytes::new()),
        Just(Bytes::from_static(b"\r\n")),
        Just(Bytes::from_static(b"$-1\r\n")),
    ]
}

fn command_strategy() -> impl Strategy<Value = Command> {
    (verb_strategy(), proptest::collection::vec(arg_strategy(), 0..8))
        .prop_map(|(verb, args)| Command::with_args(verb, args))
}

// Strategy for replies up to four aggregates deep
fn reply_strategy() -> impl Strategy<Value = Reply> {
    let leaf = prop_oneof![
        "[a-zA-Z0-9 ]{0,20}".prop_map(Reply::Status),
        "[A-Z]{1,8} [a-z ]{0,20}".prop_map(Reply::Error),
        any::<i64>().prop_map(Reply::Integer),
        proptest::collection::vec(any::<u8>(), 0..64).prop_map(|v| Reply::Bulk(Some(Bytes::from(v)))),
        Just(Reply::Bulk(None)),
        Just(Reply::Aggregate(None)),
    ];
    leaf.prop_recursive(4, 64, 8, |inner| {
        proptest::collection::vec(inner, 0..8).prop_map(|items| Reply::Aggregate(Some(items)))
    })
}

fn wire(replies: &[Reply]) -> Vec<u8> {
    let mut buf = Vec::new();
    for reply in replies {
        reply.serialize_into(&mut buf);
    }
    buf
}

fn push_in_pieces(bytes: &[u8], cuts: &[usize]) -> Result<Vec<Reply>, ParseError> {
    let mut cuts: Vec<usize> = cuts.iter().map(|c| c % (bytes.len() + 1)).collect();
    cuts.sort_unstable();

    let mut framer = StreamFramer::new();
    let mut out = Vec::new();
    let mut start = 0;
    for cut in cuts {
        out.extend(framer.push(&bytes[start..cut])?);
        start = cut;
    }
    out.extend(framer.push(&bytes[start..])?);
    assert!(framer.is_idle());
    Ok(out)
}

#[test]
fn prop_command_round_trip() {
    proptest!(|(command in command_strategy())| {
        let encoded = command.encode();
        prop_assert_eq!(encoded.len(), command.encoded_len());

        let mut reader = SyncReader::new(&encoded[..]);
        let frame = reader.read_reply().unwrap();
        prop_assert!(reader.get_ref().is_empty());
        prop_assert_eq!(Command::from_frame(frame).unwrap(), command);
    });
}

#[test]
fn prop_command_frame_shape() {
    proptest!(|(command in command_strategy())| {
        let encoded = command.encode();
        let header = format!("*{}\r\n", command.args().len() + 1);
        prop_assert!(encoded.starts_with(header.as_bytes()));

        let mut framer = StreamFramer::new();
        let frames = framer.push(&encoded).unwrap();
        prop_assert_eq!(frames.len(), 1);
        let items = frames[0].as_aggregate().unwrap();
        prop_assert_eq!(items[0].as_bytes(), Some(command.verb().as_bytes()));
    });
}

#[test]
fn prop_reply_round_trip() {
    proptest!(|(reply in reply_strategy())| {
        let bytes = reply.serialize();

        let mut reader = SyncReader::new(&bytes[..]);
        prop_assert_eq!(reader.read_reply().unwrap(), reply.clone());

        let mut framer = StreamFramer::new();
        prop_assert_eq!(framer.push(&bytes).unwrap(), vec![reply]);
        prop_assert!(framer.is_idle());
    });
}

#[test]
fn prop_framer_split_equivalence() {
    proptest!(|(
        replies in proptest::collection::vec(reply_strategy(), 1..8),
        cuts in proptest::collection::vec(any::<usize>(), 0..16),
    )| {
        let bytes = wire(&replies);
        let one_shot = StreamFramer::new().push(&bytes).unwrap();
        let pieces = push_in_pieces(&bytes, &cuts).unwrap();

        prop_assert_eq!(&one_shot, &replies);
        prop_assert_eq!(&pieces, &replies);
    });
}

#[test]
fn prop_framer_byte_at_a_time() {
    proptest!(|(replies in proptest::collection::vec(reply_strategy(), 1..4))| {
        let bytes = wire(&replies);
        let mut framer = StreamFramer::new();
        let mut out = Vec::new();
        for byte in &bytes {
            out.extend(framer.push(std::slice::from_ref(byte)).unwrap());
        }
        prop_assert_eq!(out, replies);
    });
}

#[test]
fn prop_incomplete_reply_is_never_emitted() {
    proptest!(|(reply in reply_strategy(), cut in any::<usize>())| {
        let bytes = reply.serialize();
        let cut = cut % bytes.len();

        let mut framer = StreamFramer::new();
        prop_assert!(framer.push(&bytes[..cut]).unwrap().is_empty());
        prop_assert_eq!(framer.push(&bytes[cut..]).unwrap(), vec![reply]);
    });
}

#[test]
fn prop_arbitrary_bytes_do_not_panic() {
    proptest!(|(bytes in proptest::collection::vec(any::<u8>(), 0..256))| {
        let mut framer = StreamFramer::new();
        let _ = framer.push(&bytes);

        let mut reader = SyncReader::new(&bytes[..]);
        let _ = reader.read_reply();
    });
}
