//! Unit tests for the NDJSON line codec.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use analysis_client::transport::codec::{Frame, ServiceCodec};

/// A complete line is returned without its trailing newline.
#[test]
fn complete_line_is_decoded() {
    let mut codec = ServiceCodec::new();
    let mut buf = BytesMut::from("{\"event\":\"server.status\",\"params\":{}}\n");

    let frame = codec.decode(&mut buf).expect("decode must succeed");

    assert_eq!(
        frame,
        Some(Frame::Line(
            "{\"event\":\"server.status\",\"params\":{}}".to_owned()
        ))
    );
    assert!(buf.is_empty(), "the line must be consumed from the buffer");
}

/// Two lines in one buffer come out as two frames, in order.
#[test]
fn batched_lines_are_decoded_in_order() {
    let mut codec = ServiceCodec::new();
    let mut buf = BytesMut::from("{\"id\":\"0\"}\n{\"id\":\"1\"}\n");

    let first = codec.decode(&mut buf).expect("first decode");
    let second = codec.decode(&mut buf).expect("second decode");
    let third = codec.decode(&mut buf).expect("third decode");

    assert_eq!(first, Some(Frame::Line("{\"id\":\"0\"}".to_owned())));
    assert_eq!(second, Some(Frame::Line("{\"id\":\"1\"}".to_owned())));
    assert_eq!(third, None, "nothing left to decode");
}

/// A line delivered in two chunks is buffered until its newline arrives.
#[test]
fn partial_line_waits_for_newline() {
    let mut codec = ServiceCodec::new();
    let mut buf = BytesMut::from("{\"id\":");

    assert_eq!(codec.decode(&mut buf).expect("partial decode"), None);

    buf.extend_from_slice(b"\"7\"}\n");
    assert_eq!(
        codec.decode(&mut buf).expect("completed decode"),
        Some(Frame::Line("{\"id\":\"7\"}".to_owned()))
    );
}

/// CRLF line endings are accepted.
#[test]
fn carriage_return_is_stripped() {
    let mut codec = ServiceCodec::new();
    let mut buf = BytesMut::from("{}\r\n");

    assert_eq!(
        codec.decode(&mut buf).expect("decode"),
        Some(Frame::Line("{}".to_owned()))
    );
}

/// An over-long line yields `Oversized` and the following line still decodes.
#[test]
fn oversized_line_is_reported_and_skipped() {
    let mut codec = ServiceCodec::with_max_length(8);
    let mut buf = BytesMut::from("0123456789abcdef\n{\"a\":1}\n");

    assert_eq!(
        codec.decode(&mut buf).expect("oversized decode"),
        Some(Frame::Oversized)
    );
    assert_eq!(
        codec.decode(&mut buf).expect("recovery decode"),
        Some(Frame::Line("{\"a\":1}".to_owned())),
        "the codec must resynchronise on the next newline"
    );
}

/// A line that is not UTF-8 yields `InvalidUtf8` instead of an error.
#[test]
fn invalid_utf8_line_is_reported() {
    let mut codec = ServiceCodec::new();
    let mut buf = BytesMut::from(&b"\xff\xfe\n{}\n"[..]);

    assert_eq!(
        codec.decode(&mut buf).expect("invalid utf-8 decode"),
        Some(Frame::InvalidUtf8)
    );
    assert_eq!(
        codec.decode(&mut buf).expect("next decode"),
        Some(Frame::Line("{}".to_owned()))
    );
}

/// A final line without a newline is flushed at end of stream.
#[test]
fn unterminated_line_is_flushed_at_eof() {
    let mut codec = ServiceCodec::new();
    let mut buf = BytesMut::from("{\"id\":\"9\"}");

    assert_eq!(
        codec.decode_eof(&mut buf).expect("eof decode"),
        Some(Frame::Line("{\"id\":\"9\"}".to_owned()))
    );
}

/// The encoder appends exactly one newline.
#[test]
fn encoder_terminates_with_newline() {
    let mut codec = ServiceCodec::new();
    let mut dst = BytesMut::new();

    codec
        .encode("{\"id\":\"0\"}".to_owned(), &mut dst)
        .expect("encode must succeed");

    assert_eq!(&dst[..], b"{\"id\":\"0\"}\n");
}
