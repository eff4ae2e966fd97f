// JSON framing for OVSDB streams.
//
// OVSDB does not delimit messages: each one is a complete JSON object
// written back to back, optionally separated by whitespace. The decoder
// yields one value per complete object and leaves partial input buffered.

use bytes::{Buf, BytesMut};
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::Error;

/// Largest single message accepted before the stream is declared broken.
const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// Splits the stream on the closing brace of each top-level object.
///
/// Bytes are scanned once: the nesting depth and string state survive
/// between calls, so a frame arriving in many reads is only parsed when
/// its last byte is in.
#[derive(Debug, Default)]
pub(crate) struct JsonCodec {
    /// Bytes of the current frame already scanned.
    scanned: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl JsonCodec {
    /// Advance the scan over `buf`, returning the frame length once the
    /// outermost object or array closes.
    fn scan(&mut self, buf: &[u8]) -> Result<Option<usize>, Error> {
        for (offset, &byte) in buf[self.scanned..].iter().enumerate() {
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            match byte {
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' if self.depth > 0 => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        let end = self.scanned + offset + 1;
                        self.scanned = 0;
                        return Ok(Some(end));
                    }
                }
                _ if self.depth == 0 => {
                    return Err(invalid(format!(
                        "expected a JSON object, found byte 0x{byte:02x}"
                    )));
                }
                b'"' => self.in_string = true,
                _ => {}
            }
        }
        self.scanned = buf.len();
        Ok(None)
    }
}

fn invalid(message: String) -> Error {
    Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, message))
}

impl Decoder for JsonCodec {
    type Item = Value;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Value>, Error> {
        if self.depth == 0 {
            // Whitespace between messages.
            let gap = src.iter().take_while(|b| b.is_ascii_whitespace()).count();
            src.advance(gap);
            self.scanned = 0;
        }

        match self.scan(src)? {
            Some(end) => {
                let frame = src.split_to(end);
                Ok(Some(serde_json::from_slice(&frame)?))
            }
            None if src.len() > MAX_FRAME_BYTES => Err(invalid(format!(
                "incoming message exceeds {MAX_FRAME_BYTES} bytes"
            ))),
            None => Ok(None),
        }
    }
}

impl Encoder<Value> for JsonCodec {
    type Error = Error;

    fn encode(&mut self, item: Value, dst: &mut BytesMut) -> Result<(), Error> {
        let encoded = serde_json::to_vec(&item)?;
        dst.reserve(encoded.len());
        dst.extend_from_slice(&encoded);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_back_to_back_objects() {
        let mut codec = JsonCodec::default();
        let mut buf = BytesMut::from(&br#"{"id":1,"result":[]}{"id":2,"result":{}}"#[..]);

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap()["id"], 1);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap()["id"], 2);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn waits_for_partial_object() {
        let mut codec = JsonCodec::default();
        let mut buf = BytesMut::from(&br#"{"id":7,"res"#[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(br#"ult":null}"#);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap()["id"], 7);
    }

    #[test]
    fn skips_whitespace_between_messages() {
        let mut codec = JsonCodec::default();
        let mut buf = BytesMut::from(&b"\n  {\"id\":3}\n\n"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap()["id"], 3);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn rejects_garbage() {
        let mut codec = JsonCodec::default();
        let mut buf = BytesMut::from(&b"}{"[..]);
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn braces_inside_strings_do_not_end_frame() {
        let mut codec = JsonCodec::default();
        let raw = br#"{"details":"a \"}\" ] { brace","id":4}{"id":5}"#;
        let mut buf = BytesMut::new();

        let mut decoded = Vec::new();
        for byte in raw {
            buf.extend_from_slice(&[*byte]);
            while let Some(value) = codec.decode(&mut buf).unwrap() {
                decoded.push(value);
            }
        }

        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0]["details"], "a \"}\" ] { brace");
        assert_eq!(decoded[0]["id"], 4);
        assert_eq!(decoded[1]["id"], 5);
    }

    #[test]
    fn large_frame_arrives_in_chunks() {
        let rows: serde_json::Map<String, Value> = (0..50_000)
            .map(|i| {
                (
                    format!("{i:08}-0000-4000-8000-000000000000"),
                    json!({ "new": { "name": format!("vnet{i}"), "external_ids": ["map", [["note", "}{\"]"]]] } }),
                )
            })
            .collect();
        let frame = serde_json::to_vec(&json!({
            "id": null,
            "method": "update",
            "params": ["cache", { "Interface": rows }]
        }))
        .unwrap();
        assert!(frame.len() > 4 * 1024 * 1024);

        let mut codec = JsonCodec::default();
        let mut buf = BytesMut::new();
        let mut chunks = frame.chunks(8 * 1024).peekable();
        while let Some(chunk) = chunks.next() {
            buf.extend_from_slice(chunk);
            let decoded = codec.decode(&mut buf).unwrap();
            if chunks.peek().is_some() {
                assert!(decoded.is_none());
            } else {
                let message = decoded.unwrap();
                assert_eq!(message["params"][1]["Interface"].as_object().unwrap().len(), 50_000);
            }
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn encodes_compact_json() {
        let mut codec = JsonCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(json!({"method": "echo"}), &mut buf).unwrap();
        assert_eq!(&buf[..], br#"{"method":"echo"}"#);
    }
}
