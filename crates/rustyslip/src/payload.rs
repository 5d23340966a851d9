//! Frame payloads: the bytes between two SLIP `END` delimiters.
//!
//! Two layouts coexist in the field and are chosen per deployment, never
//! auto-detected. The heavy layout carries a sequence number, an explicit
//! length and a CRC-16/CCITT; the light layout is a bare pid plus data,
//! with length validation delegated to the message's own schema layout.

use crate::crc::{crc16_ccitt, CRC_INIT};
use crate::error::TransactionError;
use rustymsg::{Created, MessageRegistry};
use std::fmt;

/// Bit 7 of the pid marks a response to the request with the same lower
/// seven bits.
pub const RESPONSE_FLAG: u8 = 0x80;

/// Payload layout selected at connection setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// `{pid, seq, len, data[len], crc16_le}`
    Heavy,
    /// `{pid, data[...]}`, length implied by the frame
    Light,
}

/// One parsed frame: its pid and the dispatched body.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Primitive id, response flag included
    pub pid: u8,
    /// Sequence number (zero under the light layout)
    pub seq: u8,
    /// Typed message for registered ids, opaque bytes otherwise
    pub body: Created,
}

impl Frame {
    /// Whether this frame answers a request sent with `pid`.
    #[must_use]
    pub const fn is_response_to(&self, pid: u8) -> bool {
        self.pid == pid | RESPONSE_FLAG
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "pid: 0x{:02X}", self.pid)?;
        match &self.body {
            Created::Message(msg) => write!(f, "{msg}"),
            Created::Opaque(data) => {
                writeln!(f, "len: {}", data.len())?;
                if !data.is_empty() {
                    write!(f, "data:")?;
                    for byte in data {
                        write!(f, " {byte:02X}")?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            }
        }
    }
}

/// Packs an outbound payload body for the selected layout.
///
/// Under the heavy layout the data must fit the one-byte length field,
/// and the CRC covers `pid|seq|len|data` starting from `0xFFFF`.
pub fn pack_payload(
    variant: Variant,
    pid: u8,
    seq: u8,
    data: &[u8],
) -> Result<Vec<u8>, TransactionError> {
    match variant {
        Variant::Light => {
            let mut out = Vec::with_capacity(1 + data.len());
            out.push(pid);
            out.extend_from_slice(data);
            Ok(out)
        }
        Variant::Heavy => {
            if data.len() > usize::from(u8::MAX) {
                return Err(TransactionError::BadLength {
                    pid,
                    len: data.len(),
                });
            }
            let mut out = Vec::with_capacity(5 + data.len());
            out.push(pid);
            out.push(seq);
            out.push(data.len() as u8);
            out.extend_from_slice(data);
            let crc = crc16_ccitt(CRC_INIT, &out);
            out.extend_from_slice(&crc.to_le_bytes());
            Ok(out)
        }
    }
}

/// Parses a received payload body, validating it for the selected layout
/// and dispatching the data through the registry.
pub fn parse_payload(
    variant: Variant,
    body: &[u8],
    registry: &MessageRegistry,
) -> Result<Frame, TransactionError> {
    match variant {
        Variant::Light => {
            let (&pid, data) = body.split_first().ok_or(TransactionError::BadLength {
                pid: 0,
                len: 0,
            })?;
            // Length validation is delegated to the message layout.
            if let Some(layout) = registry.layout_of(u32::from(pid)) {
                if !layout.matches_len(data.len()) {
                    return Err(TransactionError::BadLength {
                        pid,
                        len: data.len(),
                    });
                }
            }
            let body = registry.create(u32::from(pid), data)?;
            Ok(Frame { pid, seq: 0, body })
        }
        Variant::Heavy => {
            if body.len() < 5 {
                return Err(TransactionError::BadLength {
                    pid: body.first().copied().unwrap_or(0),
                    len: body.len(),
                });
            }
            let pid = body[0];
            let seq = body[1];
            let len = usize::from(body[2]);
            // The length byte counts the data: everything after the pid
            // minus the seq/len header and the trailing CRC.
            if len != body.len() - 5 {
                return Err(TransactionError::BadLength { pid, len });
            }
            let data = &body[3..3 + len];
            let expected = crc16_ccitt(CRC_INIT, &body[..3 + len]);
            let actual = u16::from_le_bytes([body[3 + len], body[4 + len]]);
            if expected != actual {
                return Err(TransactionError::BadCrc { expected, actual });
            }
            let body = registry.create(u32::from(pid), data)?;
            Ok(Frame { pid, seq, body })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustymsg::Schema;
    use std::sync::Arc;

    fn registry() -> MessageRegistry {
        let schema = Schema::from_json_str(
            r#"{"messages": [{"name": "Ping", "desc": "d", "id": 3, "fields": [
                {"name": "token", "type": "uint16", "desc": "t"}
            ]}]}"#,
        )
        .unwrap();
        MessageRegistry::new(Arc::new(schema))
    }

    #[test]
    fn heavy_round_trip() {
        let registry = registry();
        let body = pack_payload(Variant::Heavy, 0x03, 7, &[0x34, 0x12]).unwrap();
        assert_eq!(&body[..3], &[0x03, 0x07, 0x02]);
        let frame = parse_payload(Variant::Heavy, &body, &registry).unwrap();
        assert_eq!(frame.pid, 0x03);
        assert_eq!(frame.seq, 7);
        let Created::Message(msg) = frame.body else {
            panic!("expected typed body");
        };
        assert_eq!(msg.scalar("token"), Some(0x1234));
    }

    #[test]
    fn heavy_rejects_corrupted_crc() {
        let registry = registry();
        let mut body = pack_payload(Variant::Heavy, 0x03, 0, &[0x34, 0x12]).unwrap();
        let last = body.len() - 1;
        body[last] ^= 0xFF;
        assert!(matches!(
            parse_payload(Variant::Heavy, &body, &registry),
            Err(TransactionError::BadCrc { .. })
        ));
    }

    #[test]
    fn heavy_rejects_wrong_length_byte() {
        let registry = registry();
        let mut body = pack_payload(Variant::Heavy, 0x03, 0, &[0x34, 0x12]).unwrap();
        body[2] = 5;
        assert!(matches!(
            parse_payload(Variant::Heavy, &body, &registry),
            Err(TransactionError::BadLength { pid: 0x03, len: 5 })
        ));
    }

    #[test]
    fn heavy_rejects_truncated_body() {
        let registry = registry();
        assert!(matches!(
            parse_payload(Variant::Heavy, &[0x03, 0x00], &registry),
            Err(TransactionError::BadLength { .. })
        ));
    }

    #[test]
    fn light_round_trip() {
        let registry = registry();
        let body = pack_payload(Variant::Light, 0x03, 0, &[0x34, 0x12]).unwrap();
        assert_eq!(body, vec![0x03, 0x34, 0x12]);
        let frame = parse_payload(Variant::Light, &body, &registry).unwrap();
        assert!(matches!(frame.body, Created::Message(_)));
    }

    #[test]
    fn light_rejects_layout_length_mismatch() {
        let registry = registry();
        // Ping expects exactly 2 payload bytes.
        assert!(matches!(
            parse_payload(Variant::Light, &[0x03, 0x34], &registry),
            Err(TransactionError::BadLength { pid: 0x03, len: 1 })
        ));
    }

    #[test]
    fn light_passes_unknown_ids_through() {
        let registry = registry();
        let frame = parse_payload(Variant::Light, &[0x55, 0xAA], &registry).unwrap();
        assert_eq!(frame.body, Created::Opaque(vec![0xAA]));
    }

    #[test]
    fn response_flag_matching() {
        let frame = Frame {
            pid: 0x83,
            seq: 0,
            body: Created::Opaque(vec![]),
        };
        assert!(frame.is_response_to(0x03));
        assert!(!frame.is_response_to(0x04));
    }

    #[test]
    fn heavy_rejects_oversized_data() {
        let data = vec![0u8; 300];
        assert!(matches!(
            pack_payload(Variant::Heavy, 0x03, 0, &data),
            Err(TransactionError::BadLength { len: 300, .. })
        ));
    }
}
