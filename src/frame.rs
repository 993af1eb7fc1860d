//! Thin frame decoder: locate AVP 264 (Origin-Host) in a raw inbound
//! buffer so the Connection Handler can validate a peer's identity.
//!
//! This intentionally does not implement Diameter AVP encoding/decoding
//! business semantics — full framing validation (length, command code,
//! E-bit) is out of scope. A failed decode is advisory: the caller
//! discards the buffer and keeps reading.

use crate::error::FrameDecodeError;

/// AVP code for Origin-Host, RFC 6733.
const ORIGIN_HOST_AVP_CODE: u32 = 264;

const DIAMETER_HEADER_LEN: usize = 20;
const AVP_FLAG_VENDOR: u8 = 0x80;

/// Stands in for the external protocol library referenced by the original
/// service (`decodeDiameterPacket` / `getAvpData` / `getPeerType`). The
/// core only ever needs AVP 264 and a peer classification derived from it;
/// a full AVP codec and command dictionary belong to the worker process,
/// not this front-end.
pub trait DiameterCodec: Send + Sync {
    /// Extract the UTF-8 Origin-Host AVP (code 264) from a raw buffer.
    fn origin_host(&self, buf: &[u8]) -> Result<String, FrameDecodeError>;

    /// Classify a peer by its advertised Origin-Host.
    fn peer_type(&self, origin_host: &str) -> String;
}

/// Minimal bounded AVP scanner: walks the AVP list following the 20-byte
/// Diameter header looking for code 264, without validating command code,
/// E-bit, or overall message length against any command dictionary.
#[derive(Debug, Default, Clone, Copy)]
pub struct BoundedAvpCodec;

impl DiameterCodec for BoundedAvpCodec {
    fn origin_host(&self, buf: &[u8]) -> Result<String, FrameDecodeError> {
        let data = find_avp(buf, ORIGIN_HOST_AVP_CODE)?;
        Ok(std::str::from_utf8(data)?.to_string())
    }

    fn peer_type(&self, origin_host: &str) -> String {
        let lower = origin_host.to_ascii_lowercase();
        if lower.contains("mme") {
            "MME".to_string()
        } else if lower.contains("s-cscf") || lower.contains("scscf") || lower.contains("cscf") {
            "S-CSCF".to_string()
        } else if lower.contains("pcrf") {
            "PCRF".to_string()
        } else if lower.contains("hss") {
            "HSS".to_string()
        } else {
            "UNKNOWN".to_string()
        }
    }
}

/// Walk the AVP list after the Diameter header, returning the data slice of
/// the first AVP matching `code`.
fn find_avp(buf: &[u8], code: u32) -> Result<&[u8], FrameDecodeError> {
    if buf.len() < DIAMETER_HEADER_LEN {
        return Err(FrameDecodeError::TooShort);
    }

    let mut offset = DIAMETER_HEADER_LEN;
    while offset + 8 <= buf.len() {
        let avp_code = u32::from_be_bytes(buf[offset..offset + 4].try_into().unwrap());
        let flags = buf[offset + 4];
        let avp_len = u32_from_be24(&buf[offset + 5..offset + 8]) as usize;

        if avp_len < 8 {
            return Err(FrameDecodeError::TruncatedAvp);
        }

        let header_len = if flags & AVP_FLAG_VENDOR != 0 { 12 } else { 8 };
        if avp_len < header_len || offset + avp_len > buf.len() {
            return Err(FrameDecodeError::TruncatedAvp);
        }

        if avp_code == code {
            return Ok(&buf[offset + header_len..offset + avp_len]);
        }

        // AVPs are padded to a 4-byte boundary; the padding is not part of avp_len.
        let padded_len = avp_len.div_ceil(4) * 4;
        offset += padded_len;
    }

    Err(FrameDecodeError::MissingOriginHost)
}

fn u32_from_be24(bytes: &[u8]) -> u32 {
    ((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | (bytes[2] as u32)
}

/// Build a minimal well-formed Diameter buffer containing only an
/// Origin-Host AVP. Used by unit and integration tests as a reference for
/// the wire shape this decoder expects.
pub fn build_test_frame(origin_host: &str) -> Vec<u8> {
    let data = origin_host.as_bytes();
    let padded_data_len = data.len().div_ceil(4) * 4;
    let avp_len = 8 + data.len();
    let message_len = DIAMETER_HEADER_LEN + 8 + padded_data_len;

    let mut buf = Vec::with_capacity(message_len);
    // Header: version=1, length=message_len, flags=0, code=0, app-id=0, hbh=0, e2e=0
    buf.push(1);
    buf.extend_from_slice(&(message_len as u32).to_be_bytes()[1..]);
    buf.push(0);
    buf.extend_from_slice(&0u32.to_be_bytes()[1..]);
    buf.extend_from_slice(&0u32.to_be_bytes());
    buf.extend_from_slice(&0u32.to_be_bytes());
    buf.extend_from_slice(&0u32.to_be_bytes());

    // AVP 264: code, flags=0, length
    buf.extend_from_slice(&ORIGIN_HOST_AVP_CODE.to_be_bytes());
    buf.push(0);
    buf.extend_from_slice(&(avp_len as u32).to_be_bytes()[1..]);
    buf.extend_from_slice(data);
    buf.resize(buf.len() + (padded_data_len - data.len()), 0);

    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_origin_host_from_well_formed_frame() {
        let frame = build_test_frame("mme01.epc.example");
        let codec = BoundedAvpCodec;
        assert_eq!(codec.origin_host(&frame).unwrap(), "mme01.epc.example");
    }

    #[test]
    fn rejects_buffer_shorter_than_header() {
        let codec = BoundedAvpCodec;
        let err = codec.origin_host(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, FrameDecodeError::TooShort));
    }

    #[test]
    fn rejects_buffer_missing_avp_264() {
        let codec = BoundedAvpCodec;
        // A single non-264 AVP that is itself well-formed, so the scanner
        // runs off the end of the AVP list rather than hitting a length
        // error — this exercises `MissingOriginHost`, not truncation.
        let mut buf = vec![0u8; DIAMETER_HEADER_LEN];
        buf.extend_from_slice(&1u32.to_be_bytes()); // AVP code 1, not 264
        buf.push(0);
        buf.extend_from_slice(&12u32.to_be_bytes()[1..]); // avp_len = 12
        buf.extend_from_slice(&[0u8; 4]); // 4 bytes of data, padded to 4

        let err = codec.origin_host(&buf).unwrap_err();
        assert!(matches!(err, FrameDecodeError::MissingOriginHost));
    }

    #[test]
    fn rejects_avp_whose_length_field_extends_past_the_buffer() {
        let codec = BoundedAvpCodec;
        let mut buf = vec![0u8; DIAMETER_HEADER_LEN];
        buf.extend_from_slice(&ORIGIN_HOST_AVP_CODE.to_be_bytes());
        buf.push(0);
        buf.extend_from_slice(&100u32.to_be_bytes()[1..]); // avp_len = 100, far past the buffer
        // No data bytes appended: buffer ends right after the AVP header.

        let err = codec.origin_host(&buf).unwrap_err();
        assert!(matches!(err, FrameDecodeError::TruncatedAvp));
    }

    #[test]
    fn rejects_avp_264_data_that_is_not_valid_utf8() {
        let codec = BoundedAvpCodec;
        let data = [0xFFu8, 0xFE, 0x00, 0x00];
        let avp_len = 8 + data.len();
        let mut buf = vec![0u8; DIAMETER_HEADER_LEN];
        buf.extend_from_slice(&ORIGIN_HOST_AVP_CODE.to_be_bytes());
        buf.push(0);
        buf.extend_from_slice(&(avp_len as u32).to_be_bytes()[1..]);
        buf.extend_from_slice(&data);

        let err = codec.origin_host(&buf).unwrap_err();
        assert!(matches!(err, FrameDecodeError::InvalidUtf8(_)));
    }

    #[test]
    fn classifies_well_known_peer_types() {
        let codec = BoundedAvpCodec;
        assert_eq!(codec.peer_type("mme01.epc.example"), "MME");
        assert_eq!(codec.peer_type("scscf1.ims.example"), "S-CSCF");
        assert_eq!(codec.peer_type("pcrf.example.org"), "PCRF");
        assert_eq!(codec.peer_type("unknown.example.org"), "UNKNOWN");
    }

    #[test]
    fn ten_bytes_of_garbage_does_not_panic() {
        let codec = BoundedAvpCodec;
        assert!(codec.origin_host(b"garbage123").is_err());
    }
}
