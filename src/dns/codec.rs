use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use log::debug;
use thiserror::Error;

use super::types::{CLASS_IN, RecordType};

/// Fixed DNS header size (RFC 1035 Section 4.1.1)
pub const HEADER_LEN: usize = 12;
/// Largest message carried over plain UDP without EDNS (RFC 1035 Section 2.3.4)
pub const MAX_MESSAGE_LEN: usize = 512;
/// RFC 1035 Section 2.3.4: labels must be 63 octets or less
pub const MAX_LABEL_LEN: usize = 63;

/// Every query carries the same transaction id.
pub const QUERY_ID: u16 = 0x1339;
/// Standard query (opcode 0) with RD set.
const FLAGS_RECURSION_DESIRED: u16 = 0x0100;

const POINTER_MASK: u8 = 0xC0;
/// TYPE(2) + CLASS(2) + TTL(4) + RDLENGTH(2)
const RR_FIXED_LEN: usize = 10;
const IPV4_LEN: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("hostname is empty")]
    EmptyHostname,
    #[error("hostname {0:?} contains an empty label")]
    EmptyLabel(String),
    #[error("label {label:?} is {len} bytes, the limit is 63")]
    LabelTooLong { label: String, len: usize },
    #[error("query would be {0} bytes, the limit is 512")]
    MessageTooLong(usize),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("response is truncated or malformed")]
    Truncated,
    #[error("response carries no IPv4 address record")]
    NoAddress,
}

/// Build an A/IN query for `hostname`.
///
/// ```text
/// +---------------------+
/// | ID=0x1339 RD=1      |  12-byte header, QDCOUNT=1, other counts 0
/// +---------------------+
/// | QNAME               |  length-prefixed labels, zero terminated
/// | QTYPE=1 QCLASS=1    |
/// +---------------------+
/// ```
///
/// One trailing dot is accepted and dropped. The outgoing name is never
/// compressed.
pub fn encode_query(hostname: &str) -> Result<Bytes, EncodeError> {
    let name = hostname.strip_suffix('.').unwrap_or(hostname);
    if name.is_empty() {
        return Err(EncodeError::EmptyHostname);
    }

    // QNAME is one byte longer than the dotted form, plus the terminator
    let encoded_len = HEADER_LEN + name.len() + 2 + 4;
    if encoded_len > MAX_MESSAGE_LEN {
        return Err(EncodeError::MessageTooLong(encoded_len));
    }

    let mut buf = BytesMut::with_capacity(encoded_len);
    buf.put_u16(QUERY_ID);
    buf.put_u16(FLAGS_RECURSION_DESIRED);
    buf.put_u16(1); // QDCOUNT
    buf.put_u16(0); // ANCOUNT
    buf.put_u16(0); // NSCOUNT
    buf.put_u16(0); // ARCOUNT

    for label in name.split('.') {
        if label.is_empty() {
            return Err(EncodeError::EmptyLabel(hostname.to_string()));
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(EncodeError::LabelTooLong {
                label: label.to_string(),
                len: label.len(),
            });
        }
        buf.put_u8(label.len() as u8);
        buf.put_slice(label.as_bytes());
    }
    buf.put_u8(0);

    buf.put_u16(RecordType::A.code());
    buf.put_u16(CLASS_IN);

    Ok(buf.freeze())
}

/// Scan a response for its first IPv4 address record.
///
/// The header's ANCOUNT is read, the single echoed question is skipped, and
/// answers are walked in order:
///
/// ```text
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     /                      NAME                     /  labels or a 2-byte pointer
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |              TYPE             |     CLASS     |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |              TTL              |   RDLENGTH    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     /                     RDATA                     /
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// ```
///
/// The first record with TYPE=A, CLASS=IN and RDLENGTH=4 wins; anything else
/// is skipped by its RDLENGTH. Compression pointers are stepped over and never
/// followed, so a self-referencing pointer cannot loop. Every iteration
/// consumes at least eleven bytes or fails, which bounds the scan by the
/// buffer length whatever ANCOUNT claims.
pub fn decode_response(data: &[u8]) -> Result<Ipv4Addr, DecodeError> {
    let mut cursor = Cursor::new(data);

    cursor.skip(6)?; // ID, flags, QDCOUNT
    let an_count = cursor.read_u16()?;
    cursor.skip(4)?; // NSCOUNT, ARCOUNT

    cursor.skip_name()?;
    cursor.skip(4)?; // QTYPE + QCLASS

    for _ in 0..an_count {
        cursor.skip_name()?;

        let rtype = cursor.read_u16()?;
        let rclass = cursor.read_u16()?;
        cursor.skip(4)?; // TTL
        let rdlength = cursor.read_u16()? as usize;

        if rtype == RecordType::A.code()
            && rclass == CLASS_IN
            && rdlength == IPV4_LEN
            && cursor.remaining() >= IPV4_LEN
        {
            let octets = cursor.take(IPV4_LEN)?;
            return Ok(Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]));
        }

        debug!(
            "skipping {} record (class {rclass}, {rdlength} bytes)",
            RecordType::from_u16(rtype)
        );
        cursor.skip(rdlength)?;
    }

    Err(DecodeError::NoAddress)
}

/// Read position over a response buffer. Every read checks the remaining
/// length first and reports [`DecodeError::Truncated`] instead of indexing
/// past the end.
#[derive(Debug)]
struct Cursor<'a> {
    buf: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn ensure(&self, n: usize) -> Result<(), DecodeError> {
        if self.buf.remaining() < n {
            return Err(DecodeError::Truncated);
        }
        Ok(())
    }

    fn skip(&mut self, n: usize) -> Result<(), DecodeError> {
        self.ensure(n)?;
        self.buf.advance(n);
        Ok(())
    }

    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    fn read_u16(&mut self) -> Result<u16, DecodeError> {
        self.ensure(2)?;
        Ok(self.buf.get_u16())
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        self.ensure(n)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    /// Step over a domain name (RFC 1035 Section 4.1.4).
    ///
    /// A length byte with the top two bits set is a pointer: its two bytes
    /// end the name and the target is ignored. A zero byte ends the name.
    /// Any other byte is a label length.
    fn skip_name(&mut self) -> Result<(), DecodeError> {
        loop {
            let len = self.read_u8()?;
            if len & POINTER_MASK == POINTER_MASK {
                return self.skip(1);
            }
            if len == 0 {
                return Ok(());
            }
            self.skip(len as usize)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CNAME: u16 = 5;

    /// Question section copied from a query, with QR set and `answers`
    /// appended as already-encoded records.
    fn response_for(query: &[u8], answers: &[Vec<u8>]) -> Vec<u8> {
        let mut msg = query.to_vec();
        msg[2] = 0x81;
        msg[3] = 0x80;
        msg[6..8].copy_from_slice(&(answers.len() as u16).to_be_bytes());
        for answer in answers {
            msg.extend_from_slice(answer);
        }
        msg
    }

    fn record(name: &[u8], rtype: u16, class: u16, rdata: &[u8]) -> Vec<u8> {
        let mut rr = name.to_vec();
        rr.extend_from_slice(&rtype.to_be_bytes());
        rr.extend_from_slice(&class.to_be_bytes());
        rr.extend_from_slice(&300u32.to_be_bytes());
        rr.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        rr.extend_from_slice(rdata);
        rr
    }

    const POINTER_TO_QNAME: &[u8] = &[0xC0, 0x0C];

    fn labels(query: &[u8]) -> Vec<String> {
        let mut labels = Vec::new();
        let mut i = HEADER_LEN;
        while query[i] != 0 {
            let len = query[i] as usize;
            labels.push(String::from_utf8(query[i + 1..i + 1 + len].to_vec()).unwrap());
            i += 1 + len;
        }
        labels
    }

    #[test]
    fn encodes_example_com() {
        let query = encode_query("example.com").unwrap();
        assert_eq!(query.len(), 29);
        assert_eq!(
            &query[..HEADER_LEN],
            &[0x13, 0x39, 0x01, 0x00, 0, 1, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(&query[HEADER_LEN..25], b"\x07example\x03com\x00");
        assert_eq!(&query[25..], &[0, 1, 0, 1]);
    }

    #[test]
    fn trailing_dot_is_dropped() {
        assert_eq!(
            encode_query("example.com.").unwrap(),
            encode_query("example.com").unwrap()
        );
    }

    #[test]
    fn rejects_bad_hostnames() {
        assert_eq!(encode_query(""), Err(EncodeError::EmptyHostname));
        assert_eq!(encode_query("."), Err(EncodeError::EmptyHostname));
        assert!(matches!(
            encode_query("a..b"),
            Err(EncodeError::EmptyLabel(_))
        ));
        assert!(matches!(
            encode_query(".com"),
            Err(EncodeError::EmptyLabel(_))
        ));

        let long = format!("{}.com", "a".repeat(64));
        assert_eq!(
            encode_query(&long),
            Err(EncodeError::LabelTooLong {
                label: "a".repeat(64),
                len: 64
            })
        );
        assert!(encode_query(&format!("{}.com", "a".repeat(63))).is_ok());
    }

    #[test]
    fn rejects_names_over_message_budget() {
        // 9 labels of 63 bytes: 9 * 64 + 1 + 16 > 512
        let name = vec!["x".repeat(63); 9].join(".");
        assert!(matches!(
            encode_query(&name),
            Err(EncodeError::MessageTooLong(_))
        ));

        // 7 labels of 63 bytes fit
        let name = vec!["x".repeat(63); 7].join(".");
        assert!(encode_query(&name).is_ok());
    }

    #[test]
    fn mirrored_question_keeps_its_structure() {
        let cases = [
            "a".to_string(),
            "www.example.com".to_string(),
            vec!["x".repeat(63); 7].join("."),
            vec!["q"; 127].join("."),
            vec!["ab"; 100].join("."),
        ];
        for name in &cases {
            let query = encode_query(name).unwrap();
            let expected: Vec<&str> = name.split('.').collect();
            assert_eq!(labels(&query), expected);
            assert_eq!(query.len(), HEADER_LEN + name.len() + 2 + 4);

            // The answer only decodes if the question was skipped to the exact byte.
            let answer = record(POINTER_TO_QNAME, 1, 1, &[10, 1, 2, 3]);
            let response = response_for(&query, &[answer]);
            assert_eq!(decode_response(&response), Ok(Ipv4Addr::new(10, 1, 2, 3)));
        }
    }

    #[test]
    fn decodes_single_a_record() {
        let query = encode_query("example.com").unwrap();
        let answer = record(POINTER_TO_QNAME, 1, 1, &[93, 184, 216, 34]);
        let response = response_for(&query, &[answer]);
        assert_eq!(
            decode_response(&response),
            Ok(Ipv4Addr::new(93, 184, 216, 34))
        );
    }

    #[test]
    fn first_a_record_wins() {
        let query = encode_query("www.example.com").unwrap();
        let cname_target = b"\x03cdn\x07example\x03net\x00";
        let answers = [
            record(POINTER_TO_QNAME, CNAME, 1, cname_target),
            record(&[0xC0, 0x2D], 1, 1, &[1, 2, 3, 4]),
            record(&[0xC0, 0x2D], 1, 1, &[5, 6, 7, 8]),
        ];
        let response = response_for(&query, &answers);
        assert_eq!(decode_response(&response), Ok(Ipv4Addr::new(1, 2, 3, 4)));
    }

    #[test]
    fn compressed_and_literal_names_decode_alike() {
        let query = encode_query("example.com").unwrap();
        let rdata = [198, 51, 100, 7];
        let compressed = response_for(&query, &[record(POINTER_TO_QNAME, 1, 1, &rdata)]);
        let literal = response_for(
            &query,
            &[record(b"\x07example\x03com\x00", 1, 1, &rdata)],
        );
        assert_eq!(decode_response(&compressed), decode_response(&literal));
        assert_eq!(decode_response(&literal), Ok(Ipv4Addr::new(198, 51, 100, 7)));
    }

    #[test]
    fn label_then_pointer_name_is_skipped() {
        let query = encode_query("example.com").unwrap();
        let name = b"\x03www\xC0\x0C";
        let response = response_for(&query, &[record(name, 1, 1, &[9, 9, 9, 9])]);
        assert_eq!(decode_response(&response), Ok(Ipv4Addr::new(9, 9, 9, 9)));
    }

    #[test]
    fn non_matching_records_are_skipped() {
        let query = encode_query("example.com").unwrap();
        let answers = [
            // CHAOS class
            record(POINTER_TO_QNAME, 1, 3, &[1, 1, 1, 1]),
            // A with a bogus length
            record(POINTER_TO_QNAME, 1, 1, &[2, 2, 2, 2, 2]),
            // AAAA
            record(POINTER_TO_QNAME, 28, 1, &[0; 16]),
            record(POINTER_TO_QNAME, 1, 1, &[3, 3, 3, 3]),
        ];
        let response = response_for(&query, &answers);
        assert_eq!(decode_response(&response), Ok(Ipv4Addr::new(3, 3, 3, 3)));
    }

    #[test]
    fn answers_without_a_record_report_no_address() {
        let query = encode_query("example.com").unwrap();
        assert_eq!(
            decode_response(&response_for(&query, &[])),
            Err(DecodeError::NoAddress)
        );

        let aaaa = record(POINTER_TO_QNAME, 28, 1, &[0; 16]);
        assert_eq!(
            decode_response(&response_for(&query, &[aaaa])),
            Err(DecodeError::NoAddress)
        );
    }

    #[test]
    fn every_prefix_is_rejected_safely() {
        let query = encode_query("www.example.com").unwrap();
        let answers = [
            record(POINTER_TO_QNAME, CNAME, 1, b"\x03cdn\xC0\x10"),
            record(b"\x03cdn\x07example\x03com\x00", 1, 1, &[1, 2, 3, 4]),
        ];
        let response = response_for(&query, &answers);
        assert!(decode_response(&response).is_ok());

        for cut in 0..response.len() {
            let result = decode_response(&response[..cut]);
            assert!(
                matches!(result, Err(DecodeError::Truncated | DecodeError::NoAddress)),
                "prefix of {cut} bytes gave {result:?}"
            );
        }
    }

    #[test]
    fn short_header_is_truncated() {
        assert_eq!(decode_response(&[]), Err(DecodeError::Truncated));
        assert_eq!(decode_response(&[0; 11]), Err(DecodeError::Truncated));
    }

    #[test]
    fn oversized_rdlength_is_truncated() {
        let query = encode_query("example.com").unwrap();
        let mut rr = record(POINTER_TO_QNAME, CNAME, 1, &[0; 4]);
        let len_at = rr.len() - 6;
        rr[len_at..len_at + 2].copy_from_slice(&400u16.to_be_bytes());
        let response = response_for(&query, &[rr]);
        assert_eq!(decode_response(&response), Err(DecodeError::Truncated));
    }

    #[test]
    fn huge_answer_count_stops_at_buffer_end() {
        let query = encode_query("example.com").unwrap();
        let aaaa = record(POINTER_TO_QNAME, 28, 1, &[0; 16]);
        let mut response = response_for(&query, &[aaaa.clone(), aaaa]);
        response[6..8].copy_from_slice(&u16::MAX.to_be_bytes());
        assert_eq!(decode_response(&response), Err(DecodeError::Truncated));
    }

    #[test]
    fn self_referencing_pointer_terminates() {
        let query = encode_query("example.com").unwrap();
        let mut response = response_for(&query, &[]);
        response[6..8].copy_from_slice(&1u16.to_be_bytes());
        let at = response.len() as u8;
        // pointer to itself, then a valid A record body
        response.extend_from_slice(&[0xC0, at]);
        response.extend_from_slice(&record(&[], 1, 1, &[4, 3, 2, 1]));
        assert_eq!(decode_response(&response), Ok(Ipv4Addr::new(4, 3, 2, 1)));
    }
}
