//! DNS message parsing and response synthesis.
//!
//! Only the pieces of RFC 1035 the relay needs: the 16-bit transaction ID,
//! the question name, and two synthesized response shapes built by echoing
//! the original query's question section. Compression pointers in incoming
//! questions are not supported.

use std::net::Ipv4Addr;

use thiserror::Error;

/// Fixed DNS header length in bytes.
pub const HEADER_LEN: usize = 12;

/// TTL for the synthesized redirect A record.
const REDIRECT_TTL: u32 = 60;

/// A datagram that cannot be read as a DNS query.
///
/// The relay treats every variant the same way: drop the datagram.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("datagram too short for a DNS header")]
    Truncated,
    #[error("question section runs past the end of the datagram")]
    BadQuestion,
}

/// Read the transaction ID from the first two bytes.
pub fn transaction_id(data: &[u8]) -> Result<u16, MessageError> {
    if data.len() < 2 {
        return Err(MessageError::Truncated);
    }
    Ok(u16::from_be_bytes([data[0], data[1]]))
}

/// Parse the question name starting at the fixed header boundary.
///
/// Walks length-prefixed labels until the zero terminator and joins them
/// with `.`. Label case is preserved exactly as received.
pub fn question_name(data: &[u8]) -> Result<String, MessageError> {
    if data.len() < HEADER_LEN + 1 {
        return Err(MessageError::Truncated);
    }

    let mut pos = HEADER_LEN;
    let mut labels = Vec::new();

    loop {
        let len = *data.get(pos).ok_or(MessageError::BadQuestion)? as usize;
        if len == 0 {
            break;
        }
        pos += 1;
        let label = data.get(pos..pos + len).ok_or(MessageError::BadQuestion)?;
        let label = std::str::from_utf8(label).map_err(|_| MessageError::BadQuestion)?;
        labels.push(label);
        pos += len;
    }

    Ok(labels.join("."))
}

/// Offset just past the question section: the zero terminator plus the
/// 4-byte QTYPE+QCLASS that follows every question.
pub fn question_end(data: &[u8]) -> Result<usize, MessageError> {
    if data.len() < HEADER_LEN + 1 {
        return Err(MessageError::Truncated);
    }

    let mut pos = HEADER_LEN;
    loop {
        let len = *data.get(pos).ok_or(MessageError::BadQuestion)? as usize;
        pos += 1;
        if len == 0 {
            break;
        }
        pos += len;
    }

    let end = pos + 4;
    if end > data.len() {
        return Err(MessageError::BadQuestion);
    }
    Ok(end)
}

/// Build a denial response for `query` with the given RCODE.
///
/// Copies the ID, rewrites the flags word, preserves QDCOUNT, zeroes the
/// remaining counts and echoes the question section verbatim. No answer
/// records are appended.
pub fn denial_response(query: &[u8], rcode: u16) -> Result<Vec<u8>, MessageError> {
    let end = question_end(query)?;
    let flags = response_flags(query, rcode);

    let mut response = Vec::with_capacity(end);
    response.extend_from_slice(&query[0..2]);
    response.extend_from_slice(&flags.to_be_bytes());
    response.extend_from_slice(&query[4..6]);
    response.extend_from_slice(&[0u8; 6]);
    response.extend_from_slice(&query[HEADER_LEN..end]);

    Ok(response)
}

/// Build a redirect response for `query` pointing at `redirect`.
///
/// Same header transform as a denial with RCODE forced to 0 and ANCOUNT set
/// to 1, followed by the echoed question and one A record. The answer name
/// is a compression pointer to offset 12, which is valid because the echoed
/// question still starts at the fixed header boundary.
pub fn redirect_response(query: &[u8], redirect: Ipv4Addr) -> Result<Vec<u8>, MessageError> {
    let end = question_end(query)?;
    let flags = response_flags(query, 0);

    let mut response = Vec::with_capacity(end + 16);
    response.extend_from_slice(&query[0..2]);
    response.extend_from_slice(&flags.to_be_bytes());
    response.extend_from_slice(&query[4..6]);
    response.extend_from_slice(&1u16.to_be_bytes());
    response.extend_from_slice(&[0u8; 4]);
    response.extend_from_slice(&query[HEADER_LEN..end]);

    // Answer: pointer to the question name, TYPE=A, CLASS=IN.
    response.extend_from_slice(&[0xC0, 0x0C]);
    response.extend_from_slice(&1u16.to_be_bytes());
    response.extend_from_slice(&1u16.to_be_bytes());
    response.extend_from_slice(&REDIRECT_TTL.to_be_bytes());
    response.extend_from_slice(&4u16.to_be_bytes());
    response.extend_from_slice(&redirect.octets());

    Ok(response)
}

/// Response flags derived from the query's flags word.
///
/// Sets QR and RA, passes RD through, and carries the RCODE. All other bits
/// (AA, TC, Z, AD, CD) are cleared.
fn response_flags(query: &[u8], rcode: u16) -> u16 {
    let original = u16::from_be_bytes([query[2], query[3]]);
    0x8000 | (original & 0x0100) | 0x0080 | rcode
}
