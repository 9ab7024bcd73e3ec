//! DNS wire-format accessors.
//!
//! Messages stay as raw byte buffers for their whole life in the proxy. Only
//! the handful of fields the resolver looks at are read, and every read goes
//! through a bounds-checked helper so a hostile datagram surfaces as
//! [`Error::Malformed`] instead of a panic.

use crate::error::{Error, Result};

/// Size of the fixed message header.
pub const HEADER_LEN: usize = 12;

/// Receive buffer size for client queries and upstream responses.
pub const MAX_UDP_MESSAGE: usize = 1024;

/// Index of the QR/Opcode/AA/TC/RD flags byte.
pub const FLAGS_HIGH: usize = 2;
/// Index of the RA/Z/RCODE flags byte.
pub const FLAGS_LOW: usize = 3;

pub const FLAG_QR: u8 = 0b1000_0000;
pub const FLAG_AA: u8 = 0b0000_0100;
pub const FLAG_RA: u8 = 0b1000_0000;
pub const RCODE_MASK: u8 = 0b0000_1111;

pub const RCODE_NOERROR: u8 = 0;
pub const RCODE_NXDOMAIN: u8 = 3;

const POINTER_TAG: u8 = 0b1100_0000;
const MAX_POINTER_HOPS: usize = 8;

/// QTYPE + QCLASS.
const QUESTION_FIXED_LEN: usize = 4;
/// TYPE + CLASS + TTL + RDLENGTH.
const RECORD_FIXED_LEN: usize = 10;

fn byte_at(buf: &[u8], offset: usize) -> Result<u8> {
    buf.get(offset)
        .copied()
        .ok_or_else(|| Error::malformed(offset, "read past end of message"))
}

fn read_u16(buf: &[u8], offset: usize) -> Result<u16> {
    Ok(u16::from_be_bytes([
        byte_at(buf, offset)?,
        byte_at(buf, offset + 1)?,
    ]))
}

/// Fail unless `buf` holds at least a full header.
pub fn check_header(buf: &[u8]) -> Result<()> {
    if buf.len() < HEADER_LEN {
        return Err(Error::malformed(buf.len(), "shorter than header"));
    }
    Ok(())
}

/// Decode the domain name starting at `start`.
///
/// Labels are joined with `.` and the terminating root label is not
/// included, so `[7]example[3]com[0]` decodes to `example.com` and a bare
/// root name decodes to nothing. Compression pointers are followed to their
/// target, which may itself end in another pointer up to a small fixed depth.
/// Label bytes are returned as they appear on the wire.
pub fn decode_name(buf: &[u8], start: usize) -> Result<Vec<u8>> {
    let mut name = Vec::new();
    let mut pos = start;
    let mut hops = 0;

    loop {
        let len = byte_at(buf, pos)?;
        if len == 0 {
            return Ok(name);
        }

        match len & POINTER_TAG {
            POINTER_TAG => {
                hops += 1;
                if hops > MAX_POINTER_HOPS {
                    return Err(Error::malformed(pos, "compression pointer loop"));
                }
                let low = byte_at(buf, pos + 1)?;
                pos = usize::from(len & !POINTER_TAG) << 8 | usize::from(low);
            }
            0 => {
                let len = usize::from(len);
                let label = buf
                    .get(pos + 1..pos + 1 + len)
                    .ok_or_else(|| Error::malformed(pos, "label runs past end of message"))?;
                if !name.is_empty() {
                    name.push(b'.');
                }
                name.extend_from_slice(label);
                pos += 1 + len;
            }
            _ => return Err(Error::malformed(pos, "reserved label type")),
        }
    }
}

/// Return the offset just past the name starting at `start`, without
/// following compression pointers.
pub fn skip_name(buf: &[u8], start: usize) -> Result<usize> {
    let mut pos = start;

    loop {
        let len = byte_at(buf, pos)?;
        match len & POINTER_TAG {
            _ if len == 0 => return Ok(pos + 1),
            POINTER_TAG => {
                byte_at(buf, pos + 1)?;
                return Ok(pos + 2);
            }
            0 => pos += 1 + usize::from(len),
            _ => return Err(Error::malformed(pos, "reserved label type")),
        }
    }
}

/// Name in the first question.
pub fn question_name(buf: &[u8]) -> Result<Vec<u8>> {
    check_header(buf)?;
    decode_name(buf, HEADER_LEN)
}

/// Offset of the RDATA of the first record after the question section.
///
/// The caller must only use this on a message with no answers and at least
/// one authority record, in which case the record found is the first
/// authority record.
pub fn first_authority_rdata_offset(buf: &[u8]) -> Result<usize> {
    check_header(buf)?;
    let record = skip_name(buf, HEADER_LEN)? + QUESTION_FIXED_LEN;
    let rdata = skip_name(buf, record)? + RECORD_FIXED_LEN;
    if rdata >= buf.len() {
        return Err(Error::malformed(rdata, "record data past end of message"));
    }
    Ok(rdata)
}

/// Name carried in the RDATA of the first authority record, typically the
/// host name of a delegated name server.
pub fn first_authority_name(buf: &[u8]) -> Result<String> {
    let offset = first_authority_rdata_offset(buf)?;
    String::from_utf8(decode_name(buf, offset)?)
        .map_err(|_| Error::malformed(offset, "name server name is not UTF-8"))
}

pub fn flags_byte(buf: &[u8], index: usize) -> Result<u8> {
    byte_at(buf, index)
}

pub fn set_flags_byte(buf: &mut [u8], index: usize, value: u8) -> Result<()> {
    let slot = buf
        .get_mut(index)
        .ok_or_else(|| Error::malformed(index, "write past end of message"))?;
    *slot = value;
    Ok(())
}

pub fn message_id(buf: &[u8]) -> Result<u16> {
    read_u16(buf, 0)
}

pub fn answer_count(buf: &[u8]) -> Result<u16> {
    read_u16(buf, 6)
}

pub fn authority_count(buf: &[u8]) -> Result<u16> {
    read_u16(buf, 8)
}

pub fn response_code(buf: &[u8]) -> Result<u8> {
    Ok(flags_byte(buf, FLAGS_LOW)? & RCODE_MASK)
}

pub fn is_no_error(buf: &[u8]) -> Result<bool> {
    Ok(response_code(buf)? == RCODE_NOERROR)
}
