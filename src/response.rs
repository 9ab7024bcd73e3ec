//! Reply construction.
//!
//! A reply is always a minimal edit of a message we already hold: the
//! client's own query for NXDOMAIN, or the final upstream response for an
//! answer. Only the flag bits below are touched, so the ID, the question
//! section and any records pass through as received.

use std::net::SocketAddr;

use crate::dns::{self, FLAG_AA, FLAG_QR, FLAG_RA, FLAGS_HIGH, FLAGS_LOW, RCODE_MASK, RCODE_NXDOMAIN};
use crate::error::Result;

/// A datagram ready to send back to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPacket {
    pub data: Vec<u8>,
    pub dest: SocketAddr,
}

/// Turn `data` into a reply addressed to `client`.
///
/// QR and RA are set, AA is cleared, and with `as_nxdomain` the RCODE is
/// replaced by NXDOMAIN. Every other bit is preserved.
pub fn build_reply(mut data: Vec<u8>, as_nxdomain: bool, client: SocketAddr) -> Result<OutboundPacket> {
    let high = dns::flags_byte(&data, FLAGS_HIGH)?;
    dns::set_flags_byte(&mut data, FLAGS_HIGH, (high & !FLAG_AA) | FLAG_QR)?;

    let mut low = dns::flags_byte(&data, FLAGS_LOW)? | FLAG_RA;
    if as_nxdomain {
        low = (low & !RCODE_MASK) | RCODE_NXDOMAIN;
    }
    dns::set_flags_byte(&mut data, FLAGS_LOW, low)?;

    Ok(OutboundPacket { data, dest: client })
}
