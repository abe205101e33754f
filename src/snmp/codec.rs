//! BER codec for SNMPv1/v2c messages
//!
//! Only what an agent needs: the community message wrapping and the five
//! request/response PDU types. SNMPv3 messages are rejected at decode so the
//! caller can log and drop them.

use std::net::Ipv4Addr;

use super::oid::Oid;
use super::value::{syntax, Variable, VariableBinding};
use crate::{Error, Result};

pub const TYPE_SEQUENCE: u8 = 0x30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnmpVersion {
    V1,
    V2c,
}

impl SnmpVersion {
    fn code(self) -> i64 {
        match self {
            SnmpVersion::V1 => 0,
            SnmpVersion::V2c => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduType {
    GetRequest,
    GetNextRequest,
    Response,
    SetRequest,
    GetBulkRequest,
}

impl PduType {
    pub fn tag(self) -> u8 {
        match self {
            PduType::GetRequest => 0xA0,
            PduType::GetNextRequest => 0xA1,
            PduType::Response => 0xA2,
            PduType::SetRequest => 0xA3,
            PduType::GetBulkRequest => 0xA5,
        }
    }

    fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0xA0 => Ok(PduType::GetRequest),
            0xA1 => Ok(PduType::GetNextRequest),
            0xA2 => Ok(PduType::Response),
            0xA3 => Ok(PduType::SetRequest),
            0xA5 => Ok(PduType::GetBulkRequest),
            other => Err(Error::codec(format!("Unsupported PDU tag 0x{:02X}", other))),
        }
    }
}

/// A v1/v2c PDU. For GETBULK the error fields carry non-repeaters and
/// max-repetitions, as on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    pub pdu_type: PduType,
    pub request_id: i32,
    pub error_status: i32,
    pub error_index: i32,
    pub bindings: Vec<VariableBinding>,
}

impl Pdu {
    pub fn non_repeaters(&self) -> usize {
        self.error_status.max(0) as usize
    }

    pub fn max_repetitions(&self) -> usize {
        self.error_index.max(0) as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnmpMessage {
    pub version: SnmpVersion,
    pub community: Vec<u8>,
    pub pdu: Pdu,
}

// ---- decoding ----

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.data.len() {
            return Err(Error::codec("Truncated message"));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_tlv(&mut self) -> Result<(u8, &'a [u8])> {
        let tag = self.take(1)?[0];
        let first = self.take(1)?[0];
        let length = if first < 0x80 {
            first as usize
        } else {
            let count = (first & 0x7F) as usize;
            if count == 0 || count > std::mem::size_of::<usize>() {
                return Err(Error::codec("Unsupported BER length form"));
            }
            let mut length = 0usize;
            for byte in self.take(count)? {
                length = (length << 8) | *byte as usize;
            }
            length
        };
        Ok((tag, self.take(length)?))
    }

    fn expect(&mut self, expected: u8) -> Result<Reader<'a>> {
        let (tag, content) = self.read_tlv()?;
        if tag != expected {
            return Err(Error::codec(format!(
                "Expected tag 0x{:02X}, found 0x{:02X}",
                expected, tag
            )));
        }
        Ok(Reader::new(content))
    }
}

fn decode_signed(content: &[u8]) -> Result<i64> {
    if content.is_empty() || content.len() > 8 {
        return Err(Error::codec("Bad INTEGER length"));
    }
    let mut value = if content[0] & 0x80 != 0 { -1i64 } else { 0 };
    for byte in content {
        value = (value << 8) | *byte as i64;
    }
    Ok(value)
}

fn decode_unsigned(content: &[u8]) -> Result<u64> {
    let trimmed = match content {
        [0x00, rest @ ..] => rest,
        other => other,
    };
    if trimmed.len() > 8 {
        return Err(Error::codec("Bad unsigned length"));
    }
    let mut value = 0u64;
    for byte in trimmed {
        value = (value << 8) | *byte as u64;
    }
    Ok(value)
}

fn decode_oid(content: &[u8]) -> Result<Oid> {
    if content.is_empty() {
        return Ok(Oid::empty());
    }
    let mut subids = Vec::with_capacity(content.len() + 1);
    let first = content[0] as u32;
    subids.push((first / 40).min(2));
    subids.push(if first / 40 >= 2 { first - 80 } else { first % 40 });
    let mut acc: u32 = 0;
    for byte in &content[1..] {
        acc = acc
            .checked_mul(128)
            .and_then(|v| v.checked_add((*byte & 0x7F) as u32))
            .ok_or_else(|| Error::codec("OID subid overflow"))?;
        if byte & 0x80 == 0 {
            subids.push(acc);
            acc = 0;
        }
    }
    Ok(Oid::new(subids))
}

fn decode_variable(tag: u8, content: &[u8]) -> Result<Variable> {
    Ok(match tag {
        syntax::INTEGER32 => Variable::Integer32(decode_signed(content)? as i32),
        syntax::OCTET_STRING => Variable::OctetString(content.to_vec()),
        syntax::NULL => Variable::Null,
        syntax::OBJECT_IDENTIFIER => Variable::Oid(decode_oid(content)?),
        syntax::IP_ADDRESS => {
            let octets: [u8; 4] = content
                .try_into()
                .map_err(|_| Error::codec("Bad IpAddress length"))?;
            Variable::IpAddress(Ipv4Addr::from(octets))
        }
        syntax::COUNTER32 => Variable::Counter32(decode_unsigned(content)? as u32),
        syntax::GAUGE32 => Variable::UInt32(decode_unsigned(content)? as u32),
        syntax::TIME_TICKS => Variable::TimeTicks(decode_unsigned(content)? as u32),
        syntax::OPAQUE => Variable::Opaque(content.to_vec()),
        syntax::COUNTER64 => Variable::Counter64(decode_unsigned(content)?),
        syntax::NO_SUCH_OBJECT => Variable::NoSuchObject,
        syntax::NO_SUCH_INSTANCE => Variable::NoSuchInstance,
        syntax::END_OF_MIB_VIEW => Variable::EndOfMibView,
        other => {
            return Err(Error::codec(format!(
                "Unsupported value tag 0x{:02X}",
                other
            )))
        }
    })
}

/// Decode one datagram. SNMPv3 is rejected with a distinct error message so
/// the serve loop can log it once and move on.
pub fn decode_message(datagram: &[u8]) -> Result<SnmpMessage> {
    let mut outer = Reader::new(datagram);
    let mut message = outer.expect(TYPE_SEQUENCE)?;

    let (tag, content) = message.read_tlv()?;
    if tag != syntax::INTEGER32 {
        return Err(Error::codec("Missing version field"));
    }
    let version = match decode_signed(content)? {
        0 => SnmpVersion::V1,
        1 => SnmpVersion::V2c,
        3 => return Err(Error::codec("SNMPv3 messages are not supported")),
        other => return Err(Error::codec(format!("Unknown SNMP version {}", other))),
    };

    let (tag, community) = message.read_tlv()?;
    if tag != syntax::OCTET_STRING {
        return Err(Error::codec("Missing community field"));
    }

    let (pdu_tag, pdu_content) = message.read_tlv()?;
    let pdu_type = PduType::from_tag(pdu_tag)?;
    let mut pdu = Reader::new(pdu_content);

    let (tag, content) = pdu.read_tlv()?;
    if tag != syntax::INTEGER32 {
        return Err(Error::codec("Missing request-id"));
    }
    let request_id = decode_signed(content)? as i32;
    let (tag, content) = pdu.read_tlv()?;
    if tag != syntax::INTEGER32 {
        return Err(Error::codec("Missing error-status"));
    }
    let error_status = decode_signed(content)? as i32;
    let (tag, content) = pdu.read_tlv()?;
    if tag != syntax::INTEGER32 {
        return Err(Error::codec("Missing error-index"));
    }
    let error_index = decode_signed(content)? as i32;

    let mut list = pdu.expect(TYPE_SEQUENCE)?;
    let mut bindings = Vec::new();
    while !list.is_empty() {
        let mut binding = list.expect(TYPE_SEQUENCE)?;
        let (tag, content) = binding.read_tlv()?;
        if tag != syntax::OBJECT_IDENTIFIER {
            return Err(Error::codec("Variable binding without OID"));
        }
        let oid = decode_oid(content)?;
        let (tag, content) = binding.read_tlv()?;
        bindings.push(VariableBinding::new(oid, decode_variable(tag, content)?));
    }

    Ok(SnmpMessage {
        version,
        community: community.to_vec(),
        pdu: Pdu {
            pdu_type,
            request_id,
            error_status,
            error_index,
            bindings,
        },
    })
}

// ---- encoding ----

fn write_tlv(out: &mut Vec<u8>, tag: u8, content: &[u8]) {
    out.push(tag);
    let len = content.len();
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = len.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        out.push(0x80 | (bytes.len() - skip) as u8);
        out.extend_from_slice(&bytes[skip..]);
    }
    out.extend_from_slice(content);
}

fn encode_signed(value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < 7 {
        let cut = bytes[start];
        let next_msb = bytes[start + 1] & 0x80;
        if (cut == 0x00 && next_msb == 0) || (cut == 0xFF && next_msb != 0) {
            start += 1;
        } else {
            break;
        }
    }
    bytes[start..].to_vec()
}

fn encode_unsigned(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count().min(7);
    let mut content = bytes[skip..].to_vec();
    if content[0] & 0x80 != 0 {
        content.insert(0, 0x00);
    }
    content
}

fn encode_oid(oid: &Oid) -> Vec<u8> {
    let subids = oid.subids();
    let mut content = Vec::with_capacity(subids.len() + 1);
    let first = subids.first().copied().unwrap_or(0);
    let second = subids.get(1).copied().unwrap_or(0);
    content.push((first * 40 + second) as u8);
    for subid in subids.iter().skip(2) {
        let mut chunk = [0u8; 5];
        let mut index = 4;
        let mut value = *subid;
        chunk[index] = (value & 0x7F) as u8;
        value >>= 7;
        while value > 0 {
            index -= 1;
            chunk[index] = 0x80 | (value & 0x7F) as u8;
            value >>= 7;
        }
        content.extend_from_slice(&chunk[index..]);
    }
    content
}

fn encode_variable(out: &mut Vec<u8>, variable: &Variable) {
    match variable {
        Variable::Integer32(v) => write_tlv(out, syntax::INTEGER32, &encode_signed(*v as i64)),
        Variable::UInt32(v) => write_tlv(out, syntax::GAUGE32, &encode_unsigned(*v as u64)),
        Variable::Counter32(v) => write_tlv(out, syntax::COUNTER32, &encode_unsigned(*v as u64)),
        Variable::Counter64(v) => write_tlv(out, syntax::COUNTER64, &encode_unsigned(*v)),
        Variable::TimeTicks(v) => write_tlv(out, syntax::TIME_TICKS, &encode_unsigned(*v as u64)),
        Variable::OctetString(bytes) => write_tlv(out, syntax::OCTET_STRING, bytes),
        // BITS travel as an OCTET STRING per SMIv2.
        Variable::BitString(bytes) => write_tlv(out, syntax::OCTET_STRING, bytes),
        Variable::Oid(oid) => write_tlv(out, syntax::OBJECT_IDENTIFIER, &encode_oid(oid)),
        Variable::IpAddress(addr) => write_tlv(out, syntax::IP_ADDRESS, &addr.octets()),
        Variable::Opaque(bytes) => write_tlv(out, syntax::OPAQUE, bytes),
        Variable::Null => write_tlv(out, syntax::NULL, &[]),
        Variable::NoSuchObject => write_tlv(out, syntax::NO_SUCH_OBJECT, &[]),
        Variable::NoSuchInstance => write_tlv(out, syntax::NO_SUCH_INSTANCE, &[]),
        Variable::EndOfMibView => write_tlv(out, syntax::END_OF_MIB_VIEW, &[]),
    }
}

pub fn encode_message(message: &SnmpMessage) -> Vec<u8> {
    let mut list = Vec::new();
    for binding in &message.pdu.bindings {
        let mut entry = Vec::new();
        write_tlv(&mut entry, syntax::OBJECT_IDENTIFIER, &encode_oid(&binding.oid));
        encode_variable(&mut entry, &binding.variable);
        write_tlv(&mut list, TYPE_SEQUENCE, &entry);
    }

    let mut pdu = Vec::new();
    write_tlv(
        &mut pdu,
        syntax::INTEGER32,
        &encode_signed(message.pdu.request_id as i64),
    );
    write_tlv(
        &mut pdu,
        syntax::INTEGER32,
        &encode_signed(message.pdu.error_status as i64),
    );
    write_tlv(
        &mut pdu,
        syntax::INTEGER32,
        &encode_signed(message.pdu.error_index as i64),
    );
    write_tlv(&mut pdu, TYPE_SEQUENCE, &list);

    let mut body = Vec::new();
    write_tlv(
        &mut body,
        syntax::INTEGER32,
        &encode_signed(message.version.code()),
    );
    write_tlv(&mut body, syntax::OCTET_STRING, &message.community);
    write_tlv(&mut body, message.pdu.pdu_type.tag(), &pdu);

    let mut datagram = Vec::new();
    write_tlv(&mut datagram, TYPE_SEQUENCE, &body);
    datagram
}
