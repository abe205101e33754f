//! Tagged SNMP values and variable bindings

use std::fmt;
use std::net::Ipv4Addr;

use super::oid::Oid;

/// BER syntax tags. These double as the syntax identity of a [`Variable`]:
/// two values are the same kind iff their tags match.
pub mod syntax {
    pub const INTEGER32: u8 = 0x02;
    pub const BIT_STRING: u8 = 0x03;
    pub const OCTET_STRING: u8 = 0x04;
    pub const NULL: u8 = 0x05;
    pub const OBJECT_IDENTIFIER: u8 = 0x06;
    pub const IP_ADDRESS: u8 = 0x40;
    pub const COUNTER32: u8 = 0x41;
    pub const GAUGE32: u8 = 0x42;
    pub const TIME_TICKS: u8 = 0x43;
    pub const OPAQUE: u8 = 0x44;
    pub const COUNTER64: u8 = 0x46;
    pub const NO_SUCH_OBJECT: u8 = 0x80;
    pub const NO_SUCH_INSTANCE: u8 = 0x81;
    pub const END_OF_MIB_VIEW: u8 = 0x82;
}

/// An SNMP value. Equality is tag + payload; `Clone` is a deep copy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Variable {
    Integer32(i32),
    /// Unsigned32 on the wire; walks render it as Gauge32.
    UInt32(u32),
    Counter32(u32),
    Counter64(u64),
    TimeTicks(u32),
    OctetString(Vec<u8>),
    Oid(Oid),
    IpAddress(Ipv4Addr),
    Opaque(Vec<u8>),
    BitString(Vec<u8>),
    Null,
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
}

impl Variable {
    pub fn syntax(&self) -> u8 {
        match self {
            Variable::Integer32(_) => syntax::INTEGER32,
            Variable::UInt32(_) => syntax::GAUGE32,
            Variable::Counter32(_) => syntax::COUNTER32,
            Variable::Counter64(_) => syntax::COUNTER64,
            Variable::TimeTicks(_) => syntax::TIME_TICKS,
            Variable::OctetString(_) => syntax::OCTET_STRING,
            Variable::Oid(_) => syntax::OBJECT_IDENTIFIER,
            Variable::IpAddress(_) => syntax::IP_ADDRESS,
            Variable::Opaque(_) => syntax::OPAQUE,
            Variable::BitString(_) => syntax::BIT_STRING,
            Variable::Null => syntax::NULL,
            Variable::NoSuchObject => syntax::NO_SUCH_OBJECT,
            Variable::NoSuchInstance => syntax::NO_SUCH_INSTANCE,
            Variable::EndOfMibView => syntax::END_OF_MIB_VIEW,
        }
    }

    /// The three v2c varbind exceptions carried in the Null family.
    pub fn is_exception(&self) -> bool {
        matches!(
            self,
            Variable::NoSuchObject | Variable::NoSuchInstance | Variable::EndOfMibView
        )
    }

    pub fn octet_string(s: &str) -> Self {
        Variable::OctetString(s.as_bytes().to_vec())
    }
}

fn is_displayable(bytes: &[u8]) -> bool {
    !bytes.is_empty()
        && bytes
            .iter()
            .all(|b| b.is_ascii_graphic() || *b == b' ')
        && !bytes.contains(&b'"')
}

fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

impl fmt::Display for Variable {
    /// Canonical walk-file rendering; [`crate::store::walk`] parses it back.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variable::Integer32(v) => write!(f, "INTEGER: {}", v),
            Variable::UInt32(v) => write!(f, "Gauge32: {}", v),
            Variable::Counter32(v) => write!(f, "Counter32: {}", v),
            Variable::Counter64(v) => write!(f, "Counter64: {}", v),
            Variable::TimeTicks(v) => write!(f, "Timeticks: ({})", v),
            Variable::OctetString(bytes) => {
                if bytes.is_empty() {
                    write!(f, "\"\"")
                } else if is_displayable(bytes) {
                    write!(f, "STRING: \"{}\"", String::from_utf8_lossy(bytes))
                } else {
                    write!(f, "Hex-STRING: {}", hex_dump(bytes))
                }
            }
            Variable::Oid(oid) => write!(f, "OID: .{}", oid),
            Variable::IpAddress(addr) => write!(f, "IpAddress: {}", addr),
            Variable::Opaque(bytes) => write!(f, "Opaque: {}", hex_dump(bytes)),
            Variable::BitString(bytes) => write!(f, "BITS: {}", hex_dump(bytes)),
            Variable::Null => write!(f, "NULL"),
            Variable::NoSuchObject => write!(f, "noSuchObject"),
            Variable::NoSuchInstance => write!(f, "noSuchInstance"),
            Variable::EndOfMibView => write!(f, "endOfMibView"),
        }
    }
}

/// A (OID, value) pair. Ordered collections of these form a walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableBinding {
    pub oid: Oid,
    pub variable: Variable,
}

impl VariableBinding {
    pub fn new(oid: Oid, variable: Variable) -> Self {
        Self { oid, variable }
    }
}

impl fmt::Display for VariableBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.oid, self.variable)
    }
}
