//! Parser for captured SNMP walk dumps
//!
//! A walk is line-oriented text, one `<oid> = <TYPE>: <value>` record per
//! line, except for hex strings which may continue over indented lines until
//! the next OID line. Operators' dumps are irregular, so parsing is
//! permissive: a record that cannot be understood is logged and skipped and
//! never fails the whole file.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::Path;

use tracing::warn;

use crate::snmp::oid::Oid;
use crate::snmp::value::Variable;
use crate::{Error, Result};

/// Ordered OID → value map produced from one walk file.
pub type WalkBindings = BTreeMap<Oid, Variable>;

/// Parse a walk file. A missing or unreadable file is fatal for the agent
/// that needs it; malformed records inside are not.
pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<WalkBindings> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::walk(format!("Cannot read walk file {}: {}", path.display(), e)))?;
    Ok(parse_str(&text))
}

/// Parse walk text. Duplicate OIDs keep the last occurrence.
pub fn parse_str(text: &str) -> WalkBindings {
    let mut bindings = WalkBindings::new();
    // Pending multi-line hex string, committed when the next record starts.
    let mut pending_hex: Option<(Oid, Vec<u8>)> = None;

    for (lineno, line) in text.lines().enumerate() {
        let lineno = lineno + 1;
        if let Some((oid, rest)) = split_record(line) {
            if let Some((oid, bytes)) = pending_hex.take() {
                bindings.insert(oid, Variable::OctetString(bytes));
            }
            match parse_value(rest) {
                Ok(Parsed::Value(variable)) => {
                    bindings.insert(oid, variable);
                }
                Ok(Parsed::HexOpen(bytes)) => {
                    pending_hex = Some((oid, bytes));
                }
                Err(reason) => {
                    warn!(line = lineno, oid = %oid, "Skipping walk record: {}", reason);
                }
            }
        } else if let Some((_, bytes)) = pending_hex.as_mut() {
            // Continuation of a hex dump: whitespace-separated hex octets.
            for token in line.split_whitespace() {
                match hex::decode(token) {
                    Ok(decoded) => bytes.extend(decoded),
                    Err(_) => {
                        warn!(line = lineno, "Ignoring non-hex token {:?} in hex dump", token);
                    }
                }
            }
        } else if !line.trim().is_empty() {
            warn!(line = lineno, "Skipping unrecognized walk line: {:?}", line);
        }
    }

    if let Some((oid, bytes)) = pending_hex.take() {
        bindings.insert(oid, Variable::OctetString(bytes));
    }
    bindings
}

/// Render bindings in the canonical walk form; `parse_str` reads it back.
pub fn render(bindings: &WalkBindings) -> String {
    let mut out = String::new();
    for (oid, variable) in bindings {
        out.push_str(&format!("{} = {}\n", oid, variable));
    }
    out
}

enum Parsed {
    Value(Variable),
    /// A `Hex-STRING` record that may continue on following lines.
    HexOpen(Vec<u8>),
}

fn split_record(line: &str) -> Option<(Oid, &str)> {
    let (oid_part, rest) = line.split_once(" = ")?;
    let oid: Oid = oid_part.trim().parse().ok()?;
    Some((oid, rest))
}

fn parse_value(rest: &str) -> std::result::Result<Parsed, String> {
    let rest = rest.trim_end();
    // net-snmp renders a zero-length string as a bare pair of quotes.
    if rest == "\"\"" {
        return Ok(Parsed::Value(Variable::OctetString(Vec::new())));
    }
    let (token, value) = match rest.split_once(':') {
        Some((token, value)) => (token.trim(), value.trim()),
        None => return Err(format!("no type token in {:?}", rest)),
    };

    match token {
        "INTEGER" => parse_integer(value)
            .map(Variable::Integer32)
            .map(Parsed::Value)
            .ok_or_else(|| format!("bad INTEGER value {:?}", value)),
        "Gauge32" => value
            .parse::<u32>()
            .map(Variable::UInt32)
            .map(Parsed::Value)
            .map_err(|_| format!("bad Gauge32 value {:?}", value)),
        "Counter32" => value
            .parse::<u32>()
            .map(Variable::Counter32)
            .map(Parsed::Value)
            .map_err(|_| format!("bad Counter32 value {:?}", value)),
        "Counter64" => value
            .parse::<u64>()
            .map(Variable::Counter64)
            .map(Parsed::Value)
            .map_err(|_| format!("bad Counter64 value {:?}", value)),
        "Timeticks" => parse_timeticks(value)
            .map(Variable::TimeTicks)
            .map(Parsed::Value)
            .ok_or_else(|| format!("bad Timeticks value {:?}", value)),
        "STRING" => Ok(Parsed::Value(Variable::OctetString(unquote(value)))),
        "OID" => value
            .parse::<Oid>()
            .map(Variable::Oid)
            .map(Parsed::Value)
            .map_err(|_| format!("bad OID value {:?}", value)),
        "IpAddress" => value
            .parse::<Ipv4Addr>()
            .map(Variable::IpAddress)
            .map(Parsed::Value)
            .map_err(|_| format!("bad IpAddress value {:?}", value)),
        "Hex-STRING" => Ok(Parsed::HexOpen(parse_hex_octets(value))),
        "BITS" => Ok(Parsed::Value(Variable::BitString(parse_hex_octets(value)))),
        "Network Address" => parse_network_address(value)
            .map(Parsed::Value)
            .ok_or_else(|| format!("bad Network Address value {:?}", value)),
        other => Err(format!("unknown type token {:?}", other)),
    }
}

fn parse_integer(value: &str) -> Option<i32> {
    if let Ok(v) = value.parse::<i32>() {
        return Some(v);
    }
    // Enumerated rendering, e.g. `up(1)`.
    let open = value.find('(')?;
    let close = value[open..].find(')')? + open;
    value[open + 1..close].parse().ok()
}

fn parse_timeticks(value: &str) -> Option<u32> {
    // `(2542831) 7:03:48.31` or a bare tick count.
    if let Some(open) = value.find('(') {
        let close = value[open..].find(')')? + open;
        return value[open + 1..close].parse().ok();
    }
    value.parse().ok()
}

fn unquote(value: &str) -> Vec<u8> {
    let trimmed = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);
    trimmed.as_bytes().to_vec()
}

fn parse_hex_octets(value: &str) -> Vec<u8> {
    // Trailing decoded names after the octets (as BITS lines carry) are
    // ignored; anything that is not hex ends the octet run.
    let mut bytes = Vec::new();
    for token in value.split_whitespace() {
        match hex::decode(token) {
            Ok(decoded) => bytes.extend(decoded),
            Err(_) => break,
        }
    }
    bytes
}

fn parse_network_address(value: &str) -> Option<Variable> {
    let octets: Vec<u8> = value
        .split(':')
        .map(|part| u8::from_str_radix(part.trim(), 16))
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    match octets.as_slice() {
        [a, b, c, d] => Some(Variable::IpAddress(Ipv4Addr::new(*a, *b, *c, *d))),
        _ => Some(Variable::OctetString(octets)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(s: &str) -> Oid {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_scalar_types() {
        let walk = parse_str(
            "\
.1.3.6.1.2.1.1.1.0 = STRING: \"Linux router 4.19\"
.1.3.6.1.2.1.1.2.0 = OID: .1.3.6.1.4.1.9.1.1
.1.3.6.1.2.1.1.3.0 = Timeticks: (2542831) 7:03:48.31
.1.3.6.1.2.1.2.2.1.10.1 = Counter32: 923457
.1.3.6.1.2.1.31.1.1.1.6.1 = Counter64: 9234572345
.1.3.6.1.2.1.2.1.0 = INTEGER: 3
.1.3.6.1.2.1.2.2.1.5.1 = Gauge32: 1000000000
.1.3.6.1.2.1.4.20.1.1.10.0.0.1 = IpAddress: 10.0.0.1
",
        );
        assert_eq!(walk.len(), 8);
        assert_eq!(
            walk[&oid("1.3.6.1.2.1.1.1.0")],
            Variable::octet_string("Linux router 4.19")
        );
        assert_eq!(
            walk[&oid("1.3.6.1.2.1.1.3.0")],
            Variable::TimeTicks(2542831)
        );
        assert_eq!(
            walk[&oid("1.3.6.1.2.1.31.1.1.1.6.1")],
            Variable::Counter64(9234572345)
        );
        assert_eq!(
            walk[&oid("1.3.6.1.2.1.4.20.1.1.10.0.0.1")],
            Variable::IpAddress("10.0.0.1".parse().unwrap())
        );
    }

    #[test]
    fn test_parse_enumerated_integer() {
        let walk = parse_str(".1.3.6.1.2.1.2.2.1.8.1 = INTEGER: up(1)\n");
        assert_eq!(walk[&oid("1.3.6.1.2.1.2.2.1.8.1")], Variable::Integer32(1));
    }

    #[test]
    fn test_parse_empty_string_forms() {
        let walk = parse_str(
            ".1.3.6.1.2.1.1.4.0 = \"\"\n.1.3.6.1.2.1.1.6.0 = STRING: \n",
        );
        assert_eq!(
            walk[&oid("1.3.6.1.2.1.1.4.0")],
            Variable::OctetString(vec![])
        );
        assert_eq!(
            walk[&oid("1.3.6.1.2.1.1.6.0")],
            Variable::OctetString(vec![])
        );
    }

    #[test]
    fn test_parse_multiline_hex_string() {
        let walk = parse_str(
            "\
.1.3.6.1.2.1.1.1.0 = Hex-STRING: 43 69 73 63 6F
20 49 4F 53
.1.3.6.1.2.1.2.1.0 = INTEGER: 2
",
        );
        assert_eq!(
            walk[&oid("1.3.6.1.2.1.1.1.0")],
            Variable::OctetString(b"Cisco IOS".to_vec())
        );
        assert_eq!(walk[&oid("1.3.6.1.2.1.2.1.0")], Variable::Integer32(2));
    }

    #[test]
    fn test_parse_bits_and_network_address() {
        let walk = parse_str(
            "\
.1.3.6.1.2.1.17.1.4.1.4.1 = BITS: 80 40 port1(0) port9(9)
.1.3.6.1.2.1.4.22.1.3.1 = Network Address: C0:A8:00:01
",
        );
        assert_eq!(
            walk[&oid("1.3.6.1.2.1.17.1.4.1.4.1")],
            Variable::BitString(vec![0x80, 0x40])
        );
        assert_eq!(
            walk[&oid("1.3.6.1.2.1.4.22.1.3.1")],
            Variable::IpAddress("192.168.0.1".parse().unwrap())
        );
    }

    #[test]
    fn test_duplicate_keeps_last() {
        let walk = parse_str(
            ".1.3.6.1.2.1.2.1.0 = INTEGER: 1\n.1.3.6.1.2.1.2.1.0 = INTEGER: 7\n",
        );
        assert_eq!(walk[&oid("1.3.6.1.2.1.2.1.0")], Variable::Integer32(7));
    }

    #[test]
    fn test_unknown_type_is_skipped() {
        let walk = parse_str(
            ".1.3.6.1.2.1.2.1.0 = Wrong64: 3\n.1.3.6.1.2.1.2.2.0 = INTEGER: 3\n",
        );
        assert_eq!(walk.len(), 1);
        assert!(walk.contains_key(&oid("1.3.6.1.2.1.2.2.0")));
    }

    #[test]
    fn test_bad_value_is_skipped() {
        let walk = parse_str(".1.3.6.1.2.1.2.1.0 = Counter32: many\n");
        assert!(walk.is_empty());
    }

    #[test]
    fn test_missing_file_is_fatal() {
        assert!(parse_file("/nonexistent/router.walk").is_err());
    }

    #[test]
    fn test_render_round_trip() {
        let mut bindings = WalkBindings::new();
        bindings.insert(oid("1.3.6.1.2.1.1.1.0"), Variable::octet_string("x"));
        bindings.insert(oid("1.3.6.1.2.1.1.3.0"), Variable::TimeTicks(55));
        bindings.insert(
            oid("1.3.6.1.2.1.1.2.0"),
            Variable::Oid(oid("1.3.6.1.4.1.9")),
        );
        bindings.insert(oid("1.3.6.1.2.1.2.1.0"), Variable::Integer32(-4));
        bindings.insert(
            oid("1.3.6.1.2.1.4.20.1.1.10.0.0.1"),
            Variable::IpAddress("10.0.0.1".parse().unwrap()),
        );
        bindings.insert(
            oid("1.3.6.1.2.1.99.1.0"),
            Variable::OctetString(vec![0x00, 0x01, 0xfe]),
        );
        assert_eq!(parse_str(&render(&bindings)), bindings);
    }
}
