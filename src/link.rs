// The instrument link: anything that can push a command to an instrument and pull a response back.
// Text and binary-block handling live here as provided methods so every transport shares them.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use serde::{Serialize, Deserialize};

use crate::error::{Error, Result};

pub const DEFAULT_DEVICE:&str = "inst0";

lazy_static! {
	static ref VISA_TCPIP_RE: Regex = Regex::new("(?i)^TCPIP\\d*::([^:]+)(?:::([^:]+))?::INSTR$").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementType { I8, I16 }

impl ElementType {
	pub fn width(&self) -> usize { match self {
		ElementType::I8  => 1,
		ElementType::I16 => 2,
	}}

	pub fn from_width(bytes:u8) -> Option<Self> { match bytes {
		1 => Some(ElementType::I8),
		2 => Some(ElementType::I16),
		_ => None,
	}}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Endianness { Big, Little }

pub trait Link {
	fn write_bytes(&mut self, data:&[u8]) -> Result<()>;

	// One complete response message, including any termination the instrument appended
	fn read_bytes(&mut self) -> Result<Vec<u8>>;

	fn timeout(&self) -> Duration;
	fn set_timeout(&mut self, timeout:Duration) -> Result<()>;

	fn close(&mut self) -> Result<()>;

	fn write_termination(&self) -> &str { "\n" }

	fn send(&mut self, command:&str) -> Result<()> {
		let mut msg:Vec<u8> = Vec::with_capacity(command.len() + 1);
		msg.extend_from_slice(command.as_bytes());
		msg.extend_from_slice(self.write_termination().as_bytes());

		let timeout = self.timeout();
		self.write_bytes(&msg).map_err(|e| timed_out(e, command, timeout))
	}

	fn query(&mut self, command:&str) -> Result<String> {
		self.send(command)?;

		let timeout = self.timeout();
		let bytes = self.read_bytes().map_err(|e| timed_out(e, command, timeout))?;
		let text = String::from_utf8(bytes).map_err(|_| Error::protocol(command, "response is not valid UTF-8"))?;
		let text = text.trim_end_matches(|c| c == '\n' || c == '\r');
		debug!("{} -> {:?}", command, text);
		Ok(text.to_owned())
	}

	fn query_binary(&mut self, command:&str, element:ElementType, order:Endianness) -> Result<Vec<i16>> {
		self.send(command)?;

		let timeout = self.timeout();
		let bytes = self.read_bytes().map_err(|e| timed_out(e, command, timeout))?;
		let payload = parse_block(&bytes).map_err(|reason| Error::protocol(command, reason))?;
		debug!("{} -> {} byte block", command, payload.len());
		decode_samples(payload, element, order).map_err(|reason| Error::protocol(command, reason))
	}
}

fn timed_out(e:Error, command:&str, timeout:Duration) -> Error {
	if e.is_timeout() { Error::Timeout { command: command.to_owned(), timeout } }
	else { e }
}

// IEEE 488.2 arbitrary block: `#<n><n digits of length><data>` or `#0<data>` terminated by a newline.
// Any header text the instrument echoes in front of the block is skipped.
pub fn parse_block(bytes:&[u8]) -> std::result::Result<&[u8], String> {
	let start = bytes.iter().position(|b| *b == b'#').ok_or("no binary block header")?;
	let rest = &bytes[start+1..];

	let n_digits = match rest.first() {
		Some(d) if d.is_ascii_digit() => (d - b'0') as usize,
		_ => return Err("missing length-of-length digit".to_owned()),
	};
	let rest = &rest[1..];

	if n_digits == 0 {
		return Ok(rest.strip_suffix(b"\n").unwrap_or(rest));
	}

	if rest.len() < n_digits { return Err("block header truncated".to_owned()); }
	let (len_digits, data) = rest.split_at(n_digits);
	let len:usize = std::str::from_utf8(len_digits).ok()
		.and_then(|s| s.parse::<usize>().ok())
		.ok_or_else(|| format!("bad block length {:?}", String::from_utf8_lossy(len_digits)))?;

	if data.len() < len {
		return Err(format!("block declares {} bytes but only {} arrived", len, data.len()));
	}

	let (payload, trailer) = data.split_at(len);
	if trailer.iter().any(|b| *b != b'\n' && *b != b'\r') {
		return Err(format!("{} unexpected bytes after the block", trailer.len()));
	}

	Ok(payload)
}

pub fn decode_samples(payload:&[u8], element:ElementType, order:Endianness) -> std::result::Result<Vec<i16>, String> {
	match element {
		ElementType::I8 => Ok(payload.iter().map(|b| *b as i8 as i16).collect()),
		ElementType::I16 => {
			if payload.len() % 2 != 0 {
				return Err(format!("odd byte count {} for 16-bit samples", payload.len()));
			}
			Ok(payload.chunks_exact(2).map(|c| match order {
				Endianness::Big    => BigEndian::read_i16(c),
				Endianness::Little => LittleEndian::read_i16(c),
			}).collect())
		},
	}
}

// Where to find an instrument: `TCPIP::192.168.0.106::INSTR`, `TCPIP0::scope::inst1::INSTR` or just a host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceAddress {
	pub host: String,
	pub device: String,
}

impl ResourceAddress {
	pub fn new(host:&str) -> Self { Self{ host: host.to_owned(), device: DEFAULT_DEVICE.to_owned() } }
}

impl FromStr for ResourceAddress {
	type Err = Error;

	fn from_str(s:&str) -> Result<Self> {
		let s = s.trim();
		if let Some(caps) = VISA_TCPIP_RE.captures(s) {
			let host = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
			let device = caps.get(2).map(|m| m.as_str()).unwrap_or(DEFAULT_DEVICE);
			return Ok(Self{ host: host.to_owned(), device: device.to_owned() });
		}

		if s.is_empty() || s.contains("::") {
			return Err(Error::Connection { address: s.to_owned(), reason: "not a TCPIP resource string or host name".to_owned() });
		}

		Ok(Self::new(s))
	}
}

impl fmt::Display for ResourceAddress {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "TCPIP::{}::{}::INSTR", self.host, self.device)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn definite_length_block() {
		let bytes = b"#14\x01\xff\x7f\x80\n";
		assert_eq!(parse_block(bytes).unwrap(), &[0x01, 0xff, 0x7f, 0x80]);

		let samples = decode_samples(parse_block(bytes).unwrap(), ElementType::I8, Endianness::Big).unwrap();
		assert_eq!(samples, vec![1, -1, 127, -128]);
	}

	#[test]
	fn header_before_block_is_skipped() {
		assert_eq!(parse_block(b":CURVE #13abc").unwrap(), b"abc");
	}

	#[test]
	fn indefinite_length_block() {
		assert_eq!(parse_block(b"#0abc\n").unwrap(), b"abc");
	}

	#[test]
	fn truncated_block_is_rejected() {
		assert!(parse_block(b"#2105").is_err());
		assert!(parse_block(b"#").is_err());
		assert!(parse_block(b"1234").is_err());
	}

	#[test]
	fn junk_after_block_is_rejected() {
		assert!(parse_block(b"#12abXY").is_err());
	}

	#[test]
	fn sixteen_bit_samples() {
		let payload = [0x01, 0x00, 0xff, 0xfe];
		assert_eq!(decode_samples(&payload, ElementType::I16, Endianness::Big).unwrap(), vec![256, -2]);
		assert_eq!(decode_samples(&payload, ElementType::I16, Endianness::Little).unwrap(), vec![1, -257]);
		assert!(decode_samples(&payload[..3], ElementType::I16, Endianness::Big).is_err());
	}

	#[test]
	fn resource_addresses() {
		let a:ResourceAddress = "TCPIP::192.168.0.106::INSTR".parse().unwrap();
		assert_eq!(a, ResourceAddress::new("192.168.0.106"));

		let b:ResourceAddress = "tcpip0::scope.lab::inst1::INSTR".parse().unwrap();
		assert_eq!(b.host, "scope.lab");
		assert_eq!(b.device, "inst1");

		let c:ResourceAddress = "10.0.0.7".parse().unwrap();
		assert_eq!(c.to_string(), "TCPIP::10.0.0.7::inst0::INSTR");

		assert!("GPIB0::7::INSTR".parse::<ResourceAddress>().is_err());
	}
}
