use std::time::Duration;

use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;
use serde::{Serialize, Deserialize};

use crate::error::{Error, Result, Stage};
use crate::link::{ElementType, Endianness, Link, ResourceAddress};
use crate::vxi11::CoreClient;
use super::command_log::{CommandKind, CommandLog};
use super::config::LinkConfig;

lazy_static! {
	static ref IDN_RE: Regex = Regex::new("^([^,]+),([^,]+),([^,]+),(.+)$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentIdentity {
	pub raw: String,
	pub manufacturer: String,
	pub model: String,
	pub serial_num: String,
	pub fw_version: String,
}

impl InstrumentIdentity {

	pub fn parse(raw:&str) -> Result<Self> {
		let raw = raw.trim();
		if raw.is_empty() {
			return Err(Error::protocol("*IDN?", "empty identity"));
		}

		let caps = IDN_RE.captures(raw).ok_or_else(|| Error::protocol("*IDN?", format!("expected at least four comma separated fields, got {:?}", raw)))?;
		let field = |n:usize| caps.get(n).map(|m| m.as_str().trim().to_owned()).unwrap_or_default();

		Ok(Self { raw: raw.to_owned(), manufacturer: field(1), model: field(2), serial_num: field(3), fw_version: field(4) })
	}

	pub fn matches(&self, prefix:&str) -> bool { self.raw.starts_with(prefix) }

}

// A link to one instrument plus the history of what was sent over it.  Nothing that changes the instrument's
// state goes out until `assert_model` has confirmed we're talking to the instrument we think we are.
pub struct Session<L: Link> {
	link: L,
	log: CommandLog,
	identity: Option<InstrumentIdentity>,
	verified: bool,
	closed: bool,
}

impl Session<CoreClient> {

	pub fn connect(address:&str, config:&LinkConfig) -> Result<Self> {
		let address:ResourceAddress = address.parse()?;
		let mut core = CoreClient::open(&address, config.timeout())?;
		core.set_write_termination(&config.write_termination);
		if let Err(e) = core.clear() {
			debug!("device clear on {} failed: {}", address, e);
		}
		Ok(Session::new(core))
	}

}

impl<L: Link> Session<L> {

	pub fn new(link:L) -> Self {
		Self { link, log: CommandLog::new(), identity: None, verified: false, closed: false }
	}

	pub fn link(&self) -> &L { &self.link }

	pub fn command_log(&self) -> &CommandLog { &self.log }

	pub fn is_verified(&self) -> bool { self.verified }

	pub fn timeout(&self) -> Duration { self.link.timeout() }

	// Queried once, then cached for the life of the session
	pub fn identity(&mut self) -> Result<InstrumentIdentity> {
		if let Some(id) = &self.identity {
			return Ok(id.clone());
		}

		let raw = self.query("*IDN?")?;
		let id = InstrumentIdentity::parse(&raw)?;
		info!("connected to {}", id.raw);
		self.identity = Some(id.clone());
		Ok(id)
	}

	pub fn assert_model(&mut self, expected_prefix:&str) -> Result<InstrumentIdentity> {
		let id = self.identity().map_err(|e| e.at(Stage::IdentityCheck))?;
		if !id.matches(expected_prefix) {
			return Err(Error::UnsupportedDevice { expected: expected_prefix.to_owned(), actual: id.raw }.at(Stage::IdentityCheck));
		}
		self.verified = true;
		Ok(id)
	}

	fn guard(&self, command:&str) -> Result<()> {
		if self.closed {
			return Err(Error::Connection { address: String::new(), reason: format!("link was closed after an earlier error; not sending {:?}", command) });
		}
		Ok(())
	}

	// Drops the link once its framing can't be trusted
	fn check<T>(&mut self, r:Result<T>) -> Result<T> {
		if let Err(e) = &r {
			if e.poisons_link() && !self.closed {
				warn!("closing link after protocol error: {}", e);
				self.closed = true;
				if let Err(close_err) = self.link.close() {
					warn!("unable to close link: {}", close_err);
				}
			}
		}
		r
	}

	pub fn write(&mut self, command:&str) -> Result<()> {
		self.guard(command)?;
		if !self.verified {
			return Err(Error::InvalidState { operation: "sending a configuration command", state: "unverified (identity not checked)".to_owned() });
		}

		debug!("Writing: {}", command);
		self.log.record(CommandKind::Write, command);
		let r = self.link.send(command);
		self.check(r)
	}

	pub fn query(&mut self, command:&str) -> Result<String> {
		self.guard(command)?;
		self.log.record(CommandKind::Query, command);
		let r = self.link.query(command);
		self.check(r)
	}

	pub fn query_f64(&mut self, command:&str) -> Result<f64> {
		let resp = self.query(command)?;
		resp.trim().parse::<f64>().map_err(|_| Error::protocol(command, format!("expected a number, got {:?}", resp)))
	}

	pub fn query_usize(&mut self, command:&str) -> Result<usize> {
		let resp = self.query(command)?;
		let value = resp.trim();
		// Some firmware answers integer queries in NR3 form
		value.parse::<usize>().ok()
			.or_else(|| value.parse::<f64>().ok().filter(|x| *x >= 0.0 && x.fract() == 0.0).map(|x| x as usize))
			.ok_or_else(|| Error::protocol(command, format!("expected a count, got {:?}", resp)))
	}

	pub fn query_binary(&mut self, command:&str, element:ElementType, order:Endianness) -> Result<Vec<i16>> {
		self.guard(command)?;
		self.log.record(CommandKind::BinaryQuery, command);
		let r = self.link.query_binary(command, element, order);
		self.check(r)
	}

	pub fn reset(&mut self) -> Result<()> { self.write("*RST") }
	pub fn clear_status(&mut self) -> Result<()> { self.write("*CLS") }

	// Runs `f` with a different link timeout and puts the old one back afterwards, whether or not `f` succeeded
	pub fn with_timeout<T, F>(&mut self, timeout:Duration, f:F) -> Result<T>
		where F: FnOnce(&mut Self) -> Result<T>
	{
		let previous = self.link.timeout();
		self.link.set_timeout(timeout)?;
		let ans = f(self);
		let restored = self.link.set_timeout(previous);
		let ans = ans?;
		restored?;
		Ok(ans)
	}

	pub fn close(mut self) -> Result<()> {
		if self.closed { return Ok(()); }
		self.closed = true;
		self.link.close()
	}

}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn identity_fields() {
		let id = InstrumentIdentity::parse("TEKTRONIX,TDS7104,B010123,CF:91.1CT FV:v2.4.0\n").unwrap();
		assert_eq!(id.manufacturer, "TEKTRONIX");
		assert_eq!(id.model, "TDS7104");
		assert_eq!(id.serial_num, "B010123");
		assert_eq!(id.fw_version, "CF:91.1CT FV:v2.4.0");
		assert!(id.matches("TEKTRONIX,TDS"));
		assert!(!id.matches("TEKTRONIX,DPO"));
	}

	#[test]
	fn firmware_field_may_contain_commas() {
		let id = InstrumentIdentity::parse("TEKTRONIX,TDS7104,B010123,CF:91.1CT,FV:v2.4.0").unwrap();
		assert_eq!(id.model, "TDS7104");
		assert_eq!(id.fw_version, "CF:91.1CT,FV:v2.4.0");
		assert!(id.matches("TEKTRONIX,TDS"));
	}

	#[test]
	fn empty_or_malformed_identity_is_a_protocol_error() {
		for raw in &["", "  \n", "TEKTRONIX", "TEKTRONIX,TDS7104,B010123"] {
			match InstrumentIdentity::parse(raw) {
				Err(Error::Protocol { .. }) => {},
				other => panic!("{:?} gave {:?}", raw, other),
			}
		}
	}
}
