// A scripted stand-in for a TDS oscilloscope on the far end of a Link

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io;
use std::time::Duration;

use tds_acquire::{Error, Link, Result};
use tds_acquire::devices::tds::Session;

pub const TDS_IDN:&str = "TEKTRONIX,TDS7104,B010123,CF:91.1CT FV:v2.4.0";

pub struct FakeScope {
	pub sent: Vec<String>,
	pub responses: HashMap<String, String>,
	// Answers to ACQUIRE:STATE?, one per poll; "0" once exhausted
	pub acq_states: VecDeque<String>,
	pub curve: Vec<u8>,
	pub running: bool,
	pub curve_requested_while_running: bool,
	pub opc_never_completes: bool,
	pub fail_on: Option<String>,
	// A query the instrument never answers
	pub unanswered: Option<String>,
	pub timeout: Duration,
	pub timeouts_set: Vec<Duration>,
	pub closed: bool,
	pending: Option<Vec<u8>>,
}

// IEEE 488.2 definite length block with a trailing newline
pub fn block(payload:&[u8]) -> Vec<u8> {
	let len = payload.len().to_string();
	let mut ans = format!("#{}{}", len.len(), len).into_bytes();
	ans.extend_from_slice(payload);
	ans.push(b'\n');
	ans
}

// Frame f, sample i carries code (i % 100) - 50 * f
pub fn ramp(record_length:usize, frame_count:usize) -> Vec<i8> {
	(0..frame_count).flat_map(|f| (0..record_length).map(move |i| ((i % 100) as i64 - 50 * f as i64) as i8)).collect()
}

impl FakeScope {

	pub fn new() -> Self {
		let mut responses = HashMap::new();
		for (q, a) in &[
			("*IDN?", TDS_IDN),
			("WFMOUTPRE:NR_PT?", "2000"),
			("HORIZONTAL:FASTFRAME:COUNT?", "2"),
			("CH1:SCALE?", "5.0E-1"),
			("CH1:POSITION?", "1.0"),
			("HORIZONTAL:SCALE?", "1.0E-8"),
			("HORIZONTAL:POSITION?", "20"),
			("*OPC?", "1"),
		] {
			responses.insert(q.to_string(), a.to_string());
		}

		let curve = ramp(2000, 2).into_iter().map(|x| x as u8).collect::<Vec<u8>>();

		Self {
			sent: vec![],
			responses,
			acq_states: VecDeque::from(vec!["1".to_string(), "1".to_string(), "0".to_string()]),
			curve: block(&curve),
			running: false,
			curve_requested_while_running: false,
			opc_never_completes: false,
			fail_on: None,
			unanswered: None,
			timeout: Duration::from_secs(10),
			timeouts_set: vec![],
			closed: false,
			pending: None,
		}
	}

	pub fn with_identity(mut self, idn:&str) -> Self {
		self.responses.insert("*IDN?".to_string(), idn.to_string());
		self
	}

	pub fn with_response(mut self, query:&str, answer:&str) -> Self {
		self.responses.insert(query.to_string(), answer.to_string());
		self
	}

	pub fn with_curve_payload(mut self, payload:&[u8]) -> Self {
		self.curve = block(payload);
		self
	}

	pub fn with_acq_states(mut self, states:&[&str]) -> Self {
		self.acq_states = states.iter().map(|s| s.to_string()).collect();
		self
	}

	pub fn position(&self, command:&str) -> Option<usize> { self.sent.iter().position(|c| c == command) }

	pub fn count(&self, command:&str) -> usize { self.sent.iter().filter(|c| *c == command).count() }

}

impl Link for FakeScope {

	fn write_bytes(&mut self, data:&[u8]) -> Result<()> {
		if self.closed {
			return Err(Error::Io(io::ErrorKind::NotConnected.into()));
		}

		let command = String::from_utf8_lossy(data).trim_end().to_string();
		self.sent.push(command.clone());

		if self.fail_on.as_deref() == Some(command.as_str()) {
			return Err(Error::Io(io::ErrorKind::BrokenPipe.into()));
		}

		if self.unanswered.as_deref() == Some(command.as_str()) {
			self.pending = None;
			return Ok(());
		}

		match command.as_str() {
			"ACQUIRE:STATE RUN"  => self.running = true,
			"ACQUIRE:STATE STOP" => self.running = false,
			"ACQUIRE:STATE?" => {
				let state = self.acq_states.pop_front().unwrap_or_else(|| "0".to_string());
				if state == "0" { self.running = false; }
				self.pending = Some(format!("{}\n", state).into_bytes());
			},
			"CURVE?" => {
				self.curve_requested_while_running |= self.running;
				self.pending = Some(self.curve.clone());
			},
			"*OPC?" if self.opc_never_completes => self.pending = None,
			q if q.ends_with('?') => {
				self.pending = self.responses.get(q).map(|a| format!("{}\n", a).into_bytes());
			},
			_ => {},
		}
		Ok(())
	}

	fn read_bytes(&mut self) -> Result<Vec<u8>> {
		self.pending.take().ok_or_else(|| Error::Io(io::ErrorKind::TimedOut.into()))
	}

	fn timeout(&self) -> Duration { self.timeout }

	fn set_timeout(&mut self, timeout:Duration) -> Result<()> {
		self.timeouts_set.push(timeout);
		self.timeout = timeout;
		Ok(())
	}

	fn close(&mut self) -> Result<()> {
		self.closed = true;
		Ok(())
	}

}

pub fn verified_session(scope:FakeScope) -> Session<FakeScope> {
	let mut session = Session::new(scope);
	session.assert_model("TEKTRONIX,TDS").expect("fake scope identifies as a TDS");
	session
}
