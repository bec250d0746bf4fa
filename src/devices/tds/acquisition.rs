use std::fmt;
use std::time::Duration;

use lazy_static::lazy_static;
use log::{debug, info};
use regex::Regex;

use crate::error::{Error, Result, Stage};
use crate::link::Link;
use super::clock::{CancelToken, Clock, SystemClock};
use super::config::{AcquisitionConfig, Completion, ControllerConfig, ScalingLaw};
use super::scaling::{self, ScaledWaveform, WaveformPreamble};
use super::session::Session;
use super::waveform::{RawWaveform, WaveformFetcher};

lazy_static! {
	// Tolerates the long-form header the instrument echoes when HEADER is ON
	static ref ACQ_STATE_RE: Regex = Regex::new("(?i)^\\s*(?::?ACQ(?:UIRE)?:STATE\\s+)?(\\S+)\\s*$").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionState { Idle, Configured, Armed, Running, Settled, Stopped }

impl fmt::Display for AcquisitionState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:?}", self) }
}

fn acquisition_stopped(resp:&str) -> Result<bool> {
	let value = ACQ_STATE_RE.captures(resp).and_then(|c| c.get(1)).map(|m| m.as_str().to_ascii_uppercase());
	match value.as_deref() {
		Some("0") | Some("OFF") | Some("STOP") => Ok(true),
		Some("1") | Some("ON") | Some("RUN")   => Ok(false),
		_ => Err(Error::protocol("ACQUIRE:STATE?", format!("unrecognised acquisition state {:?}", resp))),
	}
}

// Everything a single acquisition cycle produced
#[derive(Debug, Clone, PartialEq)]
pub struct Acquisition {
	pub preamble: WaveformPreamble,
	pub waveform: RawWaveform,
}

impl Acquisition {
	pub fn scaled(&self, law:ScalingLaw) -> Vec<ScaledWaveform> {
		self.waveform.frames().map(|frame| scaling::scale(&frame, &self.preamble, law)).collect()
	}
}

// Drives one acquisition cycle on a verified session:
// Idle -> Configured -> Armed -> Running -> Settled -> Stopped, and only then lets the curve be read
pub struct AcquisitionController<'s, L: Link, C: Clock = SystemClock> {
	session: &'s mut Session<L>,
	config: AcquisitionConfig,
	timing: ControllerConfig,
	clock: C,
	cancel: CancelToken,
	state: AcquisitionState,
}

impl<'s, L: Link> AcquisitionController<'s, L, SystemClock> {
	pub fn new(session:&'s mut Session<L>, config:AcquisitionConfig, timing:ControllerConfig) -> Result<Self> {
		Self::with_clock(session, config, timing, SystemClock)
	}
}

impl<'s, L: Link, C: Clock> AcquisitionController<'s, L, C> {

	pub fn with_clock(session:&'s mut Session<L>, config:AcquisitionConfig, timing:ControllerConfig, clock:C) -> Result<Self> {
		config.validate()?;
		if timing.poll_interval_ms == 0 {
			return Err(Error::Config("poll interval must be nonzero".to_owned()));
		}
		Ok(Self { session, config, timing, clock, cancel: CancelToken::new(), state: AcquisitionState::Idle })
	}

	pub fn with_cancel(mut self, cancel:CancelToken) -> Self {
		self.cancel = cancel;
		self
	}

	pub fn state(&self) -> AcquisitionState { self.state }
	pub fn config(&self) -> &AcquisitionConfig { &self.config }
	pub fn session(&self) -> &Session<L> { &*self.session }

	fn expect(&self, operation:&'static str, allowed:&[AcquisitionState]) -> Result<()> {
		if allowed.contains(&self.state) { Ok(()) }
		else { Err(Error::InvalidState { operation, state: self.state.to_string() }) }
	}

	fn deadline(&self) -> Duration { self.timing.deadline(self.session.timeout()) }

	// A failed write leaves the instrument half configured, so the only way forward is to configure again.
	// A running acquisition has to be aborted first.
	pub fn configure(&mut self) -> Result<()> {
		self.expect("configuring", &[AcquisitionState::Idle, AcquisitionState::Configured, AcquisitionState::Armed,
			AcquisitionState::Settled, AcquisitionState::Stopped])?;
		self.state = AcquisitionState::Idle;

		let mut cmds:Vec<String> = vec!["ACQUIRE:STATE STOP".to_owned(), "*CLS".to_owned()];
		cmds.extend(self.config.commands());
		for cmd in &cmds {
			self.session.write(cmd).map_err(|e| e.at(Stage::Configuration))?;
		}

		debug!("configured {} for {} frame(s) of {} points", self.config.channel, self.config.frame_count, self.config.record_length);
		self.state = AcquisitionState::Configured;
		Ok(())
	}

	pub fn arm(&mut self) -> Result<()> {
		self.expect("arming", &[AcquisitionState::Configured])?;

		let fast_frame = if self.config.fast_frame() { "ON" } else { "OFF" };
		self.session.write("ACQUIRE:STOPAFTER SEQUENCE").map_err(|e| e.at(Stage::Arming))?;
		self.session.write(&format!("HORIZONTAL:FASTFRAME:STATE {}", fast_frame)).map_err(|e| e.at(Stage::Arming))?;

		self.state = AcquisitionState::Armed;
		Ok(())
	}

	pub fn run(&mut self) -> Result<()> {
		self.expect("starting the run", &[AcquisitionState::Armed])?;
		self.session.write("ACQUIRE:STATE RUN").map_err(|e| e.at(Stage::Arming))?;
		info!("acquiring...");
		self.state = AcquisitionState::Running;
		Ok(())
	}

	pub fn wait(&mut self) -> Result<()> {
		self.expect("waiting for completion", &[AcquisitionState::Running])?;

		let r = match self.timing.completion {
			Completion::Poll => self.poll_until_stopped(),
			Completion::OperationComplete => self.wait_operation_complete(),
		};
		r.map_err(|e| e.at(Stage::Polling))?;

		info!("acquisition complete");
		self.state = AcquisitionState::Settled;
		Ok(())
	}

	fn poll_until_stopped(&mut self) -> Result<()> {
		let deadline = self.deadline();
		let interval = self.timing.poll_interval();
		let start = self.clock.now();

		loop {
			if self.cancel.is_cancelled() { return Err(Error::Cancelled); }

			let elapsed = self.clock.now() - start;
			if elapsed >= deadline { return Err(Error::AcquisitionTimeout(deadline)); }

			// An instrument that stops answering mustn't hold the loop past the deadline
			let resp = self.session.with_timeout(deadline - elapsed, |s| s.query("ACQUIRE:STATE?"))
				.map_err(|e| if e.is_timeout() { Error::AcquisitionTimeout(deadline) } else { e })?;
			if acquisition_stopped(&resp)? { return Ok(()); }

			let elapsed = self.clock.now() - start;
			if elapsed >= deadline { return Err(Error::AcquisitionTimeout(deadline)); }

			self.clock.sleep(interval.min(deadline - elapsed));
		}
	}

	fn wait_operation_complete(&mut self) -> Result<()> {
		if self.cancel.is_cancelled() { return Err(Error::Cancelled); }

		let deadline = self.deadline();
		self.session.write("*WAI")?;
		let resp = self.session.with_timeout(deadline, |s| s.query("*OPC?"))
			.map_err(|e| if e.is_timeout() { Error::AcquisitionTimeout(deadline) } else { e })?;

		match resp.trim() {
			"1" => Ok(()),
			other => Err(Error::protocol("*OPC?", format!("expected 1, got {:?}", other))),
		}
	}

	// Safe to repeat; the instrument ignores a stop when it's already stopped
	pub fn stop(&mut self) -> Result<()> {
		self.expect("stopping", &[AcquisitionState::Settled, AcquisitionState::Stopped])?;
		self.session.write("ACQUIRE:STATE STOP").map_err(|e| e.at(Stage::Stopping))?;
		self.state = AcquisitionState::Stopped;
		Ok(())
	}

	// Halts whatever is going on and drops back to Idle, e.g. after a polling timeout
	pub fn abort(&mut self) -> Result<()> {
		self.state = AcquisitionState::Idle;
		self.session.write("ACQUIRE:STATE STOP").map_err(|e| e.at(Stage::Stopping))
	}

	pub fn record_length(&mut self) -> Result<usize> {
		self.expect("reading the record length", &[AcquisitionState::Stopped])?;
		match self.session.query_usize("WFMOUTPRE:NR_PT?")? {
			0 => Err(Error::protocol("WFMOUTPRE:NR_PT?", "instrument reports an empty record")),
			n => Ok(n),
		}
	}

	pub fn frame_count(&mut self) -> Result<usize> {
		self.expect("reading the frame count", &[AcquisitionState::Stopped])?;
		if !self.config.fast_frame() { return Ok(1); }

		match self.session.query_usize("HORIZONTAL:FASTFRAME:COUNT?")? {
			0 => Err(Error::protocol("HORIZONTAL:FASTFRAME:COUNT?", "instrument reports zero frames")),
			n => Ok(n),
		}
	}

	pub fn preamble(&mut self) -> Result<WaveformPreamble> {
		self.expect("reading the preamble", &[AcquisitionState::Stopped])?;
		self.read_preamble().map_err(|e| e.at(Stage::Transfer))
	}

	fn read_preamble(&mut self) -> Result<WaveformPreamble> {
		let ch = self.config.channel;
		Ok(WaveformPreamble {
			record_length: self.record_length()?,
			vertical_scale: self.session.query_f64(&format!("{}:SCALE?", ch))?,
			vertical_position: self.session.query_f64(&format!("{}:POSITION?", ch))?,
			horizontal_scale: self.session.query_f64("HORIZONTAL:SCALE?")?,
			horizontal_position: self.session.query_f64("HORIZONTAL:POSITION?")?,
		})
	}

	// The curve query only ever goes out once the instrument has been told to stop
	pub fn fetch(&mut self) -> Result<RawWaveform> {
		self.expect("fetching the waveform", &[AcquisitionState::Stopped])?;
		self.read_waveform().map_err(|e| e.at(Stage::Transfer))
	}

	fn read_waveform(&mut self) -> Result<RawWaveform> {
		let record_length = self.record_length()?;
		let frame_count = self.frame_count()?;
		let fetcher = WaveformFetcher::for_config(&self.config)?;
		fetcher.fetch(&mut *self.session, record_length, frame_count)
	}

	pub fn acquire(&mut self) -> Result<Acquisition> {
		self.configure()?;
		self.arm()?;
		self.run()?;
		self.wait()?;
		self.stop()?;

		let preamble = self.preamble()?;
		let waveform = self.fetch()?;
		info!("received {} frame(s) of {} points", waveform.frame_count(), waveform.record_length());
		Ok(Acquisition { preamble, waveform })
	}

}
