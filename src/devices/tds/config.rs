use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Serialize, Deserialize};

use crate::error::{Error, Result};
use crate::link::{ElementType, Endianness};

pub const DEFAULT_MODEL_PREFIX:&str = "TEKTRONIX,TDS";

// Codes per vertical division of the 8-bit ADC
pub const DEFAULT_CODES_PER_DIVISION:f64 = 25.0;

pub const DEFAULT_TIMEOUT_MS:u64 = 10_000;
pub const DEFAULT_POLL_INTERVAL_MS:u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Channel(pub u8);

impl fmt::Display for Channel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "CH{}", self.0) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquireMode { Sample, PeakDetect, HiRes, Average, Envelope }

impl AcquireMode {
	fn keyword(&self) -> &'static str { match self {
		AcquireMode::Sample     => "SAMPLE",
		AcquireMode::PeakDetect => "PEAKDETECT",
		AcquireMode::HiRes      => "HIRES",
		AcquireMode::Average    => "AVERAGE",
		AcquireMode::Envelope   => "ENVELOPE",
	}}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMode { RealTime, Equivalent, Interpolated }

impl SamplingMode {
	fn keyword(&self) -> &'static str { match self {
		SamplingMode::RealTime     => "RT",
		SamplingMode::Equivalent   => "ET",
		SamplingMode::Interpolated => "IT",
	}}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Coupling { Dc, Ac, Gnd }

impl Coupling {
	fn keyword(&self) -> &'static str { match self {
		Coupling::Dc  => "DC",
		Coupling::Ac  => "AC",
		Coupling::Gnd => "GND",
	}}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slope { Rise, Fall }

impl Slope {
	fn keyword(&self) -> &'static str { match self {
		Slope::Rise => "RISE",
		Slope::Fall => "FALL",
	}}
}

// RIBinary is signed big-endian, SRIBinary is signed little-endian
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding { RiBinary, SriBinary }

impl Encoding {
	fn keyword(&self) -> &'static str { match self {
		Encoding::RiBinary  => "RIBINARY",
		Encoding::SriBinary => "SRIBINARY",
	}}

	pub fn byte_order(&self) -> Endianness { match self {
		Encoding::RiBinary  => Endianness::Big,
		Encoding::SriBinary => Endianness::Little,
	}}
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Termination {
	pub channel: Channel,
	pub ohms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
	pub source: Channel,
	pub level: f64,
	pub slope: Slope,
}

impl Default for TriggerConfig {
	fn default() -> Self { Self { source: Channel(1), level: -0.30, slope: Slope::Fall } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
	pub acquire_mode: AcquireMode,
	pub sampling_mode: SamplingMode,
	pub channel: Channel,
	pub channel_count: u8,
	pub terminations: Vec<Termination>,
	pub vertical_scale: f64,
	pub coupling: Coupling,
	pub horizontal_scale: f64,
	pub trigger: TriggerConfig,
	pub sample_rate: f64,
	pub record_length: usize,
	pub trigger_position: f64,
	pub encoding: Encoding,
	pub bytes_per_sample: u8,
	pub data_start: usize,
	pub data_stop: usize,
	pub frame_count: usize,
}

impl Default for AcquisitionConfig {
	fn default() -> Self {
		Self {
			acquire_mode: AcquireMode::Sample,
			sampling_mode: SamplingMode::RealTime,
			channel: Channel(1),
			channel_count: 4,
			terminations: (1..=4).map(|n| Termination { channel: Channel(n), ohms: 50.0 }).collect(),
			vertical_scale: 0.5,
			coupling: Coupling::Dc,
			horizontal_scale: 10e-9,
			trigger: TriggerConfig::default(),
			sample_rate: 5e9,
			record_length: 2000,
			trigger_position: 20.0,
			encoding: Encoding::RiBinary,
			bytes_per_sample: 1,
			data_start: 1,
			data_stop: 2000,
			frame_count: 2,
		}
	}
}

impl AcquisitionConfig {

	pub fn validate(&self) -> Result<()> {
		let channels = 1..=self.channel_count;
		let bad = |msg:String| Err(Error::Config(msg));

		if !channels.contains(&self.channel.0) { return bad(format!("{} is not one of the {} channels", self.channel, self.channel_count)); }
		if !channels.contains(&self.trigger.source.0) { return bad(format!("trigger source {} is not one of the {} channels", self.trigger.source, self.channel_count)); }
		if let Some(t) = self.terminations.iter().find(|t| !channels.contains(&t.channel.0)) {
			return bad(format!("termination given for nonexistent channel {}", t.channel));
		}
		if self.record_length == 0 { return bad("record length must be greater than zero".to_owned()); }
		if self.frame_count == 0 { return bad("frame count must be at least one".to_owned()); }
		if self.data_start == 0 || self.data_start > self.data_stop || self.data_stop > self.record_length {
			return bad(format!("data window {}..={} does not fit a record of {} points", self.data_start, self.data_stop, self.record_length));
		}
		if !(0.0..=100.0).contains(&self.trigger_position) { return bad(format!("trigger position {}% is outside 0..=100", self.trigger_position)); }
		if self.element_type().is_none() { return bad(format!("{} bytes per sample is not supported", self.bytes_per_sample)); }
		if !(self.vertical_scale > 0.0 && self.horizontal_scale > 0.0 && self.sample_rate > 0.0) {
			return bad("scales and sample rate must be positive".to_owned());
		}

		Ok(())
	}

	pub fn element_type(&self) -> Option<ElementType> { ElementType::from_width(self.bytes_per_sample) }

	pub fn fast_frame(&self) -> bool { self.frame_count > 1 }

	// The setup sequence, in the order it has to reach the instrument.  Horizontal and trigger settings all go
	// out before the run is armed because the firmware latches some of them at arm time.
	pub fn commands(&self) -> Vec<String> {
		let ch = self.channel;
		let mut cmds:Vec<String> = vec![
			format!("ACQUIRE:MODE {}", self.acquire_mode.keyword()),
			format!("ACQUIRE:SAMPLINGMODE {}", self.sampling_mode.keyword()),
			"HEADER OFF".to_owned(),
		];

		for n in 1..=self.channel_count {
			cmds.push(format!("SELECT:CH{} {}", n, if n == ch.0 { "ON" } else { "OFF" }));
		}
		for t in &self.terminations {
			cmds.push(format!("{}:TERMINATION {}", t.channel, t.ohms));
		}

		cmds.push(format!("{}:SCALE {}", ch, self.vertical_scale));
		cmds.push(format!("{}:COUPLING {}", ch, self.coupling.keyword()));
		cmds.push(format!("HORIZONTAL:SCALE {}", self.horizontal_scale));

		cmds.push(format!("TRIGGER:A:EDGE:SOURCE {}", self.trigger.source));
		cmds.push(format!("TRIGGER:A:EDGE:LEVEL {}", self.trigger.level));
		cmds.push(format!("TRIGGER:A:EDGE:SLOPE {}", self.trigger.slope.keyword()));

		cmds.push(format!("HORIZONTAL:MAIN:SAMPLERATE {}", self.sample_rate));
		cmds.push(format!("HORIZONTAL:RECORDLENGTH {}", self.record_length));
		cmds.push(format!("HORIZONTAL:TRIGGER:POSITION {}", self.trigger_position));

		cmds.push(format!("DATA:ENCDG {}", self.encoding.keyword()));
		cmds.push(format!("WFMOUTPRE:BYT_NR {}", self.bytes_per_sample));
		cmds.push(format!("DATA:START {}", self.data_start));
		cmds.push(format!("DATA:STOP {}", self.data_stop));
		cmds.push(format!("DATA:SOURCE {}", ch));

		cmds.push(format!("HORIZONTAL:FASTFRAME:COUNT {}", self.frame_count));

		cmds
	}

}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
	// Query ACQUIRE:STATE? until the instrument reports it stopped
	Poll,
	// *WAI then *OPC?, letting the link block until the instrument is done
	OperationComplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
	pub completion: Completion,
	pub poll_interval_ms: u64,
	// Falls back to the link timeout
	pub deadline_ms: Option<u64>,
}

impl Default for ControllerConfig {
	fn default() -> Self { Self { completion: Completion::Poll, poll_interval_ms: DEFAULT_POLL_INTERVAL_MS, deadline_ms: None } }
}

impl ControllerConfig {
	pub fn poll_interval(&self) -> Duration { Duration::from_millis(self.poll_interval_ms) }

	pub fn deadline(&self, link_timeout:Duration) -> Duration {
		self.deadline_ms.map(Duration::from_millis).unwrap_or(link_timeout)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
	pub timeout_ms: u64,
	pub write_termination: String,
}

impl Default for LinkConfig {
	fn default() -> Self { Self { timeout_ms: DEFAULT_TIMEOUT_MS, write_termination: "\n".to_owned() } }
}

impl LinkConfig {
	pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_ms) }
}

// How raw codes become volts.  Instrument families disagree on what the reported vertical scale means, so
// this is picked per instrument rather than guessed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "law", rename_all = "snake_case")]
pub enum ScalingLaw {
	// amplitude = raw * scale - position
	Offset,
	// amplitude = raw * scale / codes_per_division, for scales reported in volts per division
	Divisor { codes_per_division: f64 },
}

impl Default for ScalingLaw {
	fn default() -> Self { ScalingLaw::Offset }
}

impl ScalingLaw {
	pub fn adc_divisions() -> Self { ScalingLaw::Divisor { codes_per_division: DEFAULT_CODES_PER_DIVISION } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
	pub expected_model: String,
	pub link: LinkConfig,
	pub acquisition: AcquisitionConfig,
	pub controller: ControllerConfig,
	pub scaling: ScalingLaw,
}

impl Default for Settings {
	fn default() -> Self {
		Self {
			expected_model: DEFAULT_MODEL_PREFIX.to_owned(),
			link: LinkConfig::default(),
			acquisition: AcquisitionConfig::default(),
			controller: ControllerConfig::default(),
			scaling: ScalingLaw::default(),
		}
	}
}

impl Settings {

	pub fn from_json(text:&str) -> Result<Self> {
		let settings:Settings = serde_json::from_str(text)?;
		settings.validate()?;
		Ok(settings)
	}

	pub fn from_file<P: AsRef<Path>>(path:P) -> Result<Self> {
		Self::from_json(&fs::read_to_string(path)?)
	}

	pub fn validate(&self) -> Result<()> {
		if let ScalingLaw::Divisor { codes_per_division } = self.scaling {
			if !(codes_per_division > 0.0) { return Err(Error::Config("codes per division must be positive".to_owned())); }
		}
		if self.controller.poll_interval_ms == 0 { return Err(Error::Config("poll interval must be nonzero".to_owned())); }
		self.acquisition.validate()
	}

}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_sequence_matches_the_bench_setup() {
		let cmds = AcquisitionConfig::default().commands();
		let expected = vec![
			"ACQUIRE:MODE SAMPLE",
			"ACQUIRE:SAMPLINGMODE RT",
			"HEADER OFF",
			"SELECT:CH1 ON",
			"SELECT:CH2 OFF",
			"SELECT:CH3 OFF",
			"SELECT:CH4 OFF",
			"CH1:TERMINATION 50",
			"CH2:TERMINATION 50",
			"CH3:TERMINATION 50",
			"CH4:TERMINATION 50",
			"CH1:SCALE 0.5",
			"CH1:COUPLING DC",
			"HORIZONTAL:SCALE 0.00000001",
			"TRIGGER:A:EDGE:SOURCE CH1",
			"TRIGGER:A:EDGE:LEVEL -0.3",
			"TRIGGER:A:EDGE:SLOPE FALL",
			"HORIZONTAL:MAIN:SAMPLERATE 5000000000",
			"HORIZONTAL:RECORDLENGTH 2000",
			"HORIZONTAL:TRIGGER:POSITION 20",
			"DATA:ENCDG RIBINARY",
			"WFMOUTPRE:BYT_NR 1",
			"DATA:START 1",
			"DATA:STOP 2000",
			"DATA:SOURCE CH1",
			"HORIZONTAL:FASTFRAME:COUNT 2",
		];
		assert_eq!(cmds, expected);
	}

	#[test]
	fn trigger_and_horizontal_come_before_data_setup() {
		let cmds = AcquisitionConfig::default().commands();
		let pos = |prefix:&str| cmds.iter().position(|c| c.starts_with(prefix)).unwrap();
		assert!(pos("TRIGGER:A:EDGE:SLOPE") < pos("DATA:ENCDG"));
		assert!(pos("HORIZONTAL:RECORDLENGTH") < pos("HORIZONTAL:FASTFRAME:COUNT"));
	}

	#[test]
	fn validation_rejects_bad_shapes() {
		let mut c = AcquisitionConfig::default();
		assert!(c.validate().is_ok());

		c.frame_count = 0;
		assert!(c.validate().is_err());

		let mut c = AcquisitionConfig::default();
		c.record_length = 0;
		assert!(c.validate().is_err());

		let mut c = AcquisitionConfig::default();
		c.channel = Channel(5);
		assert!(c.validate().is_err());

		let mut c = AcquisitionConfig::default();
		c.data_stop = 2001;
		assert!(c.validate().is_err());

		let mut c = AcquisitionConfig::default();
		c.bytes_per_sample = 4;
		assert!(c.validate().is_err());
	}

	#[test]
	fn settings_load_from_partial_json() {
		let text = r#"{
			"expected_model": "TEKTRONIX,TDS 7",
			"acquisition": { "frame_count": 1, "record_length": 500, "data_stop": 500, "encoding": "sri_binary" },
			"controller": { "completion": "operation_complete", "deadline_ms": 2500 },
			"scaling": { "law": "divisor", "codes_per_division": 25.0 }
		}"#;
		let s = Settings::from_json(text).unwrap();

		assert_eq!(s.expected_model, "TEKTRONIX,TDS 7");
		assert_eq!(s.acquisition.record_length, 500);
		assert!(!s.acquisition.fast_frame());
		assert_eq!(s.acquisition.encoding.byte_order(), Endianness::Little);
		assert_eq!(s.acquisition.channel, Channel(1));
		assert_eq!(s.controller.completion, Completion::OperationComplete);
		assert_eq!(s.controller.deadline(Duration::from_secs(10)), Duration::from_millis(2500));
		assert_eq!(s.scaling, ScalingLaw::adc_divisions());
		assert_eq!(s.link.timeout(), Duration::from_secs(10));
	}

	#[test]
	fn invalid_settings_file_is_rejected() {
		assert!(Settings::from_json(r#"{ "acquisition": { "frame_count": 0 } }"#).is_err());
		assert!(Settings::from_json(r#"{ "scaling": { "law": "divisor", "codes_per_division": 0.0 } }"#).is_err());
		assert!(Settings::from_json("not json").is_err());
	}
}
