use serde::{Serialize, Deserialize};

use super::config::ScalingLaw;
use super::waveform::Frame;

// What the instrument reported about how to turn codes into seconds and volts.  Read fresh for every acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaveformPreamble {
	pub record_length: usize,
	pub vertical_scale: f64,
	pub vertical_position: f64,
	pub horizontal_scale: f64,
	pub horizontal_position: f64,
}

impl WaveformPreamble {

	pub fn time(&self, index:usize) -> f64 { index as f64 * self.horizontal_scale - self.horizontal_position }

	pub fn time_axis(&self) -> Vec<f64> { (0..self.record_length).map(|i| self.time(i)).collect() }

	pub fn amplitude(&self, raw:i16, law:ScalingLaw) -> f64 {
		match law {
			ScalingLaw::Offset => raw as f64 * self.vertical_scale - self.vertical_position,
			ScalingLaw::Divisor { codes_per_division } => raw as f64 * self.vertical_scale / codes_per_division,
		}
	}

}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
	pub time: f64,
	pub amplitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaledWaveform {
	pub frame: usize,
	pub points: Vec<Sample>,
}

impl ScaledWaveform {
	pub fn len(&self) -> usize { self.points.len() }
	pub fn is_empty(&self) -> bool { self.points.is_empty() }

	pub fn times(&self) -> impl Iterator<Item=f64> + '_ { self.points.iter().map(|p| p.time) }
	pub fn amplitudes(&self) -> impl Iterator<Item=f64> + '_ { self.points.iter().map(|p| p.amplitude) }
}

// Every frame shares the one horizontal preamble, so sample i of any frame lands at the same time
pub fn scale(frame:&Frame, preamble:&WaveformPreamble, law:ScalingLaw) -> ScaledWaveform {
	let points = frame.samples.iter().enumerate()
		.map(|(i, raw)| Sample { time: preamble.time(i), amplitude: preamble.amplitude(*raw, law) })
		.collect();

	ScaledWaveform { frame: frame.index, points }
}
