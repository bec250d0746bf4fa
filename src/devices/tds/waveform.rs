use std::slice::ChunksExact;
use std::iter::Enumerate;

use log::debug;
use serde::{Serialize, Deserialize};

use crate::error::{Error, Result};
use crate::link::{ElementType, Endianness, Link};
use super::config::{AcquisitionConfig, Channel};
use super::session::Session;

// Sample codes of every frame back to back, frame 0 first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawWaveform {
	samples: Vec<i16>,
	record_length: usize,
	frame_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
	pub index: usize,
	pub samples: &'a [i16],
}

pub struct Frames<'a> {
	chunks: Enumerate<ChunksExact<'a, i16>>,
}

impl<'a> Iterator for Frames<'a> {
	type Item = Frame<'a>;

	fn next(&mut self) -> Option<Frame<'a>> {
		self.chunks.next().map(|(index, samples)| Frame { index, samples })
	}

	fn size_hint(&self) -> (usize, Option<usize>) { self.chunks.size_hint() }
}

impl<'a> ExactSizeIterator for Frames<'a> {}

impl RawWaveform {

	pub fn new(samples:Vec<i16>, record_length:usize, frame_count:usize) -> Result<Self> {
		if record_length == 0 || frame_count == 0 {
			return Err(Error::Config(format!("cannot shape a waveform as {} frames of {} points", frame_count, record_length)));
		}

		let expected = record_length.checked_mul(frame_count)
			.ok_or_else(|| Error::Config(format!("{} frames of {} points overflows", frame_count, record_length)))?;
		if samples.len() != expected {
			return Err(Error::BufferLengthMismatch { actual: samples.len(), expected });
		}

		Ok(Self { samples, record_length, frame_count })
	}

	pub fn samples(&self) -> &[i16] { &self.samples }
	pub fn into_samples(self) -> Vec<i16> { self.samples }

	pub fn len(&self) -> usize { self.samples.len() }
	pub fn is_empty(&self) -> bool { self.samples.is_empty() }

	pub fn record_length(&self) -> usize { self.record_length }
	pub fn frame_count(&self) -> usize { self.frame_count }

	pub fn frames(&self) -> Frames<'_> {
		Frames { chunks: self.samples.chunks_exact(self.record_length).enumerate() }
	}

	pub fn frame(&self, index:usize) -> Option<Frame<'_>> {
		if index >= self.frame_count { return None; }
		let start = index * self.record_length;
		Some(Frame { index, samples: &self.samples[start..start + self.record_length] })
	}

}

// Pulls the curve for one channel.  Only talks to the instrument through the session, so any Link will do.
#[derive(Debug, Clone, Copy)]
pub struct WaveformFetcher {
	pub source: Channel,
	pub element: ElementType,
	pub order: Endianness,
}

impl WaveformFetcher {

	pub fn new(source:Channel, element:ElementType, order:Endianness) -> Self { Self { source, element, order } }

	pub fn for_config(config:&AcquisitionConfig) -> Result<Self> {
		let element = config.element_type()
			.ok_or_else(|| Error::Config(format!("{} bytes per sample is not supported", config.bytes_per_sample)))?;
		Ok(Self::new(config.channel, element, config.encoding.byte_order()))
	}

	pub fn fetch<L: Link>(&self, session:&mut Session<L>, record_length:usize, frame_count:usize) -> Result<RawWaveform> {
		if record_length == 0 || frame_count == 0 {
			return Err(Error::Config(format!("cannot fetch {} frames of {} points", frame_count, record_length)));
		}

		session.write(&format!("DATA:SOURCE {}", self.source))?;
		let samples = session.query_binary("CURVE?", self.element, self.order)?;
		debug!("received {} samples for {} frames of {} points", samples.len(), frame_count, record_length);

		RawWaveform::new(samples, record_length, frame_count)
	}

}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn length_must_match_exactly() {
		assert!(RawWaveform::new(vec![0; 4000], 2000, 2).is_ok());

		for n in &[0usize, 1999, 3999, 4001, 6000] {
			match RawWaveform::new(vec![0; *n], 2000, 2) {
				Err(Error::BufferLengthMismatch { actual, expected }) => {
					assert_eq!(actual, *n);
					assert_eq!(expected, 4000);
				},
				other => panic!("{} samples gave {:?}", n, other),
			}
		}
	}

	#[test]
	fn zero_shapes_are_rejected() {
		assert!(RawWaveform::new(vec![], 0, 1).is_err());
		assert!(RawWaveform::new(vec![], 1, 0).is_err());
	}

	#[test]
	fn frames_partition_the_record() {
		for &(record_length, frame_count) in &[(1usize, 1usize), (1, 7), (5, 1), (3, 4), (2000, 2)] {
			let samples:Vec<i16> = (0..record_length * frame_count).map(|i| (i % 251) as i16 - 125).collect();
			let raw = RawWaveform::new(samples.clone(), record_length, frame_count).unwrap();

			let frames:Vec<Frame> = raw.frames().collect();
			assert_eq!(frames.len(), frame_count);
			assert!(frames.iter().enumerate().all(|(i, f)| f.index == i && f.samples.len() == record_length));

			let joined:Vec<i16> = frames.iter().flat_map(|f| f.samples.iter().copied()).collect();
			assert_eq!(joined, samples);
		}
	}

	#[test]
	fn frame_lookup() {
		let raw = RawWaveform::new(vec![1, 2, 3, 4, 5, 6], 3, 2).unwrap();
		assert_eq!(raw.frame(1).unwrap().samples, &[4, 5, 6]);
		assert!(raw.frame(2).is_none());
	}
}
