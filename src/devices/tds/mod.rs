// Tektronix TDS series oscilloscopes: session, acquisition state machine, curve transfer and scaling

use std::thread;

use log::info;

use crate::error::Result;
use crate::link::Link;
use crate::vxi11::CoreClient;

pub mod acquisition;
pub mod clock;
pub mod command_log;
pub mod config;
pub mod scaling;
pub mod session;
pub mod waveform;

pub use acquisition::{Acquisition, AcquisitionController, AcquisitionState};
pub use clock::{CancelToken, Clock, ManualClock, SystemClock};
pub use command_log::{CommandKind, CommandLog, CommandLogEntry};
pub use config::{AcquisitionConfig, Channel, Completion, ControllerConfig, LinkConfig, ScalingLaw, Settings};
pub use scaling::{scale, Sample, ScaledWaveform, WaveformPreamble};
pub use session::{InstrumentIdentity, Session};
pub use waveform::{Frame, RawWaveform, WaveformFetcher};

// Connects and checks the identity before anything else is sent
pub fn open(address:&str, settings:&Settings) -> Result<(Session<CoreClient>, InstrumentIdentity)> {
	let mut session = Session::connect(address, &settings.link)?;
	let identity = session.assert_model(&settings.expected_model)?;
	Ok((session, identity))
}

// One full cycle on a verified session
pub fn acquire<L: Link>(session:&mut Session<L>, settings:&Settings) -> Result<Acquisition> {
	AcquisitionController::new(session, settings.acquisition.clone(), settings.controller)?.acquire()
}

// Runs a cycle on a worker thread so the caller stays responsive.  The session comes back with the result
// either way; cancelling the token stops the poll loop at its next iteration.
pub fn acquire_in_background<L>(mut session:Session<L>, settings:Settings, cancel:CancelToken) -> thread::JoinHandle<(Session<L>, Result<Acquisition>)>
	where L: Link + Send + 'static
{
	thread::spawn(move || {
		let result = AcquisitionController::new(&mut session, settings.acquisition.clone(), settings.controller)
			.and_then(|controller| controller.with_cancel(cancel).acquire());
		if let Err(e) = &result {
			info!("background acquisition ended: {}", e);
		}
		(session, result)
	})
}
