use std::process;
use std::time::Duration;

use clap::Parser;
use log::{error, info};
use serde::Serialize;

use tds_acquire::devices::tds::{self, InstrumentIdentity, ScaledWaveform, Settings, WaveformPreamble};
use tds_acquire::vxi11;

/// Acquire fast frame waveforms from a Tektronix TDS oscilloscope over VXI-11
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
	/// Instrument address, either TCPIP::<host>[::<device>]::INSTR or a bare host
	#[arg(short, long, default_value = "TCPIP::192.168.0.106::INSTR")]
	address: String,

	/// JSON settings file; anything left out keeps its default
	#[arg(short, long)]
	config: Option<String>,

	/// Override the number of fast frames
	#[arg(short, long)]
	frames: Option<usize>,

	/// Broadcast for instruments on the local network and exit
	#[arg(short, long)]
	list: bool,

	/// Print the scaled frames as JSON instead of a summary
	#[arg(long)]
	json: bool,

	/// Print every command that was sent
	#[arg(short, long)]
	verbose: bool,
}

#[derive(Serialize)]
struct Report<'a> {
	identity: &'a InstrumentIdentity,
	preamble: &'a WaveformPreamble,
	frames: &'a [ScaledWaveform],
}

fn list() -> tds_acquire::Result<()> {
	let found = vxi11::discover(Duration::from_secs(1))?;
	if found.is_empty() {
		println!("No VXI-11 instruments answered");
	}
	for address in found {
		println!("{}", address);
	}
	Ok(())
}

fn settings(args:&Args) -> tds_acquire::Result<Settings> {
	let mut settings = match &args.config {
		Some(path) => Settings::from_file(path)?,
		None => Settings::default(),
	};
	if let Some(n) = args.frames {
		settings.acquisition.frame_count = n;
		settings.validate()?;
	}
	Ok(settings)
}

fn run(args:&Args) -> tds_acquire::Result<()> {
	let settings = settings(args)?;
	let (mut session, identity) = tds::open(&args.address, &settings)?;
	info!("{} {} (serial {}, firmware {})", identity.manufacturer, identity.model, identity.serial_num, identity.fw_version);

	let result = tds::acquire(&mut session, &settings);
	if args.verbose {
		eprintln!("Commands sent:\n{}", session.command_log());
	}
	let acq = result?;
	let frames = acq.scaled(settings.scaling);

	if args.json {
		let report = Report { identity: &identity, preamble: &acq.preamble, frames: &frames };
		println!("{}", serde_json::to_string_pretty(&report)?);
	} else {
		println!("{}", identity.raw);
		for frame in &frames {
			let (lo, hi) = frame.amplitudes().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), a| (lo.min(a), hi.max(a)));
			let t0 = frame.points.first().map(|p| p.time).unwrap_or_default();
			let t1 = frame.points.last().map(|p| p.time).unwrap_or_default();
			println!("frame {}: {} points, t = {:.3e}..{:.3e} s, v = {:.4}..{:.4} V", frame.frame, frame.len(), t0, t1, lo, hi);
		}
	}

	session.close()
}

fn main() {
	env_logger::init();
	let args = Args::parse();

	let result = if args.list { list() } else { run(&args) };
	if let Err(e) = result {
		error!("{}", e);
		eprintln!("Error: {}", e);
		process::exit(1);
	}
}
