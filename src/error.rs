use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

// Stage of an acquisition cycle, used to tell the caller where things went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
	IdentityCheck,
	Configuration,
	Arming,
	Polling,
	Stopping,
	Transfer,
}

impl fmt::Display for Stage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Stage::IdentityCheck => "identity check",
			Stage::Configuration => "configuration write",
			Stage::Arming        => "arming",
			Stage::Polling       => "polling",
			Stage::Stopping      => "stopping",
			Stage::Transfer      => "transfer",
		};
		f.write_str(name)
	}
}

#[derive(Error, Debug)]
pub enum Error {
	#[error("unable to open link to {address}: {reason}")]
	Connection { address: String, reason: String },
	#[error("unsupported device: expected identity starting with {expected:?}, got {actual:?}")]
	UnsupportedDevice { expected: String, actual: String },
	#[error("protocol error in response to {command:?}: {reason}")]
	Protocol { command: String, reason: String },
	#[error("no response to {command:?} within {timeout:?}")]
	Timeout { command: String, timeout: Duration },
	#[error("acquisition did not complete within {0:?}")]
	AcquisitionTimeout(Duration),
	#[error("buffer length mismatch: received {actual} samples, expected {expected}")]
	BufferLengthMismatch { actual: usize, expected: usize },
	#[error("{operation} is not allowed while the acquisition is {state}")]
	InvalidState { operation: &'static str, state: String },
	#[error("acquisition cancelled")]
	Cancelled,
	#[error("invalid configuration: {0}")]
	Config(String),
	#[error("{stage} failed: {source}")]
	Stage { stage: Stage, #[source] source: Box<Error> },
	#[error("transport error: {0}")]
	Io(#[from] io::Error),
	#[error("onc-rpc error: {0}")]
	Rpc(#[from] RpcError),
	#[error("vxi11 device error: {0}")]
	Device(#[from] DeviceError),
	#[error("settings file: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	pub fn protocol<C: Into<String>, R: Into<String>>(command: C, reason: R) -> Self {
		Error::Protocol { command: command.into(), reason: reason.into() }
	}

	// Wrap an error with the stage it happened in, unless it already carries one
	pub fn at(self, stage: Stage) -> Self {
		match self {
			e @ Error::Stage { .. } => e,
			e => Error::Stage { stage, source: Box::new(e) },
		}
	}

	pub fn stage(&self) -> Option<Stage> {
		match self {
			Error::Stage { stage, .. } => Some(*stage),
			_ => None,
		}
	}

	// The error with any stage tag peeled off
	pub fn root(&self) -> &Error {
		match self {
			Error::Stage { source, .. } => source.root(),
			e => e,
		}
	}

	pub fn is_timeout(&self) -> bool {
		match self.root() {
			Error::Timeout { .. } | Error::Device(DeviceError::IoTimeout) => true,
			Error::Io(e) => e.kind() == io::ErrorKind::TimedOut || e.kind() == io::ErrorKind::WouldBlock,
			_ => false,
		}
	}

	// Errors after which the link's framing can't be trusted anymore
	pub fn poisons_link(&self) -> bool {
		matches!(self.root(), Error::Protocol { .. } | Error::Rpc(_))
	}
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
	#[error("expected a REPLY message")]
	NotAReply,
	#[error("message denied due to RPC_MISMATCH (supported versions {low}..={high})")]
	RpcMismatch { low: u32, high: u32 },
	#[error("message denied due to AUTH_ERROR ({0})")]
	AuthError(u32),
	#[error("message denied for an unknown reason")]
	Denied,
	#[error("program unavailable")]
	ProgramUnavailable,
	#[error("program mismatch (supported versions {low}..={high})")]
	ProgramMismatch { low: u32, high: u32 },
	#[error("procedure unavailable")]
	ProcedureUnavailable,
	#[error("garbage args")]
	GarbageArgs,
	#[error("call failed with accept status {0}")]
	AcceptStatus(i32),
	#[error("reply xid {received} is newer than the last call {sent}")]
	XidFromTheFuture { sent: u32, received: u32 },
	#[error("xdr buffer underrun: needed {needed} bytes, {available} left")]
	Underrun { needed: usize, available: usize },
	#[error("expected an xdr bool, got {0}")]
	InvalidBool(i32),
	#[error("{0} bytes left over after unpacking the reply")]
	TrailingData(usize),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
	#[error("syntax error")]
	Syntax,
	#[error("device not accessible")]
	NotAccessible,
	#[error("invalid link identifier")]
	InvalidLink,
	#[error("parameter error")]
	Parameter,
	#[error("channel not established")]
	ChannelNotEstablished,
	#[error("operation not supported")]
	NotSupported,
	#[error("out of resources")]
	OutOfResources,
	#[error("device locked by another link")]
	Locked,
	#[error("no lock held by this link")]
	NoLockHeld,
	#[error("I/O timeout")]
	IoTimeout,
	#[error("I/O error")]
	Io,
	#[error("invalid address")]
	InvalidAddress,
	#[error("abort")]
	Abort,
	#[error("channel already established")]
	ChannelAlreadyEstablished,
	#[error("unknown device error code {0}")]
	Unknown(i32),
}

impl DeviceError {
	// Returns None for code 0, which is success
	pub fn from_code(code: i32) -> Option<Self> {
		let e = match code {
			0  => return None,
			1  => DeviceError::Syntax,
			3  => DeviceError::NotAccessible,
			4  => DeviceError::InvalidLink,
			5  => DeviceError::Parameter,
			6  => DeviceError::ChannelNotEstablished,
			8  => DeviceError::NotSupported,
			9  => DeviceError::OutOfResources,
			11 => DeviceError::Locked,
			12 => DeviceError::NoLockHeld,
			15 => DeviceError::IoTimeout,
			17 => DeviceError::Io,
			21 => DeviceError::InvalidAddress,
			23 => DeviceError::Abort,
			29 => DeviceError::ChannelAlreadyEstablished,
			x  => DeviceError::Unknown(x),
		};
		Some(e)
	}
}
