// Device core
pub const DEVICE_CORE_PROG:u32  = 0x0607af;
pub const DEVICE_CORE_VERS:u32  = 1;
pub const CREATE_LINK:u32       = 10;
pub const DEVICE_WRITE:u32      = 11;
pub const DEVICE_READ:u32       = 12;
pub const DEVICE_READSTB:u32    = 13;
pub const DEVICE_TRIGGER:u32    = 14;
pub const DEVICE_CLEAR:u32      = 15;
pub const DEVICE_REMOTE:u32     = 16;
pub const DEVICE_LOCAL:u32      = 17;
pub const DEVICE_LOCK:u32       = 18;
pub const DEVICE_UNLOCK:u32     = 19;
pub const DEVICE_ENABLE_SRQ:u32 = 20;
pub const DEVICE_DOCMD:u32      = 22;
pub const DESTROY_LINK:u32      = 23;

pub const CLIENT_ID:i32 = 3333;
pub const DEFAULT_LOCK_TIMEOUT_MS:u32 = 10000;

pub const OPERATION_FLAGS_END_ONLY:i32 = 8;

// Reason bits in a device_read reply
pub const REASON_REQCNT:i32 = 1;
pub const REASON_CHR:i32    = 2;
pub const REASON_END:i32    = 4;

// Extra time given to the socket on top of the VXI-11 I/O timeout, so the instrument gets to report the timeout itself
const SOCKET_TIMEOUT_MARGIN:Duration = Duration::from_secs(1);

use std::time::Duration;

use log::{debug, info, warn};

use crate::error::{DeviceError, Error, Result};
use crate::link::{Link, ResourceAddress};
use crate::rpc::port_mapping::{self, Mapping, Protocol, TcpPortMapperClient};
use crate::rpc::tcp_clients::TcpClient;

pub mod xdr_pack;

fn check(error:i32) -> Result<()> {
	match DeviceError::from_code(error) {
		None    => Ok(()),
		Some(e) => Err(e.into()),
	}
}

fn millis(d:Duration) -> u32 { d.as_millis().min(u32::MAX as u128) as u32 }

fn core_mapping() -> Mapping {
	Mapping { program: DEVICE_CORE_PROG, version: DEVICE_CORE_VERS, protocol: Protocol::TCP, port: 0 }
}

// Broadcasts on the local network for anything serving the VXI-11 core program
pub fn discover(timeout:Duration) -> Result<Vec<ResourceAddress>> {
	let found = port_mapping::broadcast_get_port(&core_mapping(), timeout)?;
	Ok(found.into_iter().map(|(ip, _)| ResourceAddress::new(&ip.to_string())).collect())
}

#[derive(Debug, Clone, Copy)]
pub struct DeviceLink {
	pub link_id: i32,
	pub abort_port: u32,
	pub max_recv_size: u32,
}

pub struct CoreClient {
	host: String,
	client: TcpClient,
	opt_link: Option<DeviceLink>,
	io_timeout: Duration,
	lock_timeout: Duration,
	write_termination: String,
}

impl CoreClient {

	fn get_link(&self) -> Result<DeviceLink> {
		self.opt_link.ok_or_else(|| Error::Connection { address: self.host.clone(), reason: "no link".to_owned() })
	}

	pub fn new(host:&str, io_timeout:Duration) -> Result<Self> {
		let unreachable = |e:Error| Error::Connection { address: host.to_owned(), reason: e.to_string() };

		// Find the port to use for the core program
		let mut pmap_client = TcpPortMapperClient::new(host, io_timeout).map_err(unreachable)?;
		let port = pmap_client.get_port(&core_mapping()).map_err(unreachable)?;
		if port == 0 {
			return Err(Error::Connection { address: host.to_owned(), reason: "no VXI-11 core service registered with the port mapper".to_owned() });
		}

		let client = TcpClient::connect((host, port as u16), DEVICE_CORE_PROG, DEVICE_CORE_VERS, io_timeout + SOCKET_TIMEOUT_MARGIN)
			.map_err(unreachable)?;

		Ok(Self::with_client(host, client, io_timeout))
	}

	// Wraps an RPC client that's already connected to the core program
	pub fn with_client(host:&str, client:TcpClient, io_timeout:Duration) -> Self {
		CoreClient { host: host.to_owned(), client, opt_link: None, io_timeout, lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS as u64), write_termination: "\n".to_owned() }
	}

	// Port mapper lookup, connection and link creation in one go
	pub fn open(address:&ResourceAddress, io_timeout:Duration) -> Result<Self> {
		let mut core = Self::new(&address.host, io_timeout)?;
		core.create_link(&address.device)
			.map_err(|e| Error::Connection { address: address.to_string(), reason: e.to_string() })?;
		info!("opened link to {}", address);
		Ok(core)
	}

	pub fn set_write_termination(&mut self, termination:&str) { self.write_termination = termination.to_owned(); }

	pub fn create_link(&mut self, device:&str) -> Result<()> {
		if self.opt_link.is_some() {
			return Err(Error::Connection { address: self.host.clone(), reason: "already connected to a link".to_owned() });
		}

		self.client.start_call(CREATE_LINK)?;
		xdr_pack::pack_create_link_parms(&mut self.client.packer, CLIENT_ID, false, millis(self.lock_timeout), device)?;
		self.client.do_call()?;

		let error:i32         = self.client.unpacker.unpack_i32()?;
		let link_id:i32       = self.client.unpacker.unpack_i32()?;
		let abort_port:u32    = self.client.unpacker.unpack_u32()?;
		let max_recv_size:u32 = self.client.unpacker.unpack_u32()?;
		check(error)?;

		debug!("link {} created on {} (max_recv_size={})", link_id, device, max_recv_size);
		self.opt_link = Some(DeviceLink { link_id, abort_port, max_recv_size });
		Ok(())
	}

	// Splits the message into chunks the instrument can take and only flags END on the last one
	pub fn write(&mut self, data:&[u8]) -> Result<()> {
		let link = self.get_link()?;
		let chunk_len = if link.max_recv_size == 0 { data.len().max(1) } else { link.max_recv_size as usize };

		let mut chunks = data.chunks(chunk_len).peekable();
		while let Some(chunk) = chunks.next() {
			let flags = if chunks.peek().is_none() { OPERATION_FLAGS_END_ONLY } else { 0 };

			self.client.start_call(DEVICE_WRITE)?;
			xdr_pack::pack_device_write_parms(&mut self.client.packer, link.link_id, millis(self.io_timeout), millis(self.lock_timeout), flags, chunk)?;
			self.client.do_call()?;

			let error:i32 = self.client.unpacker.unpack_i32()?;
			let size:u32  = self.client.unpacker.unpack_u32()?;
			check(error)?;

			if size as usize != chunk.len() {
				return Err(Error::protocol(String::from_utf8_lossy(data), format!("instrument accepted {} of {} bytes", size, chunk.len())));
			}
		}

		Ok(())
	}

	// Keeps reading until the instrument flags the end of the message
	pub fn read(&mut self) -> Result<Vec<u8>> {
		let link = self.get_link()?;
		let mut ans:Vec<u8> = vec![];

		loop {
			self.client.start_call(DEVICE_READ)?;
			xdr_pack::pack_device_read_parms(&mut self.client.packer, link.link_id, u32::MAX, millis(self.io_timeout), millis(self.lock_timeout), 0, 0)?;
			self.client.do_call()?;

			let error:i32    = self.client.unpacker.unpack_i32()?;
			let reason:i32   = self.client.unpacker.unpack_i32()?;
			let data:Vec<u8> = self.client.unpacker.unpack_variable_len_opaque()?;
			check(error)?;

			ans.extend_from_slice(&data);
			if reason & REASON_END != 0 {
				return Ok(ans);
			}
			if reason & (REASON_REQCNT | REASON_CHR) == 0 {
				return Err(Error::protocol("device_read", format!("unexpected reason bits {:#x}", reason)));
			}
		}
	}

	pub fn clear(&mut self) -> Result<()> {
		let link = self.get_link()?;
		self.client.start_call(DEVICE_CLEAR)?;
		xdr_pack::pack_device_generic_parms(&mut self.client.packer, link.link_id, 0, millis(self.lock_timeout), millis(self.io_timeout))?;
		self.client.do_call()?;
		check(self.client.unpacker.unpack_i32()?)
	}

	pub fn destroy_link(&mut self) -> Result<()> {
		let link = match self.opt_link.take() {
			Some(link) => link,
			None => return Ok(()),
		};

		self.client.start_call(DESTROY_LINK)?;
		self.client.packer.pack_i32(link.link_id)?;
		self.client.do_call()?;
		check(self.client.unpacker.unpack_i32()?)
	}

}

impl Link for CoreClient {
	fn write_bytes(&mut self, data:&[u8]) -> Result<()> { self.write(data) }
	fn read_bytes(&mut self) -> Result<Vec<u8>>         { self.read() }

	fn timeout(&self) -> Duration { self.io_timeout }

	fn set_timeout(&mut self, timeout:Duration) -> Result<()> {
		self.client.set_timeout(timeout + SOCKET_TIMEOUT_MARGIN)?;
		self.io_timeout = timeout;
		Ok(())
	}

	fn close(&mut self) -> Result<()> { self.destroy_link() }

	fn write_termination(&self) -> &str { &self.write_termination }
}

impl Drop for CoreClient {

	fn drop(&mut self) {
		if let Err(e) = self.destroy_link() {
			warn!("unable to destroy link to {}: {}", self.host, e);
		}
	}

}
