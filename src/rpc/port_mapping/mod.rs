pub const PMAP_PROG:u32 = 100000;
pub const PMAP_VERS:u32 = 2;
pub const PMAP_PORT:u16 = 111;

pub const PMAPPROC_NULL:u32    = 0;     // (void) -> void
pub const PMAPPROC_SET:u32     = 1;     // (mapping) -> bool
pub const PMAPPROC_UNSET:u32   = 2;     // (mapping) -> bool
pub const PMAPPROC_GETPORT:u32 = 3;     // (mapping) -> unsigned int
pub const PMAPPROC_DUMP:u32    = 4;     // (void) -> pmaplist
pub const PMAPPROC_CALLIT:u32  = 5;     // (call_args) -> call_result

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::error::{Result, RpcError};
use crate::xdr::{Packer, Unpacker};

use super::{IPPROTO_TCP, IPPROTO_UDP};
use super::xdr_pack;
use super::tcp_clients::TcpClient;
use super::udp_clients::BroadcastUdpClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
	TCP,
	UDP,
}

impl Protocol {
	pub fn to_u32(&self) -> u32 { match self {
		Protocol::TCP => IPPROTO_TCP,
		Protocol::UDP => IPPROTO_UDP,
	}}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
	pub program: u32,
	pub version: u32,
	pub protocol: Protocol,
	pub port: u32,				// XDR encodes ports as u32 for alignment
}

impl Mapping {
	pub fn pack(&self, packer:&mut Packer) -> Result<()> {
		xdr_pack::pack_mapping(packer, self.program, self.version, self.protocol.to_u32(), self.port)
	}
}

fn unpack_port(unpacker:&mut Unpacker) -> Result<u32> {
	let ans:u32 = unpacker.unpack_u32()?;

	if unpacker.all_data_consumed() { Ok(ans) }
	else { Err(RpcError::TrailingData(unpacker.remaining()).into()) }
}

pub struct TcpPortMapperClient {
	pub host: String,
	tcp_client: TcpClient,
}

impl TcpPortMapperClient {

	pub fn new(host:&str, timeout:Duration) -> Result<Self> {
		let tcp_client = TcpClient::connect((host, PMAP_PORT), PMAP_PROG, PMAP_VERS, timeout)?;
		Ok(Self{ host: host.to_owned(), tcp_client })
	}

	// A port of zero means the program isn't registered on this host
	pub fn get_port(&mut self, m:&Mapping) -> Result<u32> {
		self.tcp_client.start_call(PMAPPROC_GETPORT)?;
		m.pack(&mut self.tcp_client.packer)?;
		self.tcp_client.do_call()?;
		unpack_port(&mut self.tcp_client.unpacker)
	}

}

// Broadcasts GETPORT for `m` and returns every host that has it registered, along with the port
pub fn broadcast_get_port(m:&Mapping, timeout:Duration) -> Result<Vec<(IpAddr, u16)>> {
	let mut client = BroadcastUdpClient::bind(PMAP_PORT, PMAP_PROG, PMAP_VERS)?;
	client.start_call(PMAPPROC_GETPORT)?;
	m.pack(&mut client.packer)?;

	let mut ans = vec![];
	for (addr, results) in client.make_call(SocketAddr::from(([255, 255, 255, 255], PMAP_PORT)), timeout)? {
		let mut unpacker = Unpacker::new();
		unpacker.reset(&results);
		match unpack_port(&mut unpacker) {
			Ok(0) => {},
			Ok(port) => ans.push((addr.ip(), port as u16)),
			Err(e) => log::debug!("bad GETPORT reply from {}: {}", addr, e),
		}
	}

	ans.sort();
	ans.dedup();
	Ok(ans)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn port_reply_must_be_exactly_one_word() {
		let mut u = Unpacker::new();
		u.reset(&[0, 0, 0x03, 0xff]);
		assert_eq!(unpack_port(&mut u).unwrap(), 1023);

		u.reset(&[0, 0, 0x03, 0xff, 0, 0, 0, 0]);
		assert!(unpack_port(&mut u).is_err());
	}
}
