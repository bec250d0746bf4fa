use std::net::{SocketAddr, UdpSocket, ToSocketAddrs};
use std::time::{Duration, Instant};

use log::debug;

use crate::error::Result;
use crate::xdr;
use super::{initial_xid, xdr_pack, xdr_unpack};

const RECV_BUFF_LEN:usize = 8092;

// Sends one call to the broadcast address and collects every reply that arrives before the timeout
pub struct BroadcastUdpClient {
	socket: UdpSocket,
	pub prog: u32,
	pub vers: u32,
	pub port: u16,
	pub lastxid: u32,
	pub packer: xdr::Packer,
	pub unpacker: xdr::Unpacker,
	recv_buff: [u8; RECV_BUFF_LEN],
}

impl BroadcastUdpClient {

	pub fn bind(port:u16, prog: u32, vers: u32) -> Result<Self> {
		let socket:UdpSocket = UdpSocket::bind("0.0.0.0:0")?;
		socket.set_broadcast(true)?;

		Ok(Self{ socket, prog, vers, port, lastxid: initial_xid(), packer: xdr::Packer::new(), unpacker: xdr::Unpacker::new(), recv_buff: [0; RECV_BUFF_LEN] })
	}

	pub fn start_call(&mut self, prc:u32) -> Result<()> {
		self.lastxid = self.lastxid.wrapping_add(1);
		self.packer.reset();
		xdr_pack::pack_callheader_no_auth(&mut self.packer, self.lastxid, self.prog, self.vers, prc)
	}

	// Returns the sender and the procedure results of every matching reply
	pub fn make_call<A: ToSocketAddrs>(&mut self, broadcast:A, timeout:Duration) -> Result<Vec<(SocketAddr, Vec<u8>)>> {
		self.socket.send_to(self.packer.as_bytes(), broadcast)?;

		let deadline = Instant::now() + timeout;
		let mut replies = vec![];
		loop {
			let now = Instant::now();
			if now >= deadline { break; }
			self.socket.set_read_timeout(Some(deadline - now))?;

			let (n, addr) = match self.socket.recv_from(&mut self.recv_buff) {
				Ok(x) => x,
				Err(_) => break,
			};

			self.unpacker.reset(&self.recv_buff[0..n]);
			match xdr_unpack::unpack_replyheader(&mut self.unpacker) {
				Ok(xid) if xid == self.lastxid => replies.push((addr, self.unpacker.remaining_bytes().to_vec())),
				Ok(xid) => debug!("ignoring reply from {} with xid {}", addr, xid),
				Err(e) => debug!("ignoring malformed reply from {}: {}", addr, e),
			}
		}

		Ok(replies)
	}

}
