use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use byteorder::{BigEndian, WriteBytesExt, ReadBytesExt};
use log::debug;

use crate::error::{Error, Result, RpcError};
use crate::xdr;
use super::{initial_xid, is_stale_xid, xdr_pack, xdr_unpack};

const LAST_FRAGMENT:u32 = 0x8000_0000;

// ONC-RPC over TCP with record marking.  Owns its own packer and unpacker: a call is started with `start_call`,
// arguments are packed into `packer`, then `do_call` sends it and leaves the results in `unpacker`
pub struct TcpClient {
	stream: TcpStream,
	pub prog: u32,
	pub vers: u32,
	pub lastxid: u32,
	pub packer: xdr::Packer,
	pub unpacker: xdr::Unpacker,
}

impl TcpClient {

	pub fn connect<A: ToSocketAddrs>(addr: A, prog: u32, vers: u32, timeout: Duration) -> Result<Self> {
		let mut last_err:Option<std::io::Error> = None;
		for sock_addr in addr.to_socket_addrs()? {
			match TcpStream::connect_timeout(&sock_addr, timeout) {
				Ok(stream) => {
					stream.set_nodelay(true)?;
					let mut client = Self{ stream, prog, vers, lastxid: initial_xid(), packer: xdr::Packer::new(), unpacker: xdr::Unpacker::new() };
					client.set_timeout(timeout)?;
					return Ok(client);
				},
				Err(e) => last_err = Some(e),
			}
		}

		Err(last_err.map(Error::Io).unwrap_or_else(|| Error::Io(std::io::ErrorKind::AddrNotAvailable.into())))
	}

	pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
		// A zero duration means "block forever" to the socket API, which is never what we want here
		let timeout = if timeout == Duration::from_secs(0) { Duration::from_millis(1) } else { timeout };
		self.stream.set_read_timeout(Some(timeout))?;
		self.stream.set_write_timeout(Some(timeout))?;
		Ok(())
	}

	pub fn start_call(&mut self, prc:u32) -> Result<()> {
		self.lastxid = self.lastxid.wrapping_add(1);
		self.packer.reset();
		xdr_pack::pack_callheader_no_auth(&mut self.packer, self.lastxid, self.prog, self.vers, prc)
	}

	pub fn do_call(&mut self) -> Result<()> {
		let call:&[u8] = self.packer.as_bytes();
		if !call.is_empty() {
			let mut send_bytes:Vec<u8> = Vec::with_capacity(call.len() + 4);
			send_bytes.write_u32::<BigEndian>(call.len() as u32 | LAST_FRAGMENT)?;
			send_bytes.extend_from_slice(call);
			self.stream.write_all(&send_bytes)?;
		}

		loop {
			let reply = self.read_record()?;
			self.unpacker.reset(&reply);

			let xid = xdr_unpack::unpack_replyheader(&mut self.unpacker)?;
			if xid == self.lastxid {
				return Ok(());
			} else if is_stale_xid(xid, self.lastxid) {
				debug!("discarding stale rpc reply xid={} (expecting {})", xid, self.lastxid);
				continue;
			} else {
				return Err(RpcError::XidFromTheFuture { sent: self.lastxid, received: xid }.into());
			}
		}
	}

	fn read_record(&mut self) -> Result<Vec<u8>> {
		let mut reply:Vec<u8> = vec![];

		let mut last:bool = false;
		while !last {
			let x:u32 = self.stream.read_u32::<BigEndian>()?;

			last = (x & LAST_FRAGMENT) != 0;
			let n = (x & !LAST_FRAGMENT) as usize;

			let start = reply.len();
			reply.resize(start + n, 0);
			self.stream.read_exact(&mut reply[start..])?;
		}

		Ok(reply)
	}

}


#[cfg(test)]
mod tests {
	use super::*;
	use super::loopback::{accepted, record, serve};

	const PROG:u32 = 0x0607af;

	fn client(addr:std::net::SocketAddr) -> TcpClient {
		TcpClient::connect(addr, PROG, 1, Duration::from_secs(5)).unwrap()
	}

	#[test]
	fn reply_split_across_fragments() {
		let (addr, server) = serve(1, |call| {
			let body = accepted(call.xid, |p| { p.pack_u32(42).unwrap(); p.pack_u32(7).unwrap(); });
			record(&body, &[10, 27])
		});

		let mut c = client(addr);
		c.start_call(11).unwrap();
		c.packer.pack_u32(1).unwrap();
		c.do_call().unwrap();

		assert_eq!(c.unpacker.unpack_u32().unwrap(), 42);
		assert_eq!(c.unpacker.unpack_u32().unwrap(), 7);
		assert!(c.unpacker.all_data_consumed());
		server.join().unwrap();
	}

	#[test]
	fn stale_reply_is_skipped() {
		let (addr, server) = serve(1, |call| {
			let mut ans = record(&accepted(call.xid.wrapping_sub(1), |p| p.pack_u32(1).unwrap()), &[]);
			ans.extend(record(&accepted(call.xid, |p| p.pack_u32(2).unwrap()), &[]));
			ans
		});

		let mut c = client(addr);
		c.start_call(11).unwrap();
		c.do_call().unwrap();
		assert_eq!(c.unpacker.unpack_u32().unwrap(), 2);
		server.join().unwrap();
	}

	#[test]
	fn reply_from_the_future_is_an_error() {
		let (addr, server) = serve(1, |call| record(&accepted(call.xid.wrapping_add(5), |_| {}), &[]));

		let mut c = client(addr);
		c.start_call(11).unwrap();
		match c.do_call() {
			Err(Error::Rpc(RpcError::XidFromTheFuture { sent, received })) => assert_eq!(received, sent.wrapping_add(5)),
			other => panic!("unexpected {:?}", other),
		}
		server.join().unwrap();
	}

	#[test]
	fn call_carries_procedure_and_arguments() {
		let (tx, rx) = std::sync::mpsc::channel();
		let (addr, server) = serve(1, move |mut call| {
			tx.send((call.prc, call.args.unpack_u32().unwrap())).unwrap();
			record(&accepted(call.xid, |_| {}), &[])
		});

		let mut c = client(addr);
		c.start_call(23).unwrap();
		c.packer.pack_u32(99).unwrap();
		c.do_call().unwrap();

		assert_eq!(rx.recv().unwrap(), (23, 99));
		server.join().unwrap();
	}
}
