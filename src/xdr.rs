use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

use crate::error::{Result, RpcError};

fn padding(n: usize) -> usize { (4 - n % 4) % 4 }

#[derive(Default)]
pub struct Packer {
	buff: Vec<u8>
}

// Reads from the front of a reply buffer, tracking a read position instead of shifting the buffer
#[derive(Default)]
pub struct Unpacker {
	buff: Vec<u8>,
	pos: usize,
}

impl Packer {

	pub fn new() -> Self { Self::default() }

	pub fn reset(&mut self) { self.buff.clear(); }

	pub fn as_bytes(&self) -> &[u8] { &self.buff }

	// Everything below writes multiples of four bytes, so alignment is preserved
	pub fn pack_u32(&mut self, x: u32) -> Result<()> { Ok(self.buff.write_u32::<BigEndian>(x)?) }
	pub fn pack_i32(&mut self, x: i32) -> Result<()> { Ok(self.buff.write_i32::<BigEndian>(x)?) }

	pub fn pack_bool(&mut self, b: bool) -> Result<()> { self.pack_i32(if b { 1 } else { 0 }) }

	pub fn pack_enum(&mut self, x: i32) -> Result<()> { self.pack_i32(x) }

	pub fn pack_variable_len_opaque(&mut self, data: &[u8]) -> Result<()> {
		self.pack_u32(data.len() as u32)?;
		self.buff.extend_from_slice(data);
		self.buff.resize(self.buff.len() + padding(data.len()), 0);
		Ok(())
	}

}

impl Unpacker {

	pub fn new() -> Self { Self::default() }

	pub fn reset(&mut self, data: &[u8]) {
		self.buff.clear();
		self.buff.extend_from_slice(data);
		self.pos = 0;
	}

	pub fn remaining(&self) -> usize { self.buff.len() - self.pos }

	pub fn all_data_consumed(&self) -> bool { self.remaining() == 0 }

	pub fn remaining_bytes(&self) -> &[u8] { &self.buff[self.pos..] }

	fn take(&mut self, n: usize) -> Result<&[u8]> {
		if self.remaining() < n {
			return Err(RpcError::Underrun { needed: n, available: self.remaining() }.into());
		}
		let start = self.pos;
		self.pos += n;
		Ok(&self.buff[start..self.pos])
	}

	pub fn unpack_u32(&mut self) -> Result<u32> { Ok(BigEndian::read_u32(self.take(4)?)) }
	pub fn unpack_i32(&mut self) -> Result<i32> { Ok(BigEndian::read_i32(self.take(4)?)) }

	// Whether the value is in the enum's allowed set depends on the caller
	pub fn unpack_enum(&mut self) -> Result<i32> { self.unpack_i32() }

	pub fn unpack_bool(&mut self) -> Result<bool> {
		match self.unpack_i32()? {
			0 => Ok(false),
			1 => Ok(true),
			x => Err(RpcError::InvalidBool(x).into()),
		}
	}

	pub fn unpack_variable_len_opaque(&mut self) -> Result<Vec<u8>> {
		let n = self.unpack_u32()? as usize;
		let ans = self.take(n)?.to_vec();
		self.take(padding(n))?;
		Ok(ans)
	}

}
