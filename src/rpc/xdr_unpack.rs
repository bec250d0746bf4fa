use crate::error::{Result, RpcError};
use crate::xdr::Unpacker;
use crate::rpc::{REPLY, MSG_DENIED, RPC_MISMATCH, AUTH_ERROR, MSG_ACCEPTED, PROG_UNAVAIL, PROG_MISMATCH, PROC_UNAVAIL, GARBAGE_ARGS, SUCCESS};

pub fn unpack_auth(unpacker:&mut Unpacker) -> Result<(i32, Vec<u8>)> {
	let flavor:i32    = unpacker.unpack_enum()?;
	let stuff:Vec<u8> = unpacker.unpack_variable_len_opaque()?;
	Ok((flavor, stuff))
}

// Returns the xid; on success the unpacker is left at the start of the procedure's results
pub fn unpack_replyheader(unpacker:&mut Unpacker) -> Result<u32> {
	let xid:u32 = unpacker.unpack_u32()?;

	if unpacker.unpack_enum()? != REPLY { return Err(RpcError::NotAReply.into()); }

	match unpacker.unpack_enum()? {
		MSG_DENIED => {
			let err = match unpacker.unpack_enum()? {
				RPC_MISMATCH => RpcError::RpcMismatch { low: unpacker.unpack_u32()?, high: unpacker.unpack_u32()? },
				AUTH_ERROR   => RpcError::AuthError(unpacker.unpack_u32()?),
				_            => RpcError::Denied,
			};
			return Err(err.into());
		},
		MSG_ACCEPTED => { },
		_            => return Err(RpcError::Denied.into()),
	}

	unpack_auth(unpacker)?;

	match unpacker.unpack_enum()? {
		SUCCESS       => Ok(xid),
		PROG_UNAVAIL  => Err(RpcError::ProgramUnavailable.into()),
		PROG_MISMATCH => Err(RpcError::ProgramMismatch { low: unpacker.unpack_u32()?, high: unpacker.unpack_u32()? }.into()),
		PROC_UNAVAIL  => Err(RpcError::ProcedureUnavailable.into()),
		GARBAGE_ARGS  => Err(RpcError::GarbageArgs.into()),
		x             => Err(RpcError::AcceptStatus(x).into()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::Error;
	use crate::xdr::Packer;

	fn reply(accept_stat:i32) -> Vec<u8> {
		let mut p = Packer::new();
		p.pack_u32(77).unwrap();
		p.pack_enum(REPLY).unwrap();
		p.pack_enum(MSG_ACCEPTED).unwrap();
		p.pack_enum(0).unwrap();
		p.pack_variable_len_opaque(&[]).unwrap();
		p.pack_enum(accept_stat).unwrap();
		p.as_bytes().to_vec()
	}

	#[test]
	fn accepted_reply_yields_xid() {
		let mut u = Unpacker::new();
		u.reset(&reply(SUCCESS));
		assert_eq!(unpack_replyheader(&mut u).unwrap(), 77);
		assert!(u.all_data_consumed());
	}

	#[test]
	fn program_unavailable_is_reported() {
		let mut u = Unpacker::new();
		u.reset(&reply(PROG_UNAVAIL));
		match unpack_replyheader(&mut u) {
			Err(Error::Rpc(RpcError::ProgramUnavailable)) => {},
			other => panic!("unexpected {:?}", other),
		}
	}
}
