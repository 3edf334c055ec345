// Protocol module - THE WIRE FORMAT
// Command frames understood by the playback firmware and their byte encoding

mod codec;
mod command;

pub use codec::{decode_time, encode_time, opcode, CodecError, ProtocolCodec, RECORD_LEN};
pub use command::Command;
