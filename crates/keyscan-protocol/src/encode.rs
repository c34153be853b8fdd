//! Direct-to-buffer command encoding.
//!
//! Clients only ever send arrays of bulk strings, so this writes that one
//! shape straight into a `BytesMut` without building intermediate frames.

use bytes::{BufMut, Bytes, BytesMut};

/// Encodes one command (`args[0]` is the command name) as a RESP array
/// of bulk strings.
pub fn encode_command(args: &[Bytes], dst: &mut BytesMut) {
    dst.put_u8(b'*');
    write_len(args.len(), dst);
    for arg in args {
        dst.put_u8(b'$');
        write_len(arg.len(), dst);
        dst.put_slice(arg);
        dst.put_slice(b"\r\n");
    }
}

/// Encodes several commands back to back so they can be written in a
/// single round trip.
pub fn encode_pipeline(commands: &[Vec<Bytes>], dst: &mut BytesMut) {
    for args in commands {
        encode_command(args, dst);
    }
}

fn write_len(len: usize, dst: &mut BytesMut) {
    let mut buf = itoa::Buffer::new();
    dst.put_slice(buf.format(len).as_bytes());
    dst.put_slice(b"\r\n");
}
