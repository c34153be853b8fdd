//! Incremental RESP reply parser.
//!
//! Works on whatever has been read off the socket so far. The parser is
//! purely synchronous: it either returns a complete frame plus the number
//! of bytes it consumed, or `Ok(None)` so the caller can read more and
//! try again from the same position.
//!
//! Replies are parsed in a single pass with a `Cursor<&[u8]>`; nothing in
//! the buffer is consumed until a whole frame is available.

use std::io::Cursor;

use bytes::Bytes;

use crate::error::ProtocolError;
use crate::types::Frame;

/// Maximum nesting depth for arrays and maps. SCAN replies nest two deep;
/// anything close to this limit is a broken or hostile peer.
const MAX_NESTING_DEPTH: usize = 32;

/// Maximum length of a bulk string in bytes (512 MB, matching Redis).
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Upper bound on up-front capacity for aggregates. The declared count
/// comes from the peer, so the Vec grows past this only as elements
/// actually arrive.
const PREALLOC_CAP: usize = 1024;

/// Checks whether `buf` starts with a complete reply and parses it.
///
/// Returns `Ok(Some((frame, consumed)))` for a complete frame,
/// `Ok(None)` if more data is needed, or `Err(...)` for malformed input.
pub fn parse_frame(buf: &[u8]) -> Result<Option<(Frame, usize)>, ProtocolError> {
    if buf.is_empty() {
        return Ok(None);
    }

    let mut cursor = Cursor::new(buf);

    match try_parse(&mut cursor, 0) {
        Ok(frame) => Ok(Some((frame, cursor.position() as usize))),
        Err(ProtocolError::Incomplete) => Ok(None),
        Err(e) => Err(e),
    }
}

fn try_parse(cursor: &mut Cursor<&[u8]>, depth: usize) -> Result<Frame, ProtocolError> {
    match read_byte(cursor)? {
        b'+' => {
            let line = read_line(cursor)?;
            let s = std::str::from_utf8(line).map_err(|_| ProtocolError::InvalidUtf8("simple"))?;
            Ok(Frame::Simple(s.to_owned()))
        }
        b'-' => {
            let line = read_line(cursor)?;
            let s = std::str::from_utf8(line).map_err(|_| ProtocolError::InvalidUtf8("error"))?;
            Ok(Frame::Error(s.to_owned()))
        }
        b':' => Ok(Frame::Integer(read_integer_line(cursor)?)),
        b'$' => {
            let len = read_integer_line(cursor)?;
            // RESP2 null bulk string
            if len == -1 {
                return Ok(Frame::Null);
            }
            if !(0..=MAX_BULK_LEN).contains(&len) {
                return Err(ProtocolError::InvalidFrameLength(len));
            }
            let len = len as usize;

            let pos = cursor.position() as usize;
            let buf = *cursor.get_ref();
            if buf.len().saturating_sub(pos) < len + 2 {
                return Err(ProtocolError::Incomplete);
            }
            if &buf[pos + len..pos + len + 2] != b"\r\n" {
                return Err(ProtocolError::InvalidFrameLength(len as i64));
            }

            cursor.set_position((pos + len + 2) as u64);
            Ok(Frame::Bulk(Bytes::copy_from_slice(&buf[pos..pos + len])))
        }
        b'*' => {
            let count = read_integer_line(cursor)?;
            // RESP2 null array
            if count == -1 {
                return Ok(Frame::Null);
            }
            let count = aggregate_len(count, depth)?;
            let mut frames = Vec::with_capacity(count.min(PREALLOC_CAP));
            for _ in 0..count {
                frames.push(try_parse(cursor, depth + 1)?);
            }
            Ok(Frame::Array(frames))
        }
        b'%' => {
            let count = aggregate_len(read_integer_line(cursor)?, depth)?;
            let mut pairs = Vec::with_capacity(count.min(PREALLOC_CAP));
            for _ in 0..count {
                let key = try_parse(cursor, depth + 1)?;
                let val = try_parse(cursor, depth + 1)?;
                pairs.push((key, val));
            }
            Ok(Frame::Map(pairs))
        }
        b'_' => {
            read_line(cursor)?;
            Ok(Frame::Null)
        }
        other => Err(ProtocolError::InvalidPrefix(other)),
    }
}

/// Validates a declared aggregate length against the nesting limit.
fn aggregate_len(count: i64, depth: usize) -> Result<usize, ProtocolError> {
    if depth + 1 > MAX_NESTING_DEPTH {
        return Err(ProtocolError::NestingTooDeep(MAX_NESTING_DEPTH));
    }
    usize::try_from(count).map_err(|_| ProtocolError::InvalidFrameLength(count))
}

fn read_byte(cursor: &mut Cursor<&[u8]>) -> Result<u8, ProtocolError> {
    let pos = cursor.position() as usize;
    let byte = *cursor.get_ref().get(pos).ok_or(ProtocolError::Incomplete)?;
    cursor.set_position((pos + 1) as u64);
    Ok(byte)
}

/// Returns the bytes up to the next `\r\n` and advances past it.
fn read_line<'a>(cursor: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], ProtocolError> {
    let buf: &'a [u8] = *cursor.get_ref();
    let start = cursor.position() as usize;
    if start >= buf.len() {
        return Err(ProtocolError::Incomplete);
    }

    let mut pos = start;
    while let Some(offset) = memchr::memchr(b'\r', &buf[pos..]) {
        let cr = pos + offset;
        if buf.get(cr + 1) == Some(&b'\n') {
            cursor.set_position((cr + 2) as u64);
            return Ok(&buf[start..cr]);
        }
        if cr + 1 >= buf.len() {
            break;
        }
        pos = cr + 1;
    }

    Err(ProtocolError::Incomplete)
}

fn read_integer_line(cursor: &mut Cursor<&[u8]>) -> Result<i64, ProtocolError> {
    let line = read_line(cursor)?;
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(ProtocolError::InvalidInteger)
}
