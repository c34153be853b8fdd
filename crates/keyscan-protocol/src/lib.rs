//! keyscan-protocol: the slice of RESP a scanning client needs.
//!
//! Encodes commands as arrays of bulk strings and parses the replies a
//! store sends back, including the RESP2 null forms (`$-1`, `*-1`) that
//! servers emit when a connection never negotiated RESP3.
//!
//! # quick start
//!
//! ```
//! use bytes::{Bytes, BytesMut};
//! use keyscan_protocol::{encode_command, parse_frame, Frame};
//!
//! let mut buf = BytesMut::new();
//! encode_command(&[Bytes::from_static(b"DBSIZE")], &mut buf);
//! assert_eq!(&buf[..], b"*1\r\n$6\r\nDBSIZE\r\n");
//!
//! let (frame, consumed) = parse_frame(b":42\r\n").unwrap().unwrap();
//! assert_eq!(frame, Frame::Integer(42));
//! assert_eq!(consumed, 5);
//! ```

mod encode;
pub mod error;
pub mod parse;
pub mod types;

pub use encode::{encode_command, encode_pipeline};
pub use error::ProtocolError;
pub use parse::parse_frame;
pub use types::Frame;
