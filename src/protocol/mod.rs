pub mod digest;
pub mod frame;

pub use digest::{ByteSum, Crc16, Digest, DigestKind, checksum_string};
pub use frame::{RawFrame, SeqBit, decode, encode_ack, encode_data};
