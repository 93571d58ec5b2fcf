pub mod file;

use rand::Rng;
use rand::distr::Alphanumeric;

/// Printable payload of `len` bytes, handy for tests and demos.
pub fn random_text(len: usize) -> Vec<u8> {
    rand::rng().sample_iter(Alphanumeric).take(len).collect()
}

/// Strong content hash printed next to the 5-digit checksum.
pub fn content_hash(data: &[u8]) -> String {
    hex::encode(&blake3::hash(data).as_bytes()[..8])
}
