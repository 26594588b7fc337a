//! Artifact digests.
//!
//! Every serialized artifact gets a fingerprint in the build report so two
//! runs can be compared without diffing multi-gigabyte files:
//!
//! - algorithm: FNV-1a 64-bit over the artifact bytes as written
//! - output: `"fnv1a64:<16 lowercase hex digits>"`
//!
//! Not a security primitive; it only answers "did the output change".

pub const DIGEST_PREFIX: &str = "fnv1a64:";

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x00000100000001b3;

/// Streaming FNV-1a 64-bit hasher, fed while an artifact is being written.
#[derive(Debug, Clone, Copy)]
pub struct Fnv1a64 {
    hash: u64,
}

impl Default for Fnv1a64 {
    fn default() -> Self {
        Self {
            hash: FNV_OFFSET_BASIS,
        }
    }
}

impl Fnv1a64 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, bytes: &[u8]) {
        for b in bytes {
            self.hash ^= (*b) as u64;
            self.hash = self.hash.wrapping_mul(FNV_PRIME);
        }
    }

    pub fn finish_hex(&self) -> String {
        format!("{DIGEST_PREFIX}{:016x}", self.hash)
    }
}

pub fn fnv1a64_digest_bytes(bytes: &[u8]) -> String {
    let mut h = Fnv1a64::new();
    h.update(bytes);
    h.finish_hex()
}
