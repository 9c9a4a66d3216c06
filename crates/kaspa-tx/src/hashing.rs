//! Blake2b hashing primitives

use blake2b_simd::{Params, State};

pub const ZERO_HASH: [u8; 32] = [0u8; 32];

/// Unkeyed 32-byte blake2b, used for script hashes
pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let hash = Params::new().hash_length(32).hash(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(hash.as_bytes());
    out
}

/// Domain-keyed 32-byte blake2b writer with little-endian integer helpers
pub struct Hasher {
    state: State,
}

impl Hasher {
    pub fn keyed(domain: &[u8]) -> Self {
        Self {
            state: Params::new().hash_length(32).key(domain).to_state(),
        }
    }

    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.state.update(data);
        self
    }

    pub fn write_u8(&mut self, v: u8) -> &mut Self {
        self.update(&[v])
    }

    pub fn write_u16(&mut self, v: u16) -> &mut Self {
        self.update(&v.to_le_bytes())
    }

    pub fn write_u32(&mut self, v: u32) -> &mut Self {
        self.update(&v.to_le_bytes())
    }

    pub fn write_u64(&mut self, v: u64) -> &mut Self {
        self.update(&v.to_le_bytes())
    }

    /// Length-prefixed (u64) byte string
    pub fn write_var_bytes(&mut self, data: &[u8]) -> &mut Self {
        self.write_u64(data.len() as u64).update(data)
    }

    pub fn finalize(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(self.state.finalize().as_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blake2b_256_deterministic() {
        assert_eq!(blake2b_256(b"kasplex"), blake2b_256(b"kasplex"));
        assert_ne!(blake2b_256(b"kasplex"), blake2b_256(b"kasplex "));
    }

    #[test]
    fn test_keyed_domains_differ() {
        let a = Hasher::keyed(b"TransactionID").update(b"x").finalize();
        let b = Hasher::keyed(b"TransactionSigningHash").update(b"x").finalize();
        assert_ne!(a, b);
        assert_ne!(a, blake2b_256(b"x"));
    }

    #[test]
    fn test_var_bytes_is_length_prefixed() {
        let mut manual = Hasher::keyed(b"d");
        manual.update(&2u64.to_le_bytes()).update(&[1, 2]);
        let mut helper = Hasher::keyed(b"d");
        helper.write_var_bytes(&[1, 2]);
        assert_eq!(manual.finalize(), helper.finalize());
    }
}
