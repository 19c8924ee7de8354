//! PC1 (Pukall Cipher 1), the stream cipher used by Mobipocket protection.
//!
//! Key schedule: the 16-byte key is read as eight big-endian 16-bit words.
//! Each output byte runs eight mixing rounds over those words and two
//! running accumulators, then folds `257 * plaintext_byte` back into every
//! key word, so the keystream depends on all bytes seen so far.
//!
//! The cipher has no random access.  Every independent use (unwrapping a
//! key-wrap cookie, decrypting one content record) needs a fresh [`Pc1`].

/// Byte length of a PC1 key.
pub const KEY_LEN: usize = 16;

/// Direction of a PC1 pass.  Only the feedback byte differs between the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Encrypt,
    Decrypt,
}

/// Running PC1 state for one key instance.
#[derive(Debug, Clone)]
pub struct Pc1 {
    words: [u16; 8],
    sum1:  u16,
    sum2:  u16,
}

impl Pc1 {
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        let mut words = [0u16; 8];
        for (j, w) in words.iter_mut().enumerate() {
            *w = u16::from_be_bytes([key[2 * j], key[2 * j + 1]]);
        }
        Self { words, sum1: 0, sum2: 0 }
    }

    fn keystream(&mut self) -> u16 {
        let mut temp: u16 = 0;
        let mut xor:  u16 = 0;
        for j in 0..8u16 {
            temp ^= self.words[j as usize];
            self.sum2 = self.sum2.wrapping_add(j).wrapping_mul(20021).wrapping_add(self.sum1);
            self.sum1 = temp.wrapping_mul(346);
            self.sum2 = self.sum2.wrapping_add(self.sum1);
            temp      = temp.wrapping_mul(20021).wrapping_add(1);
            xor      ^= temp ^ self.sum2;
        }
        xor
    }

    fn feed(&mut self, plain: u8) {
        let fold = plain as u16 * 257;
        for w in self.words.iter_mut() {
            *w ^= fold;
        }
    }

    /// Process one byte in the given direction.
    #[inline]
    pub fn step(&mut self, byte: u8, mode: Mode) -> u8 {
        let v   = self.keystream();
        let out = byte ^ (v >> 8) as u8 ^ v as u8;
        match mode {
            Mode::Encrypt => self.feed(byte),
            Mode::Decrypt => self.feed(out),
        }
        out
    }

    /// Transform `data` in place.
    pub fn apply(&mut self, data: &mut [u8], mode: Mode) {
        for b in data.iter_mut() {
            *b = self.step(*b, mode);
        }
    }
}

/// Encrypt `plaintext` with a fresh PC1 instance.
pub fn encrypt(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Vec<u8> {
    let mut out = plaintext.to_vec();
    Pc1::new(key).apply(&mut out, Mode::Encrypt);
    out
}

/// Decrypt `ciphertext` with a fresh PC1 instance.
pub fn decrypt(key: &[u8; KEY_LEN], ciphertext: &[u8]) -> Vec<u8> {
    let mut out = ciphertext.to_vec();
    Pc1::new(key).apply(&mut out, Mode::Decrypt);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const KEY: &[u8; 16] = b"0123456789ABCDEF";

    #[test]
    fn known_vector() {
        let ct = encrypt(KEY, b"Hello, Mobipocket!");
        assert_eq!(hex::encode(&ct), "ab99f82b224f90e011218db159e2926568d1");
        assert_eq!(decrypt(KEY, &ct), b"Hello, Mobipocket!");
    }

    #[test]
    fn empty_input() {
        assert!(encrypt(KEY, &[]).is_empty());
        assert!(decrypt(KEY, &[]).is_empty());
    }

    #[test]
    fn state_evolves_per_byte() {
        // A constant plaintext must not yield a constant ciphertext.
        let ct = encrypt(KEY, &[0u8; 64]);
        assert!(ct.windows(2).any(|w| w[0] != w[1]));
    }

    #[test]
    fn fresh_instances_are_independent() {
        let mut used = Pc1::new(KEY);
        let mut scratch = *b"warm up the state";
        used.apply(&mut scratch, Mode::Decrypt);

        let mut a = Pc1::new(KEY);
        let mut b = Pc1::new(KEY);
        let mut x = *b"same input";
        let mut y = *b"same input";
        a.apply(&mut x, Mode::Decrypt);
        b.apply(&mut y, Mode::Decrypt);
        assert_eq!(x, y);
    }

    proptest! {
        #[test]
        fn roundtrip(key in any::<[u8; 16]>(), data in proptest::collection::vec(any::<u8>(), 0..512)) {
            prop_assert_eq!(decrypt(&key, &encrypt(&key, &data)), data);
        }
    }
}
