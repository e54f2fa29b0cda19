//! Standard RC4 workbook encryption, MS-OFFCRYPTO §2.3.6.
//!
//! The `FilePass` record carries a salt, an encrypted verifier and the
//! verifier's MD5 hash. The password mixes with the salt into a 16-byte
//! base key; each 1024-byte block of the workbook stream is decrypted
//! with a fresh RC4 cipher keyed from the base key and the block number.
//! Record headers and a handful of record types stay in clear, but their
//! bytes still advance the keystream.

use md5::{Digest, Md5};

use super::{records, XlsError};
use crate::utils::read_u16;

/// Documents without an explicit password are encrypted with this one.
pub(crate) const DEFAULT_PASSWORD: &str = "VelvetSweatshop";

const BLOCK_SIZE: usize = 1024;

// record types whose payloads are never encrypted
const CLEAR_RECORDS: [u16; 7] = [
    records::BOF,
    records::FILEPASS,
    records::USREXCL,
    records::FILELOCK,
    records::INTERFACEHDR,
    records::RRDINFO,
    records::RRDHEAD,
];

/// Minimal RC4 (KSA + PRGA); small enough that a cipher crate is not
/// worth the dependency for this legacy format.
pub(crate) struct Rc4 {
    s: [u8; 256],
    i: u8,
    j: u8,
}

impl Rc4 {
    pub(crate) fn new(key: &[u8]) -> Rc4 {
        debug_assert!(!key.is_empty());
        let mut s = [0u8; 256];
        for (i, v) in s.iter_mut().enumerate() {
            *v = i as u8;
        }
        let mut j: u8 = 0;
        for i in 0..256usize {
            j = j.wrapping_add(s[i]).wrapping_add(key[i % key.len()]);
            s.swap(i, j as usize);
        }
        Rc4 { s, i: 0, j: 0 }
    }

    pub(crate) fn apply_keystream(&mut self, data: &mut [u8]) {
        for b in data {
            self.i = self.i.wrapping_add(1);
            self.j = self.j.wrapping_add(self.s[self.i as usize]);
            self.s.swap(self.i as usize, self.j as usize);
            let idx = self.s[self.i as usize].wrapping_add(self.s[self.j as usize]);
            *b ^= self.s[idx as usize];
        }
    }
}

fn md5(parts: &[&[u8]]) -> [u8; 16] {
    let mut hasher = Md5::new();
    for p in parts {
        hasher.update(p);
    }
    hasher.finalize().into()
}

/// Derives the 16-byte base key from a password and the 16-byte salt
/// (MS-OFFCRYPTO §2.3.6.2).
///
/// Password characters are encoded as UTF-16LE code units.
pub(crate) fn derive_key(password: &str, salt: &[u8]) -> [u8; 16] {
    let mut pass_bytes = Vec::with_capacity(password.len() * 2);
    for unit in password.encode_utf16() {
        pass_bytes.extend_from_slice(&unit.to_le_bytes());
    }
    let h0 = md5(&[&pass_bytes]);

    // sixteen rounds of the truncated hash mixed with the salt
    let mut hasher = Md5::new();
    for _ in 0..16 {
        hasher.update(&h0[..5]);
        hasher.update(salt);
    }
    hasher.finalize().into()
}

/// A password-verified decryptor for one workbook stream.
pub(crate) struct Rc4Decryptor {
    base_key: [u8; 16],
}

impl Rc4Decryptor {
    /// Builds a decryptor from the `FilePass` payload past the
    /// encryption-type field, verifying the password. With no password
    /// given the built-in default is tried.
    pub(crate) fn new(data: &[u8], password: Option<&str>) -> Result<Rc4Decryptor, XlsError> {
        if data.len() != 52 {
            return Err(XlsError::InvalidFilePass(data.len()));
        }
        let minor = read_u16(&data[2..4]);
        if minor != 1 {
            return Err(XlsError::UnknownRc4Version(minor));
        }
        let salt = &data[4..20];
        let verifier = &data[20..36];
        let verifier_hash = &data[36..52];

        let password = password.unwrap_or(DEFAULT_PASSWORD);
        let decryptor = Rc4Decryptor {
            base_key: derive_key(password, salt),
        };
        decryptor.verify(verifier, verifier_hash)?;
        Ok(decryptor)
    }

    fn block_cipher(&self, block: u32) -> Rc4 {
        let key = md5(&[&self.base_key[..5], &block.to_le_bytes()]);
        Rc4::new(&key)
    }

    // both fields decrypt sequentially with the block-0 cipher
    fn verify(&self, verifier: &[u8], verifier_hash: &[u8]) -> Result<(), XlsError> {
        let mut cipher = self.block_cipher(0);
        let mut v = [0u8; 16];
        let mut h = [0u8; 16];
        v.copy_from_slice(verifier);
        h.copy_from_slice(verifier_hash);
        cipher.apply_keystream(&mut v);
        cipher.apply_keystream(&mut h);
        if md5(&[&v]) == h {
            Ok(())
        } else {
            Err(XlsError::InvalidPassword)
        }
    }

    fn keystream_block(&self, block: u32) -> [u8; BLOCK_SIZE] {
        let mut ks = [0u8; BLOCK_SIZE];
        self.block_cipher(block).apply_keystream(&mut ks);
        ks
    }

    /// Decrypts a workbook stream in place.
    ///
    /// Record headers and the payloads of the clear record types (plus
    /// the 4-byte stream position of `BoundSheet8`) are left untouched;
    /// the keystream advances over them all the same so the 1024-byte
    /// block counter stays aligned with the encrypting writer.
    pub(crate) fn decrypt_stream(&self, data: &mut [u8]) {
        let spans = encrypted_spans(data);
        let mut current = u32::MAX;
        let mut ks = [0u8; BLOCK_SIZE];
        for (start, end) in spans {
            for p in start..end {
                let block = (p / BLOCK_SIZE) as u32;
                if block != current {
                    ks = self.keystream_block(block);
                    current = block;
                }
                data[p] ^= ks[p % BLOCK_SIZE];
            }
        }
    }
}

// walks the record stream and returns the byte ranges that are
// actually ciphered
fn encrypted_spans(data: &[u8]) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut pos = 0;
    while pos + 4 <= data.len() {
        let typ = read_u16(&data[pos..]);
        let size = read_u16(&data[pos + 2..]) as usize;
        let body = pos + 4;
        let end = (body + size).min(data.len());
        if CLEAR_RECORDS.contains(&typ) {
            // whole payload in clear
        } else if typ == records::BOUNDSHEET8 {
            // only the stream position stays readable
            if end > body + 4 {
                spans.push((body + 4, end));
            }
        } else if end > body {
            spans.push((body, end));
        }
        pos = body + size;
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rc4_known_vector() {
        // classic test vector: key "Key", plaintext "Plaintext"
        let mut data = *b"Plaintext";
        Rc4::new(b"Key").apply_keystream(&mut data);
        assert_eq!(
            data,
            [0xBB, 0xF3, 0x16, 0xE8, 0xD9, 0x40, 0xAF, 0x0A, 0xD3]
        );
    }

    fn build_filepass(password: &str, salt: &[u8; 16], verifier: &[u8; 16]) -> Vec<u8> {
        let key = derive_key(password, salt);
        let hash = md5(&[verifier]);

        let mut enc_verifier = *verifier;
        let mut enc_hash = hash;
        let mut cipher = Rc4::new(&md5(&[&key[..5], &0u32.to_le_bytes()]));
        cipher.apply_keystream(&mut enc_verifier);
        cipher.apply_keystream(&mut enc_hash);

        let mut payload = Vec::with_capacity(52);
        payload.extend_from_slice(&1u16.to_le_bytes()); // major
        payload.extend_from_slice(&1u16.to_le_bytes()); // minor
        payload.extend_from_slice(salt);
        payload.extend_from_slice(&enc_verifier);
        payload.extend_from_slice(&enc_hash);
        payload
    }

    #[test]
    fn password_verification() {
        let salt = [7u8; 16];
        let verifier = [3u8; 16];
        let payload = build_filepass(DEFAULT_PASSWORD, &salt, &verifier);

        assert!(Rc4Decryptor::new(&payload, None).is_ok());
        assert!(Rc4Decryptor::new(&payload, Some(DEFAULT_PASSWORD)).is_ok());
        assert!(matches!(
            Rc4Decryptor::new(&payload, Some("wrong")),
            Err(XlsError::InvalidPassword)
        ));

        // corrupt one verifier byte
        let mut bad = payload.clone();
        bad[20] ^= 0x01;
        assert!(matches!(
            Rc4Decryptor::new(&bad, None),
            Err(XlsError::InvalidPassword)
        ));

        let user = build_filepass("hunter2", &salt, &verifier);
        assert!(Rc4Decryptor::new(&user, Some("hunter2")).is_ok());
        assert!(matches!(
            Rc4Decryptor::new(&user, None),
            Err(XlsError::InvalidPassword)
        ));
    }

    #[test]
    fn bad_filepass_shapes() {
        assert!(matches!(
            Rc4Decryptor::new(&[0u8; 10], None),
            Err(XlsError::InvalidFilePass(10))
        ));
        let mut payload = build_filepass(DEFAULT_PASSWORD, &[0u8; 16], &[1u8; 16]);
        payload[2] = 9; // minor version
        assert!(matches!(
            Rc4Decryptor::new(&payload, None),
            Err(XlsError::UnknownRc4Version(9))
        ));
    }

    #[test]
    fn selective_stream_decryption() {
        let salt = [9u8; 16];
        let verifier = [5u8; 16];
        let payload = build_filepass(DEFAULT_PASSWORD, &salt, &verifier);
        let dec = Rc4Decryptor::new(&payload, None).unwrap();

        // BOF (clear), a BoundSheet8 (position clear, rest ciphered)
        // and a Number record (fully ciphered)
        let mut stream = Vec::new();
        stream.extend_from_slice(&records::BOF.to_le_bytes());
        stream.extend_from_slice(&4u16.to_le_bytes());
        stream.extend_from_slice(&[0x00, 0x06, 0x05, 0x00]);
        stream.extend_from_slice(&records::BOUNDSHEET8.to_le_bytes());
        stream.extend_from_slice(&8u16.to_le_bytes());
        stream.extend_from_slice(&[0x40, 0x00, 0x00, 0x00, 0xAA, 0xBB, 0xCC, 0xDD]);
        stream.extend_from_slice(&records::NUMBER.to_le_bytes());
        stream.extend_from_slice(&6u16.to_le_bytes());
        stream.extend_from_slice(&[1, 2, 3, 4, 5, 6]);

        let plain = stream.clone();
        // XOR is symmetric: one pass encrypts, a second decrypts
        dec.decrypt_stream(&mut stream);
        assert_ne!(stream, plain);
        // headers and clear ranges survive
        assert_eq!(&stream[..8], &plain[..8]);
        assert_eq!(&stream[8..12], &plain[8..12]); // BoundSheet8 header
        assert_eq!(&stream[12..16], &plain[12..16]); // stream position
        assert_ne!(&stream[16..20], &plain[16..20]); // sheet name bytes
        dec.decrypt_stream(&mut stream);
        assert_eq!(stream, plain);
    }
}
