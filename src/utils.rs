use sha1::{Digest, Sha1};
use sha2::Sha256;

pub fn sha1(payload: &str) -> String {
    let hash = Sha1::digest(payload);
    base16ct::lower::encode_string(&hash)
}

pub fn sha256(payload: &[u8], salt: &str, ctx_salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hasher.update(salt);
    hasher.update(ctx_salt);
    base16ct::lower::encode_string(&hasher.finalize())
}
