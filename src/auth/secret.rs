use rand::RngCore;

const SECRET_BYTES: usize = 32;

/// 32 bytes from the thread-local CSPRNG, lowercase hex encoded (64 chars).
/// Used for authorization codes, refresh tokens and client secrets.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
