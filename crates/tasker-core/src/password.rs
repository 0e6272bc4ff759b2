//! Salted password hashing for local accounts

use base64::prelude::{Engine as _, BASE64_STANDARD};
use rand::RngCore;
use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;

use crate::error::{Error, Result};

const SCHEME: &str = "sha512";
const ITERATIONS: u32 = 20_000;
/// Stored hashes claiming more rounds than this are treated as malformed
const MAX_ITERATIONS: u32 = 1_000_000;
const SALT_LEN: usize = 16;
const MIN_PASSWORD_LEN: usize = 8;

/// Reject passwords that are short or miss a character class.
pub fn validate_password(password: &str) -> Result<()> {
    let invalid = |reason: &str| Err(Error::InvalidInput(reason.to_string()));

    if password.trim().is_empty() {
        return invalid("password cannot be empty");
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return invalid("password must be at least 8 characters long");
    }
    if !password.chars().any(char::is_uppercase) {
        return invalid("password must contain an uppercase letter");
    }
    if !password.chars().any(char::is_lowercase) {
        return invalid("password must contain a lowercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return invalid("password must contain a digit");
    }
    if password.chars().all(char::is_alphanumeric) {
        return invalid("password must contain a special character");
    }
    Ok(())
}

/// Hash into `sha512$<iterations>$<salt>$<digest>` with a fresh random salt.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let digest = derive(password, &salt, ITERATIONS);
    format!(
        "{SCHEME}${ITERATIONS}${}${}",
        BASE64_STANDARD.encode(salt),
        BASE64_STANDARD.encode(digest)
    )
}

/// Check `password` against a stored hash; malformed hashes never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(SCHEME), Some(iterations), Some(salt), Some(expected), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };

    let Some(iterations) = iterations
        .parse::<u32>()
        .ok()
        .filter(|rounds| (1..=MAX_ITERATIONS).contains(rounds))
    else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (BASE64_STANDARD.decode(salt), BASE64_STANDARD.decode(expected))
    else {
        return false;
    };

    let actual = derive(password, &salt, iterations);
    actual.as_slice().ct_eq(expected.as_slice()).into()
}

fn derive(password: &str, salt: &[u8], iterations: u32) -> Vec<u8> {
    let mut digest = Sha512::new()
        .chain_update(salt)
        .chain_update(password.as_bytes())
        .finalize();
    for _ in 1..iterations {
        digest = Sha512::new()
            .chain_update(salt)
            .chain_update(digest)
            .finalize();
    }
    digest.to_vec()
}
