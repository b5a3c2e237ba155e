use rand::Rng;
use sha2::{Digest, Sha256};

/// Password hashing collaborator. `Sha256PasswordHasher` (salted SHA-256)
/// is the one implementation shipped; a production deployment would swap
/// in a proper KDF (argon2, scrypt) behind the same trait.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, raw: &str) -> String;
    fn verify(&self, raw: &str, hashed: &str) -> bool;
}

#[derive(Default)]
pub struct Sha256PasswordHasher;

impl Sha256PasswordHasher {
    fn digest(salt: &str, raw: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(b":");
        hasher.update(raw.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl PasswordHasher for Sha256PasswordHasher {
    fn hash(&self, raw: &str) -> String {
        let salt: String = rand_salt();
        format!("{}${}", salt, Self::digest(&salt, raw))
    }

    fn verify(&self, raw: &str, hashed: &str) -> bool {
        let Some((salt, expected)) = hashed.split_once('$') else {
            return false;
        };
        let actual = Self::digest(salt, raw);
        constant_time_eq(actual.as_bytes(), expected.as_bytes())
    }
}

fn rand_salt() -> String {
    let mut rng = rand::thread_rng();
    (0..16).map(|_| rng.sample(rand::distributions::Alphanumeric) as char).collect()
}

/// Generates a random alphanumeric password for the forgotten-password
/// flow, emailed to the user in place of their old one.
pub fn random_password(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.sample(rand::distributions::Alphanumeric) as char).collect()
}

/// Six-digit numeric verification code, zero-padded.
pub fn random_verification_code() -> String {
    let mut rng = rand::thread_rng();
    format!("{:06}", rng.gen_range(0..1_000_000))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
