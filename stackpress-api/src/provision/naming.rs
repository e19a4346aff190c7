//! Resource naming and credential generation
//!
//! All randomness comes from an injected [`EntropySource`]; production uses
//! the operating system CSPRNG through [`OsEntropy`].

use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

/// Upper bound on every generated resource name
pub const MAX_NAME_LENGTH: usize = 60;

/// Length of the per-request uniqueness suffix
pub const SUFFIX_LENGTH: usize = 5;

/// Characters used for the uniqueness suffix
pub const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Characters used for generated passwords
pub const CREDENTIAL_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*()-_+";

const ENTROPY_CHUNK: usize = 64;

/// The entropy source could not be read
#[derive(Debug, Error)]
#[error("random source unavailable: {0}")]
pub struct RandomSourceError(pub String);

/// Source of cryptographically secure random bytes
pub trait EntropySource: Send + Sync {
    fn fill_bytes(&self, dest: &mut [u8]) -> Result<(), RandomSourceError>;
}

/// Operating system CSPRNG
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill_bytes(&self, dest: &mut [u8]) -> Result<(), RandomSourceError> {
        OsRng
            .try_fill_bytes(dest)
            .map_err(|e| RandomSourceError(e.to_string()))
    }
}

/// Generate the 5-character suffix shared by every name in one request
pub fn new_suffix(entropy: &dyn EntropySource) -> Result<String, RandomSourceError> {
    random_string(entropy, SUFFIX_ALPHABET, SUFFIX_LENGTH)
}

/// Generate a password of exactly `length` characters
pub fn new_credential(
    entropy: &dyn EntropySource,
    length: usize,
) -> Result<String, RandomSourceError> {
    random_string(entropy, CREDENTIAL_ALPHABET, length)
}

/// Build `<prefix>-<suffix>-<resource_type>`, at most [`MAX_NAME_LENGTH`] long
///
/// Only the prefix is ever shortened; the suffix and resource type always
/// survive intact.
pub fn build_name(prefix: &str, resource_type: &str, suffix: &str) -> String {
    let fixed_len = resource_type.chars().count() + suffix.chars().count() + 2;
    let allowed = MAX_NAME_LENGTH.saturating_sub(fixed_len);
    let prefix: String = prefix.chars().take(allowed).collect();
    format!("{}-{}-{}", prefix, suffix, resource_type)
}

/// Draw `length` characters uniformly from `alphabet`
///
/// Bytes that would bias the modulo reduction are discarded, so every
/// character of the alphabet is equally likely.
fn random_string(
    entropy: &dyn EntropySource,
    alphabet: &[u8],
    length: usize,
) -> Result<String, RandomSourceError> {
    debug_assert!(!alphabet.is_empty() && alphabet.len() <= 256);

    let n = alphabet.len();
    let limit = 256 - (256 % n);
    let max_rounds = length + ENTROPY_CHUNK;

    let mut out = String::with_capacity(length);
    let mut buf = [0u8; ENTROPY_CHUNK];
    let mut rounds = 0;

    while out.len() < length {
        if rounds == max_rounds {
            return Err(RandomSourceError(
                "entropy source produced no usable bytes".to_string(),
            ));
        }
        rounds += 1;

        entropy.fill_bytes(&mut buf)?;
        for &byte in buf.iter() {
            let byte = byte as usize;
            if byte < limit {
                out.push(alphabet[byte % n] as char);
                if out.len() == length {
                    break;
                }
            }
        }
    }

    Ok(out)
}
