use pbkdf2::password_hash::rand_core::OsRng;
use pbkdf2::password_hash::{
    Error as PasswordHashError, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use pbkdf2::Pbkdf2;

use crate::error::HashError;

/// Hashes a plaintext password into a salted PHC string.
pub fn hash_password(plain: &str) -> Result<String, HashError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Pbkdf2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|error| HashError {
            message: error.to_string(),
        })?;
    Ok(hash.to_string())
}

/// Verifies a plaintext password against a stored PHC string. A mismatch is
/// `Ok(false)`; an unusable stored hash is an error.
pub fn verify_password(plain: &str, stored: &str) -> Result<bool, HashError> {
    let parsed = PasswordHash::new(stored).map_err(|error| HashError {
        message: error.to_string(),
    })?;
    match Pbkdf2.verify_password(plain.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(PasswordHashError::Password) => Ok(false),
        Err(error) => Err(HashError {
            message: error.to_string(),
        }),
    }
}

/// Low-round hash for test fixtures. Verification reads the round count from
/// the PHC string, so these interoperate with [`verify_password`].
#[cfg(test)]
pub(crate) fn quick_hash(plain: &str) -> String {
    let salt = SaltString::generate(&mut OsRng);
    let params = pbkdf2::Params {
        rounds: 32,
        output_length: 32,
    };
    Pbkdf2
        .hash_password_customized(plain.as_bytes(), None, None, params, &salt)
        .unwrap()
        .to_string()
}
