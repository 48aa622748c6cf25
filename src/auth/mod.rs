pub mod password;
pub mod token;

use anyhow::Result;
use rand_core::{OsRng, RngCore};
use std::path::Path;

/// Return the token-signing secret for this server instance.
///
/// On first call, generates 32 random bytes and writes them hex-encoded to
/// `{data_dir}/token.secret` with user-only read/write permissions (mode 0600
/// on Unix). On subsequent calls, reads and returns the existing secret.
///
/// The secret file must be kept private — anyone holding it can mint access
/// tokens for arbitrary users.
pub fn get_or_create_secret(data_dir: &Path) -> Result<Vec<u8>> {
    let path = data_dir.join("token.secret");

    if path.exists() {
        let raw = std::fs::read_to_string(&path)?.trim().to_string();
        if let Ok(secret) = hex::decode(&raw) {
            if !secret.is_empty() {
                return Ok(secret);
            }
        }
    }

    let mut secret = [0u8; 32];
    OsRng.fill_bytes(&mut secret);

    std::fs::create_dir_all(data_dir)?;
    std::fs::write(&path, hex::encode(secret))?;

    // Restrict to owner read/write only on Unix
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(secret.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_is_stable_across_calls() {
        let dir = tempfile::TempDir::new().unwrap();
        let first = get_or_create_secret(dir.path()).unwrap();
        let second = get_or_create_secret(dir.path()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 32);
    }

    #[test]
    fn corrupt_secret_file_is_regenerated() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("token.secret"), "not hex!").unwrap();
        let secret = get_or_create_secret(dir.path()).unwrap();
        assert_eq!(secret.len(), 32);
    }
}
