// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! bech32 `npub` <-> [`PublicKey`] conversion and repository path derivation

use std::io;
use std::path::{Path, PathBuf};

use nostr::PublicKey;

/// Identity codec error
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// `npub` did not decode as a valid bech32 public key
    #[error("invalid npub: {0}")]
    InvalidNpub(String),
    /// A hosted repository path didn't match `<git_root>/<npub>/<id>.git`
    #[error("path does not look like a hosted repository: {0}")]
    MalformedRepoPath(PathBuf),
}

/// Encode a public key as its bech32 `npub` form
#[inline]
pub fn npub(pubkey: &PublicKey) -> String {
    pubkey
        .to_bech32()
        .expect("public key bech32 encoding is infallible")
}

/// Decode a bech32 `npub` into a [`PublicKey`]
pub fn pubkey_from_npub(npub: &str) -> Result<PublicKey, IdentityError> {
    PublicKey::from_bech32(npub).map_err(|_| IdentityError::InvalidNpub(npub.to_string()))
}

/// Derive the bare-repository path for `(pubkey, identifier)` under `git_root`
pub fn repo_path(git_root: &Path, pubkey: &PublicKey, identifier: &str) -> PathBuf {
    git_root.join(npub(pubkey)).join(format!("{identifier}.git"))
}

/// Split a hosted repository directory into `(npub, identifier)`.
///
/// `path` is expected to look like `<git_root>/<npub>/<identifier>.git`; only
/// the last two path components are inspected, so this works for both
/// absolute and repo-relative paths.
pub fn split_repo_path(path: &Path) -> Result<(String, String), IdentityError> {
    let dir_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| IdentityError::MalformedRepoPath(path.to_path_buf()))?;
    let identifier = dir_name
        .strip_suffix(".git")
        .ok_or_else(|| IdentityError::MalformedRepoPath(path.to_path_buf()))?;
    let npub = path
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|s| s.to_str())
        .ok_or_else(|| IdentityError::MalformedRepoPath(path.to_path_buf()))?;
    Ok((npub.to_string(), identifier.to_string()))
}

/// Derive `(pubkey, npub, identifier)` from a hosted repository path, as the
/// pre/post-receive hooks do by inspecting the directory they are invoked in.
pub fn pubkey_and_identifier_from_repo_path(
    path: &Path,
) -> Result<(PublicKey, String, String), IdentityError> {
    let (npub, identifier) = split_repo_path(path)?;
    let pubkey = pubkey_from_npub(&npub)?;
    Ok((pubkey, npub, identifier))
}

/// Derive the hosted-repository directory (`<git_root>/<npub>/<id>.git`) a
/// hook binary is running for, from its own invocation path: `argv[0]` is
/// two levels above the hook itself (`<id>.git>/hooks/<hook-name>`).
///
/// Symlink-aware per spec §9: the hook is installed as a symlink per repo,
/// so if `argv[0]` is itself a symlink its path is used as invoked; only a
/// direct (non-symlink) invocation is canonicalized first. Resolving a
/// symlinked hook would collapse every repo onto the one shared binary.
pub fn repo_dir_from_hook_invocation() -> io::Result<PathBuf> {
    let argv0 = std::env::args_os()
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "argv[0] is unavailable"))?;

    let mut hook_path = PathBuf::from(argv0);
    if hook_path.is_relative() {
        hook_path = std::env::current_dir()?.join(hook_path);
    }

    let is_symlink = std::fs::symlink_metadata(&hook_path)?.file_type().is_symlink();
    let hook_path = if is_symlink { hook_path } else { hook_path.canonicalize()? };

    let hooks_dir = hook_path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "hook path has no parent directory"))?;
    let repo_dir = hooks_dir
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "hooks directory has no parent directory"))?;

    Ok(repo_dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> PublicKey {
        use nostr::{Keys, SecretKey};

        let sk = SecretKey::from_hex(
            "0000000000000000000000000000000000000000000000000000000000000001",
        )
        .expect("valid test secret key");
        Keys::new(sk).public_key()
    }

    #[test]
    fn npub_roundtrips_through_bech32() {
        let pk = alice();
        let encoded = npub(&pk);
        assert!(encoded.starts_with("npub1"));
        assert_eq!(pubkey_from_npub(&encoded).unwrap(), pk);
    }

    #[test]
    fn repo_path_layout() {
        let pk = alice();
        let root = Path::new("/srv/git");
        let path = repo_path(root, &pk, "proj");
        assert_eq!(path, root.join(npub(&pk)).join("proj.git"));
    }

    #[test]
    fn split_repo_path_recovers_identifier_and_npub() {
        let pk = alice();
        let root = Path::new("/srv/git");
        let path = repo_path(root, &pk, "proj");
        let (npub_str, identifier) = split_repo_path(&path).unwrap();
        assert_eq!(npub_str, npub(&pk));
        assert_eq!(identifier, "proj");
    }

    #[test]
    fn split_repo_path_rejects_missing_git_suffix() {
        let path = Path::new("/srv/git/npub1abc/proj");
        assert!(split_repo_path(path).is_err());
    }
}
