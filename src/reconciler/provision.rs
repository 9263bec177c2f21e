// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

use std::path::Path;
use std::time::Duration;

use nostr::{Event, PublicKey};

use super::{git, Reconciler, ReconcilerError};
use crate::{identity, model, resolver};

/// What [`provision_repository`] actually did, for logging/testing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// A regular directory already exists, or the existing symlink already
    /// points at a still-valid maintainer
    AlreadyCorrect,
    /// The path was a symlink to a no-longer-valid maintainer and was
    /// rewritten to point at a currently-valid one
    SymlinkRewritten,
    /// No path existed; a maintainer already hosts a regular repository, so
    /// a symlink to it was created instead of a fresh bare repository
    SymlinkedToMaintainer,
    /// No usable symlink target existed; a fresh bare repository was created
    Created,
}

/// Provision (or reconcile the symlink for) the repository named by an
/// admitted `RepoAnnouncement` event, per spec §4.6.1.
pub async fn provision_repository(
    reconciler: &Reconciler,
    event: &Event,
) -> Result<ProvisionOutcome, ReconcilerError> {
    let announcement =
        model::parse_announcement(event).map_err(|_| ReconcilerError::MissingIdentifierTag)?;
    let identifier = announcement.id;
    let author = event.pubkey;

    let path = identity::repo_path(reconciler.git_root(), &author, &identifier);
    let _guard = reconciler.locks().acquire(&path).await;

    let maintainers = reconciler.maintainers(author, &identifier).await?;

    match tokio::fs::symlink_metadata(&path).await {
        Ok(meta) if meta.file_type().is_symlink() => {
            let target = tokio::fs::read_link(&path).await?;
            let target_is_valid = identity::pubkey_and_identifier_from_repo_path(&target)
                .map(|(pubkey, _, _)| maintainers.contains(&pubkey))
                .unwrap_or(false);

            if target_is_valid {
                return Ok(ProvisionOutcome::AlreadyCorrect);
            }
            tokio::fs::remove_file(&path).await?;
        }
        Ok(_) => return Ok(ProvisionOutcome::AlreadyCorrect),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    for maintainer in &maintainers {
        if *maintainer == author {
            continue;
        }
        let candidate = identity::repo_path(reconciler.git_root(), maintainer, &identifier);
        if is_regular_repo(&candidate).await {
            symlink_repo(&candidate, &path).await?;
            tracing::info!(%identifier, author = %identity::npub(&author), target = %identity::npub(maintainer), "symlinked new repo to existing maintainer");
            return Ok(ProvisionOutcome::SymlinkedToMaintainer);
        }
    }

    create_new_repository(reconciler, &path).await?;
    tracing::info!(%identifier, author = %identity::npub(&author), path = %path.display(), "created bare repository");

    tokio::time::sleep(Duration::from_secs(1)).await;
    sync_after_provisioning(reconciler, author, &identifier, &path).await;

    Ok(ProvisionOutcome::Created)
}

async fn is_regular_repo(path: &Path) -> bool {
    tokio::fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
}

#[cfg(unix)]
async fn symlink_repo(target: &Path, link: &Path) -> Result<(), ReconcilerError> {
    if let Some(parent) = link.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::symlink(target, link).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn symlink_repo(_target: &Path, _link: &Path) -> Result<(), ReconcilerError> {
    Err(std::io::Error::new(std::io::ErrorKind::Unsupported, "symlinked repos require unix").into())
}

async fn create_new_repository(reconciler: &Reconciler, path: &Path) -> Result<(), ReconcilerError> {
    tokio::fs::create_dir_all(path).await?;
    git::init_bare(path).await?;
    git::config(path, "http.receivepack", "true").await?;
    git::config(path, "uploadpack.allowTipSHA1InWant", "true").await?;
    git::config(path, "uploadpack.allowUnreachable", "true").await?;

    install_hooks(reconciler, path).await?;
    set_hosting_permissions(path).await?;
    chown_to_http_backend_user(path).await;

    Ok(())
}

#[cfg(unix)]
async fn install_hooks(reconciler: &Reconciler, path: &Path) -> Result<(), ReconcilerError> {
    let hooks_dir = path.join("hooks");
    tokio::fs::create_dir_all(&hooks_dir).await?;

    for (name, target) in [
        ("pre-receive", &reconciler.pre_receive_hook_path),
        ("post-receive", &reconciler.post_receive_hook_path),
    ] {
        let link = hooks_dir.join(name);
        let _ = tokio::fs::remove_file(&link).await;
        tokio::fs::symlink(target, &link).await?;
    }
    Ok(())
}

#[cfg(not(unix))]
async fn install_hooks(_reconciler: &Reconciler, _path: &Path) -> Result<(), ReconcilerError> {
    Ok(())
}

#[cfg(unix)]
async fn set_hosting_permissions(path: &Path) -> Result<(), ReconcilerError> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o777);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn set_hosting_permissions(_path: &Path) -> Result<(), ReconcilerError> {
    Ok(())
}

/// Best-effort `chown -R nginx:nginx <path>`, matching the reference
/// deployment's HTTP-backend service user. Failure is ignored: this process
/// commonly lacks the privilege to chown to another user, and the directory
/// is already world-writable from [`set_hosting_permissions`].
async fn chown_to_http_backend_user(path: &Path) {
    let _ = tokio::process::Command::new("chown")
        .args(["-R", "nginx:nginx"])
        .arg(path)
        .output()
        .await;
}

/// Kick off an immediate proactive sync against peer git servers named in
/// any resolved maintainer's announcements. Best-effort: a freshly announced
/// repo usually has no state event yet, so failure here is expected and
/// logged rather than propagated.
async fn sync_after_provisioning(reconciler: &Reconciler, author: PublicKey, identifier: &str, path: &Path) {
    let events = match reconciler.repo_events(identifier).await {
        Ok(events) => events,
        Err(e) => {
            tracing::debug!(%identifier, error = %e, "could not refetch repo events for post-creation sync");
            return;
        }
    };

    let maintainers = resolver::resolve_maintainers(&events, author, identifier);
    let Ok(state_event) = resolver::authoritative_state(&events, &maintainers) else {
        tracing::debug!(%identifier, "no state event yet for post-creation sync, likely a fresh repo");
        return;
    };
    let Ok(state) = model::parse_state(state_event) else {
        return;
    };
    let local_url = reconciler.local_repo_url(author, identifier);
    let peers = resolver::peer_git_servers(&events, &maintainers, &local_url);

    match super::sync::proactive_sync(path, &state, &peers).await {
        Ok(outcome) if outcome.is_complete() => {
            tracing::debug!(%identifier, "post-creation proactive sync completed");
        }
        Ok(outcome) => {
            tracing::debug!(%identifier, missing = ?outcome.missing_refs, "post-creation proactive sync left refs missing");
        }
        Err(e) => {
            tracing::debug!(%identifier, error = %e, "post-creation proactive sync failed");
        }
    }
}
