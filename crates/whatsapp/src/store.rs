use std::path::{Path, PathBuf};

use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session store {} exists but is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("failed to create session store {}: {source}", .path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Directory the engine keeps one client's credentials in.
pub fn session_dir(data_path: &Path, client_id: &str) -> PathBuf {
    data_path.join(format!("session-{client_id}"))
}

/// Make sure `data_path` exists before the engine starts and return the
/// directory the engine will own for `client_id`.
///
/// Idempotent. Errors must abort startup: without the store every restart
/// throws the login away and forces a new scan.
pub fn ensure_session_store(data_path: &Path, client_id: &str) -> Result<PathBuf, StoreError> {
    if data_path.exists() {
        if !data_path.is_dir() {
            return Err(StoreError::NotADirectory(data_path.to_path_buf()));
        }
        debug!(path = %data_path.display(), "session store present");
    } else {
        create_private_dir(data_path)?;
        info!(path = %data_path.display(), "created session store");
    }
    Ok(session_dir(data_path, client_id))
}

fn create_private_dir(path: &Path) -> Result<(), StoreError> {
    let create_err = |source| StoreError::Create {
        path: path.to_path_buf(),
        source,
    };
    std::fs::create_dir_all(path).map_err(create_err)?;

    // Credentials live here; owner only.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .map_err(create_err)?;
    }

    Ok(())
}
