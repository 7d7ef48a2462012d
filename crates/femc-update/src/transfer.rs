//! Firmware and configuration file transfers
//!
//! Every file lives directly in the module's storage directory; transfers use
//! image mode so executables and binary configuration blobs arrive byte-exact.

use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{info, instrument};

use crate::client::FirmwareUpdateClient;
use crate::error::{Result, UpdateError};

/// Check that `name` addresses a file directly in the storage directory
fn validate_bare_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(UpdateError::invalid_name(name, "not a file name"));
    }
    if name.contains(['/', '\\']) {
        return Err(UpdateError::invalid_name(
            name,
            "subdirectories are not supported on the module",
        ));
    }
    if name.contains(['\r', '\n']) {
        return Err(UpdateError::invalid_name(name, "contains a line terminator"));
    }
    Ok(())
}

/// Remote file name for an upload: the base name of `local_path`
fn remote_name_for(local_path: &Path) -> Result<String> {
    let file_name = local_path.file_name().ok_or_else(|| {
        UpdateError::local_io(
            local_path,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"),
        )
    })?;
    let name = file_name.to_str().ok_or_else(|| {
        UpdateError::local_io(
            local_path,
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "file name is not valid UTF-8",
            ),
        )
    })?;
    validate_bare_name(name)?;
    Ok(name.to_string())
}

/// Temporary file next to `destination` for staging a download
///
/// Created with the permissions a plain file create would get (0666 less the
/// umask on Unix) rather than the owner-only default of temporary files.
fn stage_download(dir: &Path, destination: &Path) -> Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(".femc-").suffix(".part");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o666));
    }
    builder
        .tempfile_in(dir)
        .map_err(|e| UpdateError::local_io(destination, e))
}

/// Give the staged file the permissions of the file it is about to replace
fn keep_existing_permissions(staged: &NamedTempFile, destination: &Path) -> Result<()> {
    match std::fs::metadata(destination) {
        Ok(existing) => std::fs::set_permissions(staged.path(), existing.permissions())
            .map_err(|e| UpdateError::local_io(destination, e)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(UpdateError::local_io(destination, e)),
    }
}

impl FirmwareUpdateClient {
    /// Upload a local file into the module's storage directory
    ///
    /// The remote name is the base name of `local_path`; any directory part only
    /// locates the local file. An existing remote file of the same name is
    /// replaced. Returns the number of bytes sent.
    #[instrument(skip_all, fields(path = %local_path.as_ref().display()))]
    pub fn put_file(&mut self, local_path: impl AsRef<Path>) -> Result<u64> {
        let local_path = local_path.as_ref();
        let remote_name = remote_name_for(local_path)?;

        let sent = self.with_active_session(|runtime, session| {
            runtime.block_on(async {
                let mut file = tokio::fs::File::open(local_path)
                    .await
                    .map_err(|e| UpdateError::local_io(local_path, e))?;
                session
                    .store_binary(&remote_name, &mut file)
                    .await
                    .map_err(|e| UpdateError::from_transfer(&remote_name, Some(local_path), e))
            })
        })?;

        info!(remote = %remote_name, bytes = sent, "Uploaded file");
        Ok(sent)
    }

    /// Download a file from the module into the current working directory
    ///
    /// Returns the path written. See [`get_file_into`](Self::get_file_into).
    pub fn get_file(&mut self, remote_name: &str) -> Result<PathBuf> {
        let cwd = std::env::current_dir().map_err(|e| UpdateError::local_io(".", e))?;
        self.get_file_into(remote_name, cwd)
    }

    /// Download a file from the module into `dir`
    ///
    /// `remote_name` must be a bare file name in the module's storage directory.
    /// Data is staged in a temporary file inside `dir` and renamed over any
    /// existing file only once the transfer has completed, so a failed download
    /// leaves no partial file behind. A replaced file keeps its permissions.
    #[instrument(skip(self, dir), fields(dir = %dir.as_ref().display()))]
    pub fn get_file_into(&mut self, remote_name: &str, dir: impl AsRef<Path>) -> Result<PathBuf> {
        validate_bare_name(remote_name)?;
        let dir = dir.as_ref();
        let destination = dir.join(remote_name);
        let local = destination.as_path();

        let (staged, received) = self.with_active_session(|runtime, session| {
            let staged = stage_download(dir, local)?;
            let staged_file = staged
                .as_file()
                .try_clone()
                .map_err(|e| UpdateError::local_io(staged.path(), e))?;

            let received = runtime.block_on(async {
                let mut file = tokio::fs::File::from_std(staged_file);
                session
                    .retrieve_binary(remote_name, &mut file)
                    .await
                    .map_err(|e| UpdateError::from_transfer(remote_name, Some(local), e))
            })?;
            Ok((staged, received))
        })?;

        keep_existing_permissions(&staged, &destination)?;
        staged
            .persist(&destination)
            .map_err(|e| UpdateError::local_io(&destination, e.error))?;

        info!(remote = %remote_name, local = %destination.display(), bytes = received, "Downloaded file");
        Ok(destination)
    }

    /// Names of the files in the module's storage directory
    #[instrument(skip(self))]
    pub fn list_files(&mut self) -> Result<Vec<String>> {
        self.with_active_session(|runtime, session| {
            runtime
                .block_on(session.list_names())
                .map_err(|e| UpdateError::from_transfer(".", None, e))
        })
    }
}
