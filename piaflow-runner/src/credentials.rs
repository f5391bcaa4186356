//! Temporary SSH key material for local git syncs

use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::shell::shell_quote;

/// A private key written to a 0600 temporary file
///
/// The file is removed when the value is dropped, so it must outlive every
/// git invocation that uses it.
pub struct SshKeyFile {
    file: NamedTempFile,
}

impl SshKeyFile {
    pub fn write(private_key: &str) -> io::Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("piaflow-ssh-")
            .tempfile()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }

        file.write_all(private_key.as_bytes())?;
        if !private_key.ends_with('\n') {
            file.write_all(b"\n")?;
        }
        file.flush()?;

        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Value for `GIT_SSH_COMMAND` pointing ssh at this key
    pub fn git_ssh_command(&self) -> String {
        format!(
            "ssh -i {} -o IdentitiesOnly=yes -o StrictHostKeyChecking=accept-new",
            shell_quote(&self.path().to_string_lossy())
        )
    }
}
