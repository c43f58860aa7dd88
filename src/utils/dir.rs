use std::{env, io, path::PathBuf};

use anyhow::Result;

/// Resolves the application root. `WORKLOG_ROOT` wins so the scheduler and a
/// manual shell session agree on where the data lives.
pub fn create_application_default_path() -> Result<PathBuf> {
    let path = {
        if let Ok(root) = env::var("WORKLOG_ROOT") {
            PathBuf::from(root)
        } else {
            #[cfg(windows)]
            {
                let mut path = PathBuf::from(
                    env::var("APPDATA").expect("APPDATA should be present on Windows"),
                );
                path.push("worklog");
                path
            }
            #[cfg(unix)]
            {
                let mut path = env::var("XDG_STATE_HOME")
                    .map(PathBuf::from)
                    .or_else(|_| {
                        env::var("HOME").map(|home| {
                            let mut path = PathBuf::from(home);
                            path.push(".local/state");
                            path
                        })
                    })
                    .expect("Couldn't find neither XDG_STATE_HOME nor HOME");
                path.push("worklog");
                path
            }
        }
    };

    match std::fs::create_dir_all(&path) {
        Ok(_) => Ok(path),
        Err(v) if v.kind() == io::ErrorKind::AlreadyExists => Ok(path),
        Err(v) => Err(v.into()),
    }
}
