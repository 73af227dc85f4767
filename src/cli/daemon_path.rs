use std::path::PathBuf;

/// Path of the `dwell-daemon` binary installed next to the cli executable.
pub fn to_daemon_path(mut path: PathBuf) -> PathBuf {
    path.set_file_name("dwell-daemon");
    #[cfg(windows)]
    {
        path.set_extension("exe");
    }
    path
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::to_daemon_path;

    #[cfg(unix)]
    #[test]
    fn daemon_lives_next_to_cli() {
        assert_eq!(
            to_daemon_path(PathBuf::from("/usr/local/bin/dwell")),
            PathBuf::from("/usr/local/bin/dwell-daemon")
        );
    }
}
