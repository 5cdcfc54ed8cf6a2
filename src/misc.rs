use crate::release::{RelResult, ReleaseError};
use std::{fs::OpenOptions, path::Path};

pub fn format_error(source: &(dyn std::error::Error + 'static)) -> String {
    let mut out = fomat!((source));

    let mut source = source.source();
    while let Some(why) = source {
        out.push_str(&fomat!(": "(why)));
        source = why.source();
    }

    out
}

/// Creates an empty file at `path` unless one already exists.
pub fn touch(path: &Path) -> RelResult<()> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(|_| ())
        .map_err(|why| ReleaseError::Flag(path.to_owned(), why))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::CommandError;

    #[test]
    fn error_chain_is_flattened() {
        let why = ReleaseError::Command(CommandError::Spawn {
            cmd:    "apt-get update".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        });

        assert_eq!(
            format_error(&why),
            "external command failed: failed to spawn `apt-get update`: no such file"
        );
    }

    #[test]
    fn touch_keeps_contents() {
        let dir = tempfile::tempdir().unwrap();
        let flag = dir.path().join("flag");

        touch(&flag).unwrap();
        assert_eq!(std::fs::read(&flag).unwrap(), b"");

        std::fs::write(&flag, "error").unwrap();
        touch(&flag).unwrap();
        assert_eq!(std::fs::read_to_string(&flag).unwrap(), "error");

        assert!(touch(&dir.path().join("missing/flag")).is_err());
    }
}
