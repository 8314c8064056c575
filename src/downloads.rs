// Copyright (c) 2023 xmpp-rs contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The default, convenience [`Downloads`] implementation: files land in
//! the platform downloads directory (or a configured override), and a
//! name collision gets a `(n)` suffix rather than clobbering an existing
//! file.

use std::io;
use std::path::{Path, PathBuf};

use crate::collaborators::Downloads;
use crate::config::JftConfig;

/// Resolves paths under the platform downloads directory (`dirs::download_dir`),
/// or under [`JftConfig::downloads_dir`] if the embedder set one.
#[derive(Debug, Clone)]
pub struct DefaultDownloads {
    base: PathBuf,
}

impl DefaultDownloads {
    /// Fails only if no override was configured and the platform has no
    /// notion of a downloads directory (headless Linux without XDG dirs
    /// set up, for instance).
    pub fn new(config: &JftConfig) -> io::Result<Self> {
        let base = match &config.downloads_dir {
            Some(dir) => dir.clone(),
            None => dirs::download_dir().ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    "no platform downloads directory and none configured",
                )
            })?,
        };
        std::fs::create_dir_all(&base)?;
        // §6 requires the downloads directory be created with mode 0700;
        // set it explicitly rather than trust the process umask, since the
        // directory may also already have existed with looser permissions.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&base, std::fs::Permissions::from_mode(0o700))?;
        }
        Ok(DefaultDownloads { base })
    }
}

impl Downloads for DefaultDownloads {
    fn resolve_path(&self, suggested_name: &str) -> io::Result<PathBuf> {
        let name = sanitize_name(suggested_name);
        let mut candidate = self.base.join(&name);
        if !candidate.exists() {
            return Ok(candidate);
        }

        let (stem, ext) = split_stem_ext(&name);
        for n in 1u32.. {
            let numbered = match &ext {
                Some(ext) => format!("{} ({}).{}", stem, n, ext),
                None => format!("{} ({})", stem, n),
            };
            candidate = self.base.join(numbered);
            if !candidate.exists() {
                return Ok(candidate);
            }
        }
        unreachable!("u32 exhausted before finding a free name")
    }
}

/// Strips anything that could escape the downloads directory or name an
/// existing special file, keeping just a bare file name. An empty or
/// all-separator name falls back to a fixed placeholder.
fn sanitize_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let trimmed = base.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        "received-file".to_string()
    } else {
        trimmed.to_string()
    }
}

fn split_stem_ext(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(0) | None => (name, None),
        Some(idx) => (&name[..idx], Some(&name[idx + 1..])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_path_traversal() {
        assert_eq!(sanitize_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_name("/etc/passwd"), "passwd");
        assert_eq!(sanitize_name(".."), "received-file");
        assert_eq!(sanitize_name(""), "received-file");
    }

    #[test]
    fn splits_stem_and_extension() {
        assert_eq!(split_stem_ext("photo.jpg"), ("photo", Some("jpg")));
        assert_eq!(split_stem_ext("README"), ("README", None));
        assert_eq!(split_stem_ext(".hidden"), (".hidden", None));
        assert_eq!(split_stem_ext("archive.tar.gz"), ("archive.tar", Some("gz")));
    }

    #[test]
    fn resolves_unique_path_in_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let downloads = DefaultDownloads {
            base: dir.path().to_path_buf(),
        };
        let path = downloads.resolve_path("photo.jpg").unwrap();
        assert_eq!(path, dir.path().join("photo.jpg"));
    }

    #[test]
    fn avoids_collision_with_numbered_suffix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("photo.jpg"), b"existing").unwrap();
        let downloads = DefaultDownloads {
            base: dir.path().to_path_buf(),
        };
        let path = downloads.resolve_path("photo.jpg").unwrap();
        assert_eq!(path, dir.path().join("photo (1).jpg"));
    }
}
