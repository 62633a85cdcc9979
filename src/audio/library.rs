//! # Audio Library
//!
//! Maps stored audio filenames onto files under the trusted base directory.
//!
//! A filename taken from the database is never trusted. It is joined onto the
//! canonical base directory, the result is canonicalized (resolving `..`
//! segments and symlinks), and the outcome is accepted only if the base
//! directory is a strict ancestor of it. The comparison is done on path
//! components, not on strings, so `/data/audio-old/x.wav` is not inside
//! `/data/audio`.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Why a filename could not be mapped to a safe location.
///
/// Both variants are reported to clients identically; the distinction only
/// matters for server-side logs.
#[derive(Debug)]
pub enum PathRejection {
    /// The base directory or the joined path could not be canonicalized.
    Canonicalize(io::Error),
    /// The resolved path is the base directory itself or lies outside it.
    OutsideBase(PathBuf),
}

impl fmt::Display for PathRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathRejection::Canonicalize(err) => write!(f, "canonicalization failed: {}", err),
            PathRejection::OutsideBase(path) => {
                write!(f, "{} is not inside the audio directory", path.display())
            }
        }
    }
}

impl std::error::Error for PathRejection {}

/// The trusted directory reference recordings are served from.
#[derive(Debug, Clone)]
pub struct AudioLibrary {
    base_dir: PathBuf,
}

impl AudioLibrary {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// The base directory as configured (not canonicalized).
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolve `filename` to an absolute, symlink-free path strictly inside
    /// the base directory.
    ///
    /// The file itself does not have to exist: trailing components that are
    /// missing on disk are appended lexically, so a deleted recording still
    /// resolves and can be reported as missing by the caller. This performs
    /// blocking filesystem calls.
    pub fn resolve(&self, filename: &str) -> Result<PathBuf, PathRejection> {
        let base = fs::canonicalize(&self.base_dir).map_err(PathRejection::Canonicalize)?;

        // An absolute `filename` replaces `base` entirely here; the
        // containment check below catches it.
        let joined = base.join(filename);
        let resolved = canonicalize_lenient(&joined).map_err(PathRejection::Canonicalize)?;

        if !is_strict_descendant(&resolved, &base) {
            return Err(PathRejection::OutsideBase(resolved));
        }

        Ok(resolved)
    }
}

/// True when `ancestor` appears among the proper ancestors of `path`.
fn is_strict_descendant(path: &Path, ancestor: &Path) -> bool {
    path.ancestors().skip(1).any(|candidate| candidate == ancestor)
}

/// Symlinks followed during one resolution before giving up, as `ELOOP` would.
const MAX_SYMLINK_HOPS: u32 = 40;

/// Canonicalize `path`, tolerating components that do not exist.
///
/// Components are walked left to right. Each one that exists is checked with
/// `symlink_metadata`; a symlink is replaced by its target, which is resolved
/// the same way, so a link pointing at a missing file still lands where the
/// file would be. A component that does not exist is kept as-is and `..`
/// simply pops the last component. Any other I/O error (permission problems,
/// embedded NUL bytes, a regular file used as a directory) is returned, as is
/// a chain of more than `MAX_SYMLINK_HOPS` links.
fn canonicalize_lenient(path: &Path) -> io::Result<PathBuf> {
    let mut hops = 0;
    let resolved = resolve_components(path, &mut hops)?;

    if !resolved.is_absolute() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "path did not resolve to an absolute location",
        ));
    }

    Ok(resolved)
}

fn resolve_components(path: &Path, hops: &mut u32) -> io::Result<PathBuf> {
    let mut resolved = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => resolved.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(name) => {
                resolved.push(name);
                match fs::symlink_metadata(&resolved) {
                    Ok(meta) if meta.file_type().is_symlink() => {
                        *hops += 1;
                        if *hops > MAX_SYMLINK_HOPS {
                            return Err(io::Error::new(
                                io::ErrorKind::Other,
                                "too many levels of symbolic links",
                            ));
                        }
                        let target = fs::read_link(&resolved)?;
                        resolved.pop();
                        // An absolute target replaces the parent on join
                        let joined = resolved.join(target);
                        resolved = resolve_components(&joined, hops)?;
                    }
                    Ok(_) => {}
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                    Err(err) => return Err(err),
                }
            }
        }
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn library_with_files(files: &[&str]) -> (TempDir, AudioLibrary) {
        let dir = TempDir::new().unwrap();
        for name in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(&path, b"RIFF").unwrap();
        }
        let library = AudioLibrary::new(dir.path());
        (dir, library)
    }

    fn canonical_base(dir: &TempDir) -> PathBuf {
        fs::canonicalize(dir.path()).unwrap()
    }

    #[test]
    fn test_plain_filename_resolves_inside_base() {
        let (dir, library) = library_with_files(&["moien.wav"]);
        let resolved = library.resolve("moien.wav").unwrap();
        assert_eq!(resolved, canonical_base(&dir).join("moien.wav"));
    }

    #[test]
    fn test_nested_filename_resolves() {
        let (dir, library) = library_with_files(&["greetings/moien.wav"]);
        let resolved = library.resolve("greetings/moien.wav").unwrap();
        assert_eq!(resolved, canonical_base(&dir).join("greetings").join("moien.wav"));
    }

    #[test]
    fn test_dot_segments_inside_base_are_normalized() {
        let (dir, library) = library_with_files(&["a/moien.wav"]);
        let resolved = library.resolve("a/./../a/moien.wav").unwrap();
        assert_eq!(resolved, canonical_base(&dir).join("a").join("moien.wav"));
    }

    #[test]
    fn test_missing_file_still_resolves() {
        let (dir, library) = library_with_files(&[]);
        let resolved = library.resolve("deleted.wav").unwrap();
        assert_eq!(resolved, canonical_base(&dir).join("deleted.wav"));
    }

    #[test]
    fn test_parent_traversal_is_rejected() {
        let (_dir, library) = library_with_files(&["moien.wav"]);
        for name in ["../secret.txt", "../../../etc/passwd", "a/../../x.wav", "missing/../../x"] {
            match library.resolve(name) {
                Err(PathRejection::OutsideBase(_)) => {}
                other => panic!("{:?} should escape the base, got {:?}", name, other),
            }
        }
    }

    #[test]
    fn test_absolute_filename_is_rejected() {
        let (_dir, library) = library_with_files(&["moien.wav"]);
        assert!(matches!(
            library.resolve("/etc/passwd"),
            Err(PathRejection::OutsideBase(_))
        ));
    }

    #[test]
    fn test_base_directory_itself_is_rejected() {
        let (_dir, library) = library_with_files(&["moien.wav"]);
        for name in [".", "./", "a/..", "moien.wav/.."] {
            assert!(
                matches!(library.resolve(name), Err(PathRejection::OutsideBase(_))),
                "{:?} should resolve to the base and be rejected",
                name
            );
        }
    }

    #[test]
    fn test_sibling_with_shared_prefix_is_rejected() {
        let root = TempDir::new().unwrap();
        let base = root.path().join("audio");
        let sibling = root.path().join("audio-old");
        fs::create_dir_all(&base).unwrap();
        fs::create_dir_all(&sibling).unwrap();
        fs::write(sibling.join("x.wav"), b"RIFF").unwrap();

        let library = AudioLibrary::new(&base);
        assert!(matches!(
            library.resolve("../audio-old/x.wav"),
            Err(PathRejection::OutsideBase(_))
        ));
    }

    #[test]
    fn test_missing_base_directory_fails_canonicalization() {
        let root = TempDir::new().unwrap();
        let library = AudioLibrary::new(root.path().join("nope"));
        assert!(matches!(
            library.resolve("moien.wav"),
            Err(PathRejection::Canonicalize(_))
        ));
    }

    #[test]
    fn test_nul_byte_fails_canonicalization() {
        let (_dir, library) = library_with_files(&[]);
        assert!(matches!(
            library.resolve("bad\0name.wav"),
            Err(PathRejection::Canonicalize(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escaping_base_is_rejected() {
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret.txt"), b"secret").unwrap();

        let (dir, library) = library_with_files(&[]);
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("secret.txt"),
            dir.path().join("secret.wav"),
        )
        .unwrap();

        assert!(matches!(
            library.resolve("link/secret.txt"),
            Err(PathRejection::OutsideBase(_))
        ));
        assert!(matches!(
            library.resolve("secret.wav"),
            Err(PathRejection::OutsideBase(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_within_base_is_followed() {
        let (dir, library) = library_with_files(&["takes/moien_v2.wav"]);
        std::os::unix::fs::symlink(
            dir.path().join("takes").join("moien_v2.wav"),
            dir.path().join("moien.wav"),
        )
        .unwrap();

        let resolved = library.resolve("moien.wav").unwrap();
        assert_eq!(resolved, canonical_base(&dir).join("takes").join("moien_v2.wav"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_loop_fails_canonicalization() {
        let (dir, library) = library_with_files(&[]);
        std::os::unix::fs::symlink(dir.path().join("b"), dir.path().join("a")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("a"), dir.path().join("b")).unwrap();

        assert!(matches!(
            library.resolve("a"),
            Err(PathRejection::Canonicalize(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_within_base_resolves_to_its_target() {
        let (dir, library) = library_with_files(&[]);
        fs::create_dir(dir.path().join("takes")).unwrap();
        std::os::unix::fs::symlink("takes/gone.wav", dir.path().join("moien.wav")).unwrap();

        let resolved = library.resolve("moien.wav").unwrap();
        assert_eq!(resolved, canonical_base(&dir).join("takes").join("gone.wav"));
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_outside_base_is_rejected() {
        let outside = TempDir::new().unwrap();
        let (dir, library) = library_with_files(&[]);
        std::os::unix::fs::symlink(outside.path().join("gone.wav"), dir.path().join("moien.wav"))
            .unwrap();

        assert!(matches!(
            library.resolve("moien.wav"),
            Err(PathRejection::OutsideBase(_))
        ));
    }
}
