use std::{
    fs::{DirEntry, Metadata},
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::trace;
use tunnelconf_core::{is_valid_tunnel_name, ConfError, NameValidator};

/// Suffix of sealed configuration files.
pub const ENCRYPTED_SUFFIX: &str = ".conf.dpapi";
/// Suffix of legacy plaintext configuration files.
pub const LEGACY_SUFFIX: &str = ".conf";

/// Maps tunnel names to files in the configuration directory and back.
#[derive(Clone)]
pub struct NameCodec {
    dir: PathBuf,
    validator: Arc<dyn NameValidator>,
}

impl NameCodec {
    /// Codec using the default tunnel name rule.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_validator(dir, Arc::new(is_valid_tunnel_name))
    }

    pub fn with_validator(dir: impl Into<PathBuf>, validator: Arc<dyn NameValidator>) -> Self {
        Self {
            dir: dir.into(),
            validator,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_valid(&self, name: &str) -> bool {
        self.validator.is_valid(name)
    }

    /// `Ok(())` for a valid name, `InvalidName` otherwise.
    pub fn check(&self, name: &str) -> Result<(), ConfError> {
        if self.is_valid(name) {
            Ok(())
        } else {
            Err(ConfError::invalid_name(name))
        }
    }

    pub fn path_for(&self, name: &str, encrypted: bool) -> PathBuf {
        let suffix = if encrypted {
            ENCRYPTED_SUFFIX
        } else {
            LEGACY_SUFFIX
        };
        self.dir.join(format!("{name}{suffix}"))
    }

    /// Tunnel name encoded in `path`'s file name.
    pub fn name_from_path(&self, path: &Path) -> Result<String, ConfError> {
        let file_name = base_name(path);
        let name = trim_suffix(&file_name, ENCRYPTED_SUFFIX)
            .or_else(|| trim_suffix(&file_name, LEGACY_SUFFIX))
            .ok_or_else(|| ConfError::invalid_name(file_name.to_string()))?;
        self.check(name)?;
        Ok(name.to_string())
    }

    /// Valid sealed-record names in `entries`, in enumeration order.
    ///
    /// Anything that is not a readable regular `.conf.dpapi` file with a valid
    /// name is skipped silently: it is simply not a configuration.
    pub fn names_from_listing<I>(&self, entries: I) -> Vec<String>
    where
        I: IntoIterator<Item = io::Result<DirEntry>>,
    {
        entries
            .into_iter()
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let file_name = entry.file_name().to_string_lossy().into_owned();
                let name = trim_suffix(&file_name, ENCRYPTED_SUFFIX)?;
                if !is_readable_file(&entry.metadata().ok()?) {
                    trace!(file = %file_name, "skipping unreadable entry");
                    return None;
                }
                if !self.is_valid(name) {
                    trace!(file = %file_name, "skipping entry with invalid name");
                    return None;
                }
                Some(name.to_string())
            })
            .collect()
    }

    /// Legacy plaintext files in `entries` that are migration candidates.
    pub fn legacy_candidates<I>(&self, entries: I) -> Vec<PathBuf>
    where
        I: IntoIterator<Item = io::Result<DirEntry>>,
    {
        entries
            .into_iter()
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let file_name = entry.file_name().to_string_lossy().into_owned();
                trim_suffix(&file_name, LEGACY_SUFFIX)?;
                is_readable_file(&entry.metadata().ok()?).then(|| entry.path())
            })
            .collect()
    }
}

impl std::fmt::Debug for NameCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameCodec")
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

/// Whether `path`'s file name carries the sealed suffix.
pub fn is_encrypted_path(path: &Path) -> bool {
    base_name(path).ends_with(ENCRYPTED_SUFFIX)
}

fn base_name(path: &Path) -> std::borrow::Cow<'_, str> {
    path.file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default()
}

/// `file_name` without `suffix`, only if something remains.
fn trim_suffix<'a>(file_name: &'a str, suffix: &str) -> Option<&'a str> {
    file_name.strip_suffix(suffix).filter(|name| !name.is_empty())
}

/// Regular file (symlinks are not followed) that its owner may read.
fn is_readable_file(metadata: &Metadata) -> bool {
    if !metadata.file_type().is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o400 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn codec(dir: &Path) -> NameCodec {
        NameCodec::new(dir)
    }

    #[test]
    fn name_from_path_trims_either_suffix() {
        let codec = codec(Path::new("/configs"));
        assert_eq!(
            codec.name_from_path(Path::new("foo.conf.dpapi")).unwrap(),
            "foo"
        );
        assert_eq!(codec.name_from_path(Path::new("foo.conf")).unwrap(), "foo");
        assert_eq!(
            codec
                .name_from_path(Path::new("/elsewhere/bar.conf.dpapi"))
                .unwrap(),
            "bar"
        );
    }

    #[test]
    fn name_from_path_rejects_other_files() {
        let codec = codec(Path::new("/configs"));
        for path in ["foo.txt", ".conf", ".conf.dpapi", "bad name.conf", "", "/"] {
            let err = codec
                .name_from_path(Path::new(path))
                .expect_err("must be rejected");
            assert!(matches!(err, ConfError::InvalidName { .. }), "{path}");
        }
    }

    #[test]
    fn path_for_joins_dir_name_and_suffix() {
        let codec = codec(Path::new("/configs"));
        assert_eq!(
            codec.path_for("home", true),
            PathBuf::from("/configs/home.conf.dpapi")
        );
        assert_eq!(
            codec.path_for("home", false),
            PathBuf::from("/configs/home.conf")
        );
    }

    #[test]
    fn encrypted_path_detection_uses_file_name() {
        assert!(is_encrypted_path(Path::new("/a/b/home.conf.dpapi")));
        assert!(!is_encrypted_path(Path::new("/a/b/home.conf")));
        assert!(!is_encrypted_path(Path::new("/a/x.conf.dpapi/home.txt")));
    }

    #[test]
    fn listing_keeps_only_valid_sealed_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        for file in [
            "home.conf.dpapi",
            "office.conf.dpapi",
            "legacy.conf",
            "notes.txt",
            ".conf.dpapi",
            "bad name.conf.dpapi",
        ] {
            fs::write(root.join(file), b"x").expect("write");
        }
        fs::create_dir(root.join("dir.conf.dpapi")).expect("mkdir");

        let codec = codec(root);
        let mut names = codec.names_from_listing(fs::read_dir(root).expect("read_dir"));
        names.sort();
        assert_eq!(names, vec!["home".to_string(), "office".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn listing_skips_files_the_owner_cannot_read() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let locked = dir.path().join("locked.conf.dpapi");
        fs::write(&locked, b"x").expect("write");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o200)).expect("chmod");
        fs::write(dir.path().join("open.conf.dpapi"), b"x").expect("write");

        let codec = codec(dir.path());
        let names = codec.names_from_listing(fs::read_dir(dir.path()).expect("read_dir"));
        assert_eq!(names, vec!["open".to_string()]);
    }

    #[test]
    fn custom_validator_is_honored() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("home.conf.dpapi"), b"x").expect("write");
        fs::write(dir.path().join("office.conf.dpapi"), b"x").expect("write");

        let codec = NameCodec::with_validator(dir.path(), Arc::new(|n: &str| n == "office"));
        let names = codec.names_from_listing(fs::read_dir(dir.path()).expect("read_dir"));
        assert_eq!(names, vec!["office".to_string()]);
        assert!(codec.check("home").is_err());
    }

    #[test]
    fn legacy_candidates_are_plain_conf_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        for file in ["old.conf", "new.conf.dpapi", ".conf", "readme.md"] {
            fs::write(dir.path().join(file), b"x").expect("write");
        }
        let codec = codec(dir.path());
        let candidates = codec.legacy_candidates(fs::read_dir(dir.path()).expect("read_dir"));
        assert_eq!(candidates, vec![dir.path().join("old.conf")]);
    }
}
