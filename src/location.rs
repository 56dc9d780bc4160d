use crate::log::{Error, INVALID_CODE_STRING};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    fs::{self, File},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::SystemTime,
};

/// Package that every generated template class belongs to.
pub const GENERATED_PACKAGE: &str = "fastergt.generated_templates";

/// Suffix appended to a template class name to name its expression class.
pub const EXPRESSION_SUFFIX: &str = "G";

/// Characters of a relative path that are replaced before deriving a class name.
static PATH_SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[{}/\\.:!]").expect("path separator pattern is valid"));

/// Strings that may be used as part of a method or class name.
static VALID_CODE_STRING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_0-9@]+$").expect("code string pattern is valid"));

static NEXT_EMBEDDED_KEY: AtomicUsize = AtomicUsize::new(1);

/// Identifies a template by its relative path.
///
/// The relative path is the cache key of the compiled template, and the only
/// input used to derive its class name.
#[derive(Debug, Clone)]
pub struct TemplateLocation {
    relative_path: String,
    origin: Origin,
}

/// Where the source of a [`TemplateLocation`] comes from.
#[derive(Debug, Clone)]
enum Origin {
    /// A file on disk, which supports modification detection.
    File(PathBuf),
    /// Source held in memory, which never changes.
    Embedded(Arc<str>),
}

/// Size and modification time of a template source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl TemplateLocation {
    /// Create a [`TemplateLocation`] backed by the file at `path`.
    pub fn file<R, P>(relative_path: R, path: P) -> Self
    where
        R: Into<String>,
        P: Into<PathBuf>,
    {
        Self {
            relative_path: relative_path.into(),
            origin: Origin::File(path.into()),
        }
    }

    /// Create a [`TemplateLocation`] for the given in-memory source, with a
    /// generated unique relative path.
    ///
    /// # Examples
    ///
    /// ```
    /// use fastergt::TemplateLocation;
    ///
    /// let location = TemplateLocation::embedded("Hello ${name}!");
    /// assert!(location.relative_path().contains("_generated_key_"));
    /// ```
    pub fn embedded<S>(source: S) -> Self
    where
        S: Into<String>,
    {
        let key = NEXT_EMBEDDED_KEY.fetch_add(1, Ordering::Relaxed);

        Self::embedded_at(format!("embedded_generated_key_{key}"), source)
    }

    /// Create a [`TemplateLocation`] for the given in-memory source, under a
    /// chosen relative path.
    ///
    /// The extension of the path selects the escaping policy.
    pub fn embedded_at<R, S>(relative_path: R, source: S) -> Self
    where
        R: Into<String>,
        S: Into<String>,
    {
        let source: String = source.into();

        Self {
            relative_path: relative_path.into(),
            origin: Origin::Embedded(Arc::from(source)),
        }
    }

    /// Return the relative path.
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    /// Return the path of the backing file, if there is one.
    pub fn path(&self) -> Option<&Path> {
        match &self.origin {
            Origin::File(path) => Some(path),
            Origin::Embedded(_) => None,
        }
    }

    /// Return true if the source is held in memory.
    pub fn is_embedded(&self) -> bool {
        matches!(self.origin, Origin::Embedded(_))
    }

    /// Return the extension of the relative path, without the leading dot.
    pub fn extension(&self) -> Option<&str> {
        let name = self.relative_path.rsplit('/').next()?;
        let (_, extension) = name.rsplit_once('.')?;

        Some(extension)
    }

    /// Return the folder of the relative path, including the trailing slash.
    ///
    /// Returns an empty string for templates at the root.
    pub fn folder(&self) -> &str {
        match self.relative_path.rfind('/') {
            Some(index) => &self.relative_path[..=index],
            None => "",
        }
    }

    /// Read the whole source.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the backing file cannot be read.
    pub fn read_source(&self) -> Result<String, Error> {
        match &self.origin {
            Origin::File(path) => fs::read_to_string(path).map_err(|e| {
                Error::compilation(format!("Error reading resource {}", path.display()))
                    .with_help(e.to_string())
            }),
            Origin::Embedded(source) => Ok(source.to_string()),
        }
    }

    /// Check that the source is readable by opening it.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the backing file cannot be opened.
    pub fn probe(&self) -> Result<(), Error> {
        match &self.origin {
            Origin::File(path) => File::open(path)
                .map(drop)
                .map_err(|_| Error::not_found(format!("Cannot find template {}", self.relative_path))),
            Origin::Embedded(_) => Ok(()),
        }
    }

    /// Return the current [`FileInfo`] of the backing file.
    ///
    /// Returns `None` for embedded sources, or when the file is gone.
    pub fn file_info(&self) -> Option<FileInfo> {
        match &self.origin {
            Origin::File(path) => {
                let metadata = fs::metadata(path).ok()?;

                Some(FileInfo {
                    size: metadata.len(),
                    modified: metadata.modified().ok(),
                })
            }
            Origin::Embedded(_) => None,
        }
    }

    /// Return the fully qualified class name of the template.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the relative path contains characters that
    /// cannot be part of a class name.
    pub fn class_name(&self) -> Result<String, Error> {
        Ok(format!(
            "{GENERATED_PACKAGE}.{}",
            template_class_name(&self.relative_path)?
        ))
    }
}

impl Display for TemplateLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.relative_path)
    }
}

/// Derive the simple class name of a template from its relative path.
///
/// # Examples
///
/// ```
/// use fastergt::location::template_class_name;
///
/// assert_eq!(
///     template_class_name("views/Application/index.html").unwrap(),
///     "GTTemplate_views_application_index_html"
/// );
/// ```
pub fn template_class_name(relative_path: &str) -> Result<String, Error> {
    let replaced = PATH_SEPARATORS.replace_all(relative_path, "_");

    Ok(format!("GTTemplate_{}", fix_for_code(&replaced)?.to_lowercase()))
}

/// Return a string that can be used as part of a method or class name.
///
/// Tag names may contain dots, dashes and at-signs, which are replaced with
/// fixed sequences.
///
/// # Errors
///
/// Returns an [`Error`] if other characters remain.
pub fn fix_for_code(text: &str) -> Result<String, Error> {
    let fixed = text
        .replace('.', "_1")
        .replace('-', "_2")
        .replace('@', "_3");

    if !VALID_CODE_STRING.is_match(&fixed) {
        return Err(Error::compilation(format!("{INVALID_CODE_STRING}: '{fixed}'")));
    }

    Ok(fixed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_class_name_replaces_separators() -> Result<(), Error> {
        assert_eq!(
            template_class_name("tags/my-tag.html")?,
            "GTTemplate_tags_my_2tag_html"
        );
        assert_eq!(
            TemplateLocation::embedded_at("a/B.txt", "").class_name()?,
            "fastergt.generated_templates.GTTemplate_a_b_txt"
        );

        Ok(())
    }

    #[test]
    fn test_invalid_code_string() {
        let error = fix_for_code("a b").unwrap_err();

        assert!(error.reason().starts_with(INVALID_CODE_STRING));
    }

    #[test]
    fn test_embedded_keys_are_unique() {
        let a = TemplateLocation::embedded("x");
        let b = TemplateLocation::embedded("x");

        assert_ne!(a.relative_path(), b.relative_path());
        assert!(a.file_info().is_none());
    }

    #[test]
    fn test_extension_and_folder() {
        let location = TemplateLocation::embedded_at("views/main.html", "");

        assert_eq!(location.extension(), Some("html"));
        assert_eq!(location.folder(), "views/");
        assert_eq!(TemplateLocation::embedded_at("a", "").extension(), None);
    }

    #[test]
    fn test_file_info_and_probe() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("index.html");
        File::create(&path)?.write_all(b"Hello")?;

        let location = TemplateLocation::file("index.html", &path);
        location.probe()?;
        assert_eq!(location.file_info().map(|info| info.size), Some(5));
        assert_eq!(location.read_source()?, "Hello");

        let missing = TemplateLocation::file("gone.html", dir.path().join("gone.html"));
        assert!(missing.probe().is_err());

        Ok(())
    }
}
