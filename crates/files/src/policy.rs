//! Extension allow-listing for uploads.

use crate::config::ExtensionSet;

/// Why an extension was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtensionRejection {
    #[error("no-extension files not permitted")]
    NoExtension,

    #[error("file extension not permitted: {0:?}")]
    NotPermitted(String),
}

/// Returns the extension of `filename`: everything from the last `.` of its final path element,
/// or `""` when that element has no `.`.
///
/// `"archive.tar.gz"` yields `".gz"` and `".bashrc"` yields `".bashrc"`.
pub fn extension_of(filename: &str) -> &str {
    let base_start = filename.rfind(|c: char| c == '/' || c == '\\').map_or(0, |i| i + 1);
    let base = &filename[base_start..];
    match base.rfind('.') {
        Some(dot) => &base[dot..],
        None => "",
    }
}

/// Pure predicate over upload extensions.
///
/// Matching is verbatim: case-sensitive and including the leading dot.
#[derive(Debug, Clone)]
pub struct ExtensionPolicy {
    allowed: ExtensionSet,
    allow_no_extension: bool,
}

impl ExtensionPolicy {
    pub fn new(allowed: ExtensionSet, allow_no_extension: bool) -> Self {
        Self {
            allowed,
            allow_no_extension,
        }
    }

    /// Checks `extension` as produced by [`extension_of`].
    ///
    /// An empty extension is judged by the no-extension flag before the allow-list is consulted,
    /// so it is rejected even under [`ExtensionSet::All`] when that flag is off.
    pub fn check(&self, extension: &str) -> Result<(), ExtensionRejection> {
        if extension.is_empty() && !self.allow_no_extension {
            return Err(ExtensionRejection::NoExtension);
        }
        match &self.allowed {
            ExtensionSet::All => Ok(()),
            ExtensionSet::Only(list) if list.iter().any(|e| e == extension) => Ok(()),
            ExtensionSet::Only(_) => Err(ExtensionRejection::NotPermitted(extension.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("photo.png"), ".png");
        assert_eq!(extension_of("archive.tar.gz"), ".gz");
        assert_eq!(extension_of("README"), "");
        assert_eq!(extension_of(".bashrc"), ".bashrc");
        assert_eq!(extension_of("trailing."), ".");
        assert_eq!(extension_of("dir.d/README"), "");
        assert_eq!(extension_of("C:\\Users\\me\\scan.PDF"), ".PDF");
        assert_eq!(extension_of(""), "");
    }

    #[test]
    fn test_allow_list_is_case_sensitive() {
        let policy = ExtensionPolicy::new(ExtensionSet::only([".png"]), false);
        assert!(policy.check(".png").is_ok());
        assert_eq!(
            policy.check(".PNG"),
            Err(ExtensionRejection::NotPermitted(".PNG".into()))
        );
        assert_eq!(
            policy.check("png"),
            Err(ExtensionRejection::NotPermitted("png".into()))
        );
    }

    #[test]
    fn test_no_extension_rejected_before_allow_all() {
        let policy = ExtensionPolicy::new(ExtensionSet::All, false);
        assert_eq!(policy.check(""), Err(ExtensionRejection::NoExtension));
        assert!(policy.check(".anything").is_ok());
    }

    #[test]
    fn test_no_extension_allowed_still_consults_list() {
        let open = ExtensionPolicy::new(ExtensionSet::All, true);
        assert!(open.check("").is_ok());

        let listed = ExtensionPolicy::new(ExtensionSet::only([".txt"]), true);
        assert_eq!(
            listed.check(""),
            Err(ExtensionRejection::NotPermitted(String::new()))
        );

        let listed_with_empty = ExtensionPolicy::new(ExtensionSet::only([".txt", ""]), true);
        assert!(listed_with_empty.check("").is_ok());
    }

    #[test]
    fn test_image_preset() {
        let policy = ExtensionPolicy::new(ExtensionSet::images(), false);
        for ext in [".png", ".jpeg", ".webp", ".svg"] {
            assert!(policy.check(ext).is_ok(), "{ext} should be allowed");
        }
        assert!(policy.check(".txt").is_err());
        assert!(policy.check(".exe").is_err());
    }
}
