use crate::models::PackSettings;
use indexmap::IndexSet;

/// Immutable name sets that drive discovery and staging.
///
/// Built once per run and passed explicitly to every component. All names are
/// stored lower-cased so lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionConfig {
    markers: IndexSet<String>,
    excluded_dirs: IndexSet<String>,
    excluded_extensions: IndexSet<String>,
    ignore_marker: String,
}

impl ExclusionConfig {
    pub fn new<M, D, E>(
        markers: M,
        excluded_dirs: D,
        excluded_extensions: E,
        ignore_marker: &str,
    ) -> Self
    where
        M: IntoIterator,
        M::Item: AsRef<str>,
        D: IntoIterator,
        D::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        Self {
            markers: lowercase_set(markers),
            excluded_dirs: lowercase_set(excluded_dirs),
            excluded_extensions: excluded_extensions
                .into_iter()
                .filter_map(|ext| normalize_extension(ext.as_ref()))
                .collect(),
            ignore_marker: ignore_marker.trim().to_lowercase(),
        }
    }

    /// Build from loaded settings plus extensions given on the command line
    pub fn from_settings<I>(settings: &PackSettings, extra_extensions: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let extensions: Vec<String> = settings
            .excluded_extensions
            .iter()
            .cloned()
            .chain(extra_extensions.into_iter().map(|e| e.as_ref().to_string()))
            .collect();

        Self::new(
            &settings.markers,
            &settings.excluded_dirs,
            extensions,
            &settings.ignore_marker,
        )
    }

    pub fn is_marker(&self, file_name: &str) -> bool {
        self.markers.contains(&file_name.to_lowercase())
    }

    pub fn is_excluded_dir(&self, dir_name: &str) -> bool {
        self.excluded_dirs.contains(&dir_name.to_lowercase())
    }

    pub fn is_ignore_marker(&self, name: &str) -> bool {
        !self.ignore_marker.is_empty() && name.to_lowercase() == self.ignore_marker
    }

    /// True when the file name ends with one of the excluded extensions
    pub fn is_excluded_file(&self, file_name: &str) -> bool {
        if self.excluded_extensions.is_empty() {
            return false;
        }
        let lower = file_name.to_lowercase();
        self.excluded_extensions.iter().any(|ext| {
            lower.len() > ext.len() + 1
                && lower.ends_with(ext.as_str())
                && lower.as_bytes()[lower.len() - ext.len() - 1] == b'.'
        })
    }

    pub fn ignore_marker(&self) -> &str {
        &self.ignore_marker
    }

    pub fn markers(&self) -> impl Iterator<Item = &str> {
        self.markers.iter().map(String::as_str)
    }

    pub fn excluded_extensions(&self) -> impl Iterator<Item = &str> {
        self.excluded_extensions.iter().map(String::as_str)
    }
}

impl Default for ExclusionConfig {
    fn default() -> Self {
        Self::from_settings(&PackSettings::default(), Vec::<String>::new())
    }
}

/// Trim, drop leading dots and lower-case an extension. Empty input yields `None`.
pub fn normalize_extension(ext: &str) -> Option<String> {
    let trimmed = ext.trim().trim_start_matches('.').trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

fn lowercase_set<I>(items: I) -> IndexSet<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    items
        .into_iter()
        .map(|s| s.as_ref().trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> ExclusionConfig {
        ExclusionConfig::new(
            ["README.md", "package.json"],
            ["node_modules", ".git"],
            [".LOG", "tmp", "..bak", "  ", "tar.gz"],
            ".zipignore",
        )
    }

    #[test]
    fn test_markers_case_insensitive() {
        let config = sample();
        assert!(config.is_marker("readme.md"));
        assert!(config.is_marker("README.MD"));
        assert!(config.is_marker("Package.JSON"));
        assert!(!config.is_marker("README.txt"));
    }

    #[test]
    fn test_excluded_dirs_exact_match() {
        let config = sample();
        assert!(config.is_excluded_dir("Node_Modules"));
        assert!(config.is_excluded_dir(".GIT"));
        assert!(!config.is_excluded_dir("node_modules_old"));
        assert!(!config.is_excluded_dir("git"));
    }

    #[test]
    fn test_extension_normalization() {
        let config = sample();
        let exts: Vec<&str> = config.excluded_extensions().collect();
        assert_eq!(exts, vec!["log", "tmp", "bak", "tar.gz"]);
    }

    #[test]
    fn test_excluded_file_matching() {
        let config = sample();
        assert!(config.is_excluded_file("debug.log"));
        assert!(config.is_excluded_file("DEBUG.Log"));
        assert!(config.is_excluded_file("scratch.TMP"));
        assert!(config.is_excluded_file("release.tar.gz"));
        assert!(!config.is_excluded_file("release.gz"));
        assert!(!config.is_excluded_file("catalog"));
        assert!(!config.is_excluded_file("log"));
        assert!(!config.is_excluded_file("main.rs"));
    }

    #[test]
    fn test_ignore_marker() {
        let config = sample();
        assert!(config.is_ignore_marker(".ZipIgnore"));
        assert!(!config.is_ignore_marker("zipignore"));
    }

    #[test]
    fn test_empty_ignore_marker_matches_nothing() {
        let config = ExclusionConfig::new(["a"], ["b"], Vec::<String>::new(), "");
        assert!(!config.is_ignore_marker(""));
    }

    #[test]
    fn test_from_settings_merges_cli_extensions() {
        let mut settings = PackSettings::default();
        settings.excluded_extensions = vec!["log".to_string()];
        let config = ExclusionConfig::from_settings(&settings, [".Tmp", "log"]);

        let exts: Vec<&str> = config.excluded_extensions().collect();
        assert_eq!(exts, vec!["log", "tmp"]);
        assert!(config.is_marker("cargo.toml"));
    }

    proptest! {
        #[test]
        fn prop_extension_normalization_is_stable(ext in "[A-Za-z0-9]{1,8}") {
            let plain = normalize_extension(&ext);
            prop_assert_eq!(&plain, &normalize_extension(&format!(".{}", ext)));
            prop_assert_eq!(&plain, &normalize_extension(&ext.to_uppercase()));
            prop_assert_eq!(plain, Some(ext.to_lowercase()));
        }
    }
}
