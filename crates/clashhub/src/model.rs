//! Domain types: sources, custom links, repository entries and mirror naming.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Directory in the backing repository holding every published document.
pub const MIRROR_DIR: &str = "clash";

/// Path of the custom-links document.
pub const LINKS_PATH: &str = "clash/link.json";

/// Path of the sources document.
pub const SOURCES_PATH: &str = "clash/sources.json";

const MIRROR_PREFIX: &str = "Neat_config";

/// Colour given to newly created links.
pub const DEFAULT_LINK_COLOR: &str = "#3b82f6";

/// Result of a read that may legitimately find nothing.
///
/// `Absent` means the remote answered and the thing does not exist.
/// `Indeterminate` means no strategy produced an answer at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    Absent,
    Indeterminate,
}

impl<T> Lookup<T> {
    #[must_use]
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    #[must_use]
    pub fn is_indeterminate(&self) -> bool {
        matches!(self, Self::Indeterminate)
    }

    /// The found value, if any.
    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            Self::Absent | Self::Indeterminate => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Self::Found(value) => Lookup::Found(f(value)),
            Self::Absent => Lookup::Absent,
            Self::Indeterminate => Lookup::Indeterminate,
        }
    }
}

impl<T: Default> Lookup<T> {
    /// Found value, or the default for both `Absent` and `Indeterminate`.
    pub fn unwrap_or_default(self) -> T {
        self.found().unwrap_or_default()
    }
}

/// One subscription origin URL.
///
/// Blank placeholders are allowed while editing; only entries starting with
/// `http` are published.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceEntry(String);

impl SourceEntry {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this entry should be mirrored.
    #[must_use]
    pub fn is_publishable(&self) -> bool {
        self.0.trim().starts_with("http")
    }
}

impl From<&str> for SourceEntry {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl From<String> for SourceEntry {
    fn from(url: String) -> Self {
        Self(url)
    }
}

impl std::fmt::Display for SourceEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Publishable sources in their original relative order, trimmed.
#[must_use]
pub fn publishable_sources(sources: &[SourceEntry]) -> Vec<SourceEntry> {
    sources
        .iter()
        .filter(|s| s.is_publishable())
        .map(|s| SourceEntry::new(s.as_str().trim()))
        .collect()
}

/// Append every `http` line of a newline-delimited block to `sources`.
///
/// Lines are trimmed; everything else is dropped. Returns how many were added.
pub fn batch_add_sources(sources: &mut Vec<SourceEntry>, block: &str) -> usize {
    let before = sources.len();
    sources.extend(
        block
            .lines()
            .map(str::trim)
            .filter(|line| line.starts_with("http"))
            .map(SourceEntry::new),
    );
    sources.len() - before
}

/// Mirrored filename for the 0-based source `index`.
#[must_use]
pub fn mirror_filename(index: usize) -> String {
    format!("{MIRROR_PREFIX}{}.yml", index + 1)
}

/// Repository path of the mirror for the 0-based source `index`.
#[must_use]
pub fn mirror_path(index: usize) -> String {
    format!("{MIRROR_DIR}/{}", mirror_filename(index))
}

/// Numeric suffix of a mirror file name (`Neat_config<n>.yml|yaml`).
///
/// Suffixes too large for `usize` saturate, so they still count as orphans.
#[must_use]
pub fn mirror_suffix(name: &str) -> Option<usize> {
    let rest = name.strip_prefix(MIRROR_PREFIX)?;
    let digits = rest
        .strip_suffix(".yml")
        .or_else(|| rest.strip_suffix(".yaml"))?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(digits.parse().unwrap_or(usize::MAX))
}

/// Kind of a repository content entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Dir,
    Symlink,
    Submodule,
}

/// Read-only projection of a GitHub content entry.
///
/// `sha` is the optimistic-concurrency token for overwrites and deletes.
/// Entries discovered by probing carry an empty `sha`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoFileDescriptor {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub sha: String,
    #[serde(default)]
    pub size: u64,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
}

impl RepoFileDescriptor {
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.entry_type == EntryType::File
    }

    /// Whether this is a published subscription (`.yml` or `.yaml` file).
    #[must_use]
    pub fn is_subscription(&self) -> bool {
        self.is_file() && (self.name.ends_with(".yml") || self.name.ends_with(".yaml"))
    }

    /// Suffix when this entry follows the mirror naming pattern.
    #[must_use]
    pub fn mirror_suffix(&self) -> Option<usize> {
        mirror_suffix(&self.name)
    }
}

/// One shortcut button on the public page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomLinkEntry {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub color: String,
}

impl CustomLinkEntry {
    /// A blank link with a fresh time-based id.
    #[must_use]
    pub fn draft() -> Self {
        Self {
            id: chrono::Utc::now().timestamp_millis().to_string(),
            name: String::new(),
            url: "https://".to_string(),
            icon: None,
            color: DEFAULT_LINK_COLOR.to_string(),
        }
    }

    /// Whether the icon is an image URL rather than an emoji.
    #[must_use]
    pub fn icon_is_url(&self) -> bool {
        self.icon
            .as_deref()
            .is_some_and(|icon| icon.trim().to_lowercase().starts_with("http"))
    }
}

/// Rejected link edits.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkEditError {
    #[error("link name and url are both required")]
    Incomplete,

    #[error("no link with id {0}")]
    UnknownId(String),
}

/// Replace the link with the same id, or append it.
pub fn upsert_link(
    links: &mut Vec<CustomLinkEntry>,
    link: CustomLinkEntry,
) -> Result<(), LinkEditError> {
    if link.name.trim().is_empty() || link.url.trim().is_empty() {
        return Err(LinkEditError::Incomplete);
    }
    match links.iter_mut().find(|l| l.id == link.id) {
        Some(existing) => *existing = link,
        None => links.push(link),
    }
    Ok(())
}

/// Remove the link with `id`.
pub fn remove_link(links: &mut Vec<CustomLinkEntry>, id: &str) -> Result<CustomLinkEntry, LinkEditError> {
    let position = links
        .iter()
        .position(|l| l.id == id)
        .ok_or_else(|| LinkEditError::UnknownId(id.to_string()))?;
    Ok(links.remove(position))
}

/// Id for a new link that does not collide with existing ones.
#[must_use]
pub fn next_link_id(links: &[CustomLinkEntry]) -> String {
    let mut candidate = chrono::Utc::now().timestamp_millis();
    while links.iter().any(|l| l.id == candidate.to_string()) {
        candidate += 1;
    }
    candidate.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources(urls: &[&str]) -> Vec<SourceEntry> {
        urls.iter().map(|u| SourceEntry::from(*u)).collect()
    }

    fn link(id: &str, name: &str) -> CustomLinkEntry {
        CustomLinkEntry {
            id: id.to_string(),
            name: name.to_string(),
            url: format!("https://{name}.example"),
            icon: None,
            color: DEFAULT_LINK_COLOR.to_string(),
        }
    }

    #[test]
    fn publishable_sources_drop_blanks_and_keep_order() {
        let filtered = publishable_sources(&sources(&[
            "https://a/x.yaml",
            "",
            "  ",
            "ftp://nope",
            " https://b/y.yaml ",
        ]));
        assert_eq!(filtered, sources(&["https://a/x.yaml", "https://b/y.yaml"]));
    }

    #[test]
    fn batch_add_appends_only_http_lines_in_order() {
        let mut list = sources(&["https://existing"]);
        let added = batch_add_sources(
            &mut list,
            "https://one\nnot a url\n\n  http://two  \r\nftp://three\nhttps://four",
        );
        assert_eq!(added, 3);
        assert_eq!(
            list,
            sources(&["https://existing", "https://one", "http://two", "https://four"])
        );
    }

    #[test]
    fn mirror_names_are_one_indexed() {
        assert_eq!(mirror_filename(0), "Neat_config1.yml");
        assert_eq!(mirror_path(9), "clash/Neat_config10.yml");
    }

    #[test]
    fn mirror_suffix_accepts_only_the_naming_pattern() {
        assert_eq!(mirror_suffix("Neat_config1.yml"), Some(1));
        assert_eq!(mirror_suffix("Neat_config12.yaml"), Some(12));
        assert_eq!(mirror_suffix("Neat_config.yml"), None);
        assert_eq!(mirror_suffix("Neat_config3.json"), None);
        assert_eq!(mirror_suffix("Neat_config3a.yml"), None);
        assert_eq!(mirror_suffix("other1.yml"), None);
        assert_eq!(mirror_suffix("link.json"), None);
        assert_eq!(mirror_suffix("Neat_config007.yml"), Some(7));
        assert_eq!(
            mirror_suffix("Neat_config99999999999999999999.yml"),
            Some(usize::MAX)
        );
    }

    #[test]
    fn lookup_helpers() {
        assert_eq!(Lookup::Found(vec![1]).unwrap_or_default(), vec![1]);
        assert_eq!(Lookup::<Vec<u8>>::Absent.unwrap_or_default(), Vec::<u8>::new());
        assert!(Lookup::<u8>::Indeterminate.is_indeterminate());
        assert_eq!(Lookup::Found(2).map(|v| v * 2), Lookup::Found(4));
    }

    #[test]
    fn descriptor_parses_github_listing_entry() {
        let json = serde_json::json!({
            "name": "Neat_config2.yml",
            "path": "clash/Neat_config2.yml",
            "sha": "abc",
            "size": 120,
            "url": "https://api.github.com/...",
            "html_url": "https://github.com/o/r/blob/main/clash/Neat_config2.yml",
            "git_url": "https://api.github.com/...",
            "download_url": "https://raw.githubusercontent.com/o/r/main/clash/Neat_config2.yml",
            "type": "file"
        });
        let entry: RepoFileDescriptor = serde_json::from_value(json).expect("valid entry");
        assert_eq!(entry.mirror_suffix(), Some(2));
        assert!(entry.is_subscription());
        assert_eq!(entry.size, 120);
    }

    #[test]
    fn upsert_replaces_by_id_or_appends() {
        let mut links = vec![link("1", "docs")];
        upsert_link(&mut links, link("2", "blog")).expect("valid link");
        let mut renamed = link("1", "manual");
        renamed.icon = Some("📘".to_string());
        upsert_link(&mut links, renamed).expect("valid link");

        assert_eq!(links.len(), 2);
        assert_eq!(links[0].name, "manual");
        assert_eq!(links[1].name, "blog");
    }

    #[test]
    fn upsert_rejects_incomplete_links() {
        let mut links = Vec::new();
        let mut draft = CustomLinkEntry::draft();
        assert_eq!(upsert_link(&mut links, draft.clone()), Err(LinkEditError::Incomplete));
        draft.name = "Site".to_string();
        upsert_link(&mut links, draft).expect("name and url set");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].color, DEFAULT_LINK_COLOR);
    }

    #[test]
    fn remove_link_reports_unknown_ids() {
        let mut links = vec![link("1", "docs")];
        assert_eq!(
            remove_link(&mut links, "9"),
            Err(LinkEditError::UnknownId("9".to_string()))
        );
        assert_eq!(remove_link(&mut links, "1").map(|l| l.name), Ok("docs".to_string()));
        assert!(links.is_empty());
    }

    #[test]
    fn next_link_id_skips_existing_ids() {
        let first = next_link_id(&[]);
        let links = vec![link(&first, "a")];
        assert_ne!(next_link_id(&links), first);
    }

    #[test]
    fn icon_url_detection() {
        let mut entry = link("1", "a");
        assert!(!entry.icon_is_url());
        entry.icon = Some("HTTPS://cdn.example/icon.png".to_string());
        assert!(entry.icon_is_url());
        entry.icon = Some("🚀".to_string());
        assert!(!entry.icon_is_url());
    }
}
