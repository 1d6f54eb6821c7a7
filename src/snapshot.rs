//! Offline snapshot of a local directory tree for the static file browser.
//!
//! Folders map to nested children keyed `name/`, images carry size and
//! dimension labels from an [`ImageProber`], other files carry a label
//! computed from their real byte size.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::Result;
use crate::upload::extension_of;

pub const OUTPUT_FILE: &str = "directory-data.json";

/// Version control, dependency and generated entries never included
pub const DEFAULT_EXCLUDES: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    ".idea",
    ".DS_Store",
    ".gitignore",
    "README.md",
    OUTPUT_FILE,
];

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "svg", "bmp"];

const FALLBACK_SIZE: &str = "1MB";
const FALLBACK_DIMENSIONS: &str = "unknown";

pub type DirectoryTree = BTreeMap<String, DirectoryNode>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DirectoryNode {
    Folder {
        children: DirectoryTree,
    },
    Image {
        size: String,
        dimensions: String,
        path: String,
        url: String,
    },
    File {
        size: String,
        path: String,
        url: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageLabels {
    pub size: String,
    pub dimensions: String,
}

/// Supplies the labels shown for image files
pub trait ImageProber {
    fn probe(&mut self, path: &Path, extension: &str) -> ImageLabels;
}

/// Placeholder labels picked at random from fixed per-extension pools
///
/// Nothing is read from the image; the values are sample data.
pub struct PlaceholderProber<R = StdRng> {
    rng: R,
}

impl PlaceholderProber<StdRng> {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl Default for PlaceholderProber<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> PlaceholderProber<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }
}

/// Candidate (sizes, dimensions) for an extension
pub fn candidate_pools(extension: &str) -> Option<(&'static [&'static str], &'static [&'static str])> {
    match extension {
        "jpg" => Some((
            &["2.3MB", "4.1MB", "3.2MB", "2.8MB"],
            &["1920x1080", "3840x2160", "2560x1440", "1920x1080"],
        )),
        "png" => Some((&["1.8MB", "1.5MB", "120KB"], &["1280x720", "1920x1080", "200x200"])),
        "webp" => Some((&["950KB"], &["800x600"])),
        "svg" => Some((&["45KB"], &["SVG"])),
        "gif" => Some((&["1.2MB"], &["800x600"])),
        _ => None,
    }
}

impl<R: Rng> ImageProber for PlaceholderProber<R> {
    fn probe(&mut self, _path: &Path, extension: &str) -> ImageLabels {
        match candidate_pools(extension) {
            Some((sizes, dimensions)) => ImageLabels {
                size: sizes.choose(&mut self.rng).unwrap_or(&FALLBACK_SIZE).to_string(),
                dimensions: dimensions
                    .choose(&mut self.rng)
                    .unwrap_or(&FALLBACK_DIMENSIONS)
                    .to_string(),
            },
            None => ImageLabels {
                size: FALLBACK_SIZE.to_string(),
                dimensions: FALLBACK_DIMENSIONS.to_string(),
            },
        }
    }
}

/// Whole kilobytes, or megabytes with one decimal above 1024 KB
pub fn size_label(bytes: u64) -> String {
    let kb = bytes / 1024;
    if kb > 1024 {
        format!("{:.1}MB", kb as f64 / 1024.0)
    } else {
        format!("{}KB", kb)
    }
}

pub fn is_image(extension: &str) -> bool {
    IMAGE_EXTENSIONS.contains(&extension)
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub excludes: Vec<String>,
    /// Also drop every entry whose name starts with `.`
    pub skip_hidden: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            excludes: DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect(),
            skip_hidden: false,
        }
    }
}

impl ScanOptions {
    pub fn is_excluded(&self, name: &str) -> bool {
        (self.skip_hidden && name.starts_with('.')) || self.excludes.iter().any(|e| e == name)
    }
}

fn folder_key(name: &str) -> String {
    format!("{}/", name)
}

/// Walk down to the children of the folder named by `parents`
fn folder_mut<'t>(tree: &'t mut DirectoryTree, parents: &[String]) -> Option<&'t mut DirectoryTree> {
    let mut current = tree;
    for parent in parents {
        let node = current.get_mut(&folder_key(parent))?;
        current = match node {
            DirectoryNode::Folder { children } => children,
            _ => return None,
        };
    }
    Some(current)
}

pub struct Scanner<P> {
    options: ScanOptions,
    prober: P,
}

impl<P: ImageProber> Scanner<P> {
    pub fn new(options: ScanOptions, prober: P) -> Self {
        Self { options, prober }
    }

    /// Build the tree below `root`; any filesystem error aborts the scan
    pub fn scan(&mut self, root: &Path) -> Result<DirectoryTree> {
        let mut tree = DirectoryTree::new();
        let options = &self.options;

        let walker = WalkDir::new(root)
            .min_depth(1)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !options.is_excluded(&e.file_name().to_string_lossy()));

        for entry in walker {
            let entry = entry.map_err(std::io::Error::from)?;
            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            let parts: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            let Some((name, parents)) = parts.split_last() else {
                continue;
            };
            let rel_path = parts.join("/");

            let node = if entry.file_type().is_dir() {
                DirectoryNode::Folder {
                    children: DirectoryTree::new(),
                }
            } else {
                let ext = extension_of(name);
                if is_image(&ext) {
                    let labels = self.prober.probe(entry.path(), &ext);
                    DirectoryNode::Image {
                        size: labels.size,
                        dimensions: labels.dimensions,
                        path: rel_path.clone(),
                        url: rel_path,
                    }
                } else {
                    let bytes = entry.metadata().map_err(std::io::Error::from)?.len();
                    DirectoryNode::File {
                        size: size_label(bytes),
                        path: rel_path.clone(),
                        url: rel_path,
                    }
                }
            };

            let key = match node {
                DirectoryNode::Folder { .. } => folder_key(name),
                _ => name.clone(),
            };
            debug!(%key, "scanned entry");
            if let Some(folder) = folder_mut(&mut tree, parents) {
                folder.insert(key, node);
            }
        }

        Ok(tree)
    }
}

/// Write the tree as pretty-printed JSON
pub fn write_document(tree: &DirectoryTree, output: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(tree)?;
    std::fs::write(output, json)?;
    info!(output = %output.display(), "directory data written");
    Ok(())
}

/// Indented outline of the tree, one entry per line
pub fn render_tree(tree: &DirectoryTree) -> String {
    fn render(tree: &DirectoryTree, prefix: &str, out: &mut String) {
        for (key, node) in tree {
            let _ = writeln!(out, "{}{}", prefix, key);
            if let DirectoryNode::Folder { children } = node {
                render(children, &format!("{}  ", prefix), out);
            }
        }
    }

    let mut out = String::new();
    render(tree, "", &mut out);
    out
}

pub fn default_output(root: &Path) -> PathBuf {
    root.join(OUTPUT_FILE)
}
