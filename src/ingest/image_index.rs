//! Local chart image index
//!
//! Images live under the image root as `<task>/.../<example_id>.<ext>`.
//! Lookup tries, in order: the task index, chart path fields of the item,
//! the global name index (unique stems only), then `<root>/<id>.<ext>`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::aliases::{pick_string, AliasTable};
use crate::types::normalize_task;

/// Chart paths already given relative to the project root
static PROJECT_RELATIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(\./)?images/chart-?only/").expect("valid regex"));

/// A local image found for an example
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalImage {
    pub path: PathBuf,
    /// Path under the image root, `/`-separated
    pub relative: String,
}

#[derive(Debug, Default)]
pub struct ImageIndex {
    root: PathBuf,
    extensions: Vec<String>,
    by_task: HashMap<String, HashMap<String, PathBuf>>,
    by_name: HashMap<String, PathBuf>,
    files: usize,
}

impl ImageIndex {
    /// Walk `root` and index every image with a known extension
    pub fn build(root: &Path, extensions: &[String]) -> Self {
        let extensions: Vec<String> = extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .collect();
        let mut index = Self {
            root: root.to_path_buf(),
            extensions,
            ..Self::default()
        };
        let mut collisions: Vec<String> = Vec::new();

        for entry in WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            if !index.has_image_extension(path) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let stem = stem.to_string();
            index.files += 1;

            let Ok(rel) = path.strip_prefix(root) else {
                continue;
            };
            // Only files inside a task folder belong to a task
            if rel.components().count() > 1 {
                if let Some(task) = rel.components().next().and_then(|c| c.as_os_str().to_str()) {
                    index
                        .by_task
                        .entry(normalize_task(task))
                        .or_default()
                        .entry(stem.clone())
                        .or_insert_with(|| path.to_path_buf());
                }
            }

            match index.by_name.get(&stem) {
                Some(existing) if existing != path => collisions.push(stem),
                Some(_) => {}
                None => {
                    index.by_name.insert(stem, path.to_path_buf());
                }
            }
        }

        for stem in collisions {
            index.by_name.remove(&stem);
        }

        debug!(
            "Indexed {} images ({} tasks, {} unique names)",
            index.files,
            index.by_task.len(),
            index.by_name.len()
        );
        index
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn file_count(&self) -> usize {
        self.files
    }

    fn has_image_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|known| known.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }

    /// Find the chart image of `task/example_id`
    pub fn resolve(&self, task: &str, example_id: &str, item: &Value, aliases: &AliasTable) -> Option<LocalImage> {
        if let Some(path) = self
            .by_task
            .get(&normalize_task(task))
            .and_then(|ids| ids.get(example_id))
        {
            return self.local(path.clone());
        }

        if let Some(chart_path) = pick_string(item, &aliases.chart_path) {
            let norm = chart_path.replace('\\', "/");
            let mut candidates: Vec<PathBuf> = Vec::new();
            if PROJECT_RELATIVE.is_match(&norm) {
                candidates.push(PathBuf::from(norm.trim_start_matches("./")));
            }
            candidates.push(self.root.join(&norm));
            if let Some(base) = Path::new(&norm).file_name() {
                candidates.push(self.root.join(task).join(base));
            }
            if let Some(found) = candidates.into_iter().find(|c| c.is_file()) {
                return self.local(found);
            }
        }

        if let Some(path) = self.by_name.get(example_id) {
            return self.local(path.clone());
        }

        self.extensions
            .iter()
            .map(|ext| self.root.join(format!("{}.{}", example_id, ext)))
            .find(|guess| guess.is_file())
            .and_then(|guess| self.local(guess))
    }

    fn local(&self, path: PathBuf) -> Option<LocalImage> {
        let relative = relative_to(&self.root, &path)?;
        Some(LocalImage { path, relative })
    }
}

/// `/`-separated path of `path` under `root`
fn relative_to(root: &Path, path: &Path) -> Option<String> {
    let rel = path
        .strip_prefix(root)
        .ok()
        .map(Path::to_path_buf)
        .or_else(|| {
            // Project-root candidates may spell the root differently
            let root = root.canonicalize().ok()?;
            let path = path.canonicalize().ok()?;
            path.strip_prefix(root).ok().map(Path::to_path_buf)
        })?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    Some(parts.join("/"))
}

/// Object key of an image: `<prefix>/<relative>`
pub fn storage_key(prefix: &str, image: &LocalImage) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        image.relative.clone()
    } else {
        format!("{}/{}", prefix, image.relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"png").unwrap();
    }

    fn exts() -> Vec<String> {
        vec![".png".to_string(), ".jpg".to_string()]
    }

    #[test]
    fn test_task_index_wins() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "bar/bar-0.png");
        touch(dir.path(), "other/bar-0.png");
        touch(dir.path(), "bar/notes.txt");

        let index = ImageIndex::build(dir.path(), &exts());
        assert_eq!(index.file_count(), 2);
        let hit = index
            .resolve("Bar", "bar-0", &json!({}), &AliasTable::default())
            .unwrap();
        assert_eq!(hit.relative, "bar/bar-0.png");
    }

    #[test]
    fn test_colliding_names_are_dropped() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "a/x.png");
        touch(dir.path(), "b/x.png");
        touch(dir.path(), "c/y.png");

        let index = ImageIndex::build(dir.path(), &exts());
        let aliases = AliasTable::default();
        assert_eq!(index.resolve("line", "x", &json!({}), &aliases), None);
        assert_eq!(
            index.resolve("line", "y", &json!({}), &aliases).unwrap().relative,
            "c/y.png"
        );
    }

    #[test]
    fn test_chart_path_alias() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "nested/deep/chart.jpg");

        let index = ImageIndex::build(dir.path(), &exts());
        let item = json!({ "metadata": { "chart_path": "nested\\deep\\chart.jpg" } });
        let hit = index
            .resolve("pie", "pie-7", &item, &AliasTable::default())
            .unwrap();
        assert_eq!(hit.relative, "nested/deep/chart.jpg");
        assert_eq!(storage_key("chart-only/", &hit), "chart-only/nested/deep/chart.jpg");
    }

    #[test]
    fn test_root_level_guess() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "loose.png");
        let index = ImageIndex::build(dir.path(), &exts());
        let hit = index
            .resolve("bar", "loose", &json!({}), &AliasTable::default())
            .unwrap();
        assert_eq!(hit.relative, "loose.png");
    }

    #[test]
    fn test_missing_root_is_empty() {
        let dir = tempdir().unwrap();
        let index = ImageIndex::build(&dir.path().join("absent"), &exts());
        assert_eq!(index.file_count(), 0);
        assert_eq!(index.resolve("bar", "bar-0", &json!({}), &AliasTable::default()), None);
    }
}
