//! The [`Deployer`] contract and the [`Filtered`] adapter.
//!
//! A deployer claims files through [`Deployer::accept`] and receives the
//! lifecycle callbacks of the files it claims. The watcher never calls a
//! callback for a file the deployer did not accept.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Pluggable consumer of file events.
pub trait Deployer: Send + Sync {
    /// Label used in log events.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Whether this deployer handles `path`.
    ///
    /// Must not depend on the file existing, or deletions would never be
    /// delivered.
    fn accept(&self, path: &Path) -> bool;

    fn on_file_create(&self, path: &Path);

    fn on_file_change(&self, path: &Path) {
        self.on_file_create(path);
    }

    fn on_file_delete(&self, _path: &Path) {}

    /// Called once per watched directory with the accepted files currently in
    /// it, possibly none.
    fn open(&self, files: &[PathBuf]) {
        for file in files {
            self.on_file_create(file);
        }
    }

    fn close(&self) {}
}

type Predicate = Box<dyn Fn(&Path) -> bool + Send + Sync>;

/// A deployer narrowed by an extra predicate.
///
/// Every callback is forwarded to the wrapped deployer; `accept` requires
/// both the predicate and the wrapped deployer to agree.
pub struct Filtered {
    inner: Arc<dyn Deployer>,
    predicate: Predicate,
    label: String,
}

impl Filtered {
    pub fn new(
        inner: Arc<dyn Deployer>,
        predicate: impl Fn(&Path) -> bool + Send + Sync + 'static,
    ) -> Self {
        let label = format!("filtered({})", inner.name());
        Self {
            inner,
            predicate: Box::new(predicate),
            label,
        }
    }

    /// Only files located in `directory` or one of its subdirectories.
    pub fn within_dir(inner: Arc<dyn Deployer>, directory: impl Into<PathBuf>) -> Self {
        let directory = directory.into();
        let root = fs::canonicalize(&directory).unwrap_or_else(|_| directory.clone());
        let mut filtered = Self::new(inner, move |path| {
            normalize(path).map(|path| path.starts_with(&root) && path != root).unwrap_or(false)
        });
        filtered.label = format!("{}@{}", filtered.inner.name(), directory.display());
        filtered
    }

    /// Only files whose extension is one of `extensions` (without the dot).
    pub fn with_extensions(inner: Arc<dyn Deployer>, extensions: &[&str]) -> Self {
        let extensions: Vec<String> = extensions.iter().map(|ext| ext.to_string()).collect();
        Self::new(inner, move |path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| extensions.iter().any(|wanted| wanted == ext))
                .unwrap_or(false)
        })
    }
}

impl Deployer for Filtered {
    fn name(&self) -> &str {
        &self.label
    }

    fn accept(&self, path: &Path) -> bool {
        (self.predicate)(path) && self.inner.accept(path)
    }

    fn on_file_create(&self, path: &Path) {
        self.inner.on_file_create(path);
    }

    fn on_file_change(&self, path: &Path) {
        self.inner.on_file_change(path);
    }

    fn on_file_delete(&self, path: &Path) {
        self.inner.on_file_delete(path);
    }

    fn open(&self, files: &[PathBuf]) {
        let accepted: Vec<PathBuf> = files
            .iter()
            .filter(|file| (self.predicate)(file))
            .cloned()
            .collect();
        self.inner.open(&accepted);
    }

    fn close(&self) {
        self.inner.close();
    }
}

/// Canonical form of `path`, also for files that no longer exist: the
/// nearest existing ancestor is canonicalized and the rest appended.
pub(crate) fn normalize(path: &Path) -> Option<PathBuf> {
    if let Ok(canonical) = fs::canonicalize(path) {
        return Some(canonical);
    }
    let parent = path.parent().filter(|parent| !parent.as_os_str().is_empty())?;
    let name = path.file_name()?;
    normalize(parent).map(|parent| parent.join(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Journal {
        seen: Mutex<Vec<String>>,
    }

    impl Deployer for Journal {
        fn accept(&self, _path: &Path) -> bool {
            true
        }

        fn on_file_create(&self, path: &Path) {
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            self.seen.lock().push(name);
        }
    }

    #[test]
    fn default_change_and_open_delegate_to_create() {
        let journal = Journal::default();
        journal.on_file_change(Path::new("/x/a.txt"));
        journal.open(&[PathBuf::from("/x/b.txt"), PathBuf::from("/x/c.txt")]);
        assert_eq!(*journal.seen.lock(), vec!["a.txt", "b.txt", "c.txt"]);
    }

    #[test]
    fn extension_filter_requires_exact_extension() {
        let filtered = Filtered::with_extensions(Arc::new(Journal::default()), &["cfg"]);
        assert!(filtered.accept(Path::new("/x/app.cfg")));
        assert!(!filtered.accept(Path::new("/x/app.cfg.bak")));
        assert!(!filtered.accept(Path::new("/x/cfg")));
    }

    #[test]
    fn directory_filter_accepts_nested_and_deleted_files() {
        let root = TempDir::new().unwrap();
        let inside = root.path().join("watched");
        std::fs::create_dir_all(inside.join("nested")).unwrap();
        let filtered = Filtered::within_dir(Arc::new(Journal::default()), &inside);

        assert!(filtered.accept(&inside.join("nested/a.txt")));
        assert!(filtered.accept(&inside.join("gone.txt")), "missing files still match");
        assert!(!filtered.accept(&root.path().join("outside.txt")));
        assert!(!filtered.accept(&inside));
    }

    #[test]
    fn open_only_forwards_matching_files() {
        let journal = Arc::new(Journal::default());
        let filtered = Filtered::new(journal.clone(), |path| {
            !path.to_string_lossy().contains("skip")
        });
        filtered.open(&[PathBuf::from("/x/keep.txt"), PathBuf::from("/x/skip.txt")]);
        assert_eq!(*journal.seen.lock(), vec!["keep.txt"]);
    }
}
