//! Read-side access to one classpath's jar archives.
//!
//! A [`ClasspathLoader`] holds every jar of a classpath open for its whole
//! lifetime and resolves entries with first-match-wins semantics across the
//! jar order. Raw entry bytes are cached per loader (absences included), so
//! each entry is scanned out of its archive at most once no matter how many
//! workers ask for it; the parsed representation is rebuilt fresh on every
//! call and never shared.

use crate::artifact::ArtifactDescriptor;
use crate::error::{Result, StubError};
use crate::model::ApiClass;
use dashmap::DashMap;
use ristretto_classfile::ClassAccessFlags;
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;
use zip::ZipArchive;
use zip::result::ZipError;

struct JarFile {
    /// Every entry name, for membership checks without touching the archive.
    names: HashSet<String>,
    /// Stub candidates in central directory order. Excludes module
    /// descriptors and multi-release variants under `META-INF/`.
    class_names: Vec<String>,
    archive: Mutex<Option<ZipArchive<File>>>,
}

/// One classpath's jars, opened once and shared across worker threads.
///
/// Included jars come first and are the only source of stub candidates;
/// the backing files of excluded artifacts are opened after them so that
/// entry lookups and hierarchy walks still see them.
pub struct ClasspathLoader {
    index: usize,
    jars: Vec<JarFile>,
    /// Jars before this boundary contribute stub candidates; jars after it
    /// only serve lookups.
    candidate_jars: usize,
    excluded: Vec<ArtifactDescriptor>,
    cache: DashMap<String, Option<Arc<Vec<u8>>>>,
    scans: AtomicUsize,
    closed: AtomicBool,
}

fn is_class_candidate(name: &str) -> bool {
    name.ends_with(".class") && name != "module-info.class" && !name.starts_with("META-INF/")
}

fn open_jar(path: &Path) -> Result<JarFile> {
    let file = File::open(path).map_err(|error| StubError::JarOpen {
        path: path.to_path_buf(),
        source: ZipError::Io(error),
    })?;
    let archive = ZipArchive::new(file).map_err(|source| StubError::JarOpen {
        path: path.to_path_buf(),
        source,
    })?;
    let mut names = HashSet::with_capacity(archive.len());
    let mut class_names = Vec::new();
    for name in archive.file_names() {
        if is_class_candidate(name) {
            class_names.push(name.to_string());
        }
        names.insert(name.to_string());
    }
    Ok(JarFile {
        names,
        class_names,
        archive: Mutex::new(Some(archive)),
    })
}

impl ClasspathLoader {
    /// Opens a classpath from its included jar files and the descriptors of
    /// its excluded artifacts.
    ///
    /// `index` is the classpath's position in the plan, carried for
    /// diagnostics only.
    pub fn open<P: AsRef<Path>>(
        index: usize,
        included: &[P],
        excluded: Vec<ArtifactDescriptor>,
    ) -> Result<Self> {
        let mut jars = Vec::with_capacity(included.len() + excluded.len());
        for path in included {
            jars.push(open_jar(path.as_ref())?);
        }
        for artifact in &excluded {
            jars.push(open_jar(&artifact.file)?);
        }
        debug!(
            classpath = index,
            included = included.len(),
            excluded = excluded.len(),
            "opened classpath"
        );
        Ok(Self {
            index,
            jars,
            candidate_jars: included.len(),
            excluded,
            cache: DashMap::new(),
            scans: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    /// Position of this classpath in the generation plan.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The excluded artifacts this classpath was opened with, in classpath
    /// order.
    pub fn excluded_artifacts(&self) -> &[ArtifactDescriptor] {
        &self.excluded
    }

    /// Whether any jar on this classpath contains `name`.
    pub fn has_entry(&self, name: &str) -> bool {
        self.jars.iter().any(|jar| jar.names.contains(name))
    }

    /// Candidate `.class` entry names across the included jars, in jar order
    /// with the first occurrence winning on duplicates.
    pub fn class_entries(&self) -> Result<Vec<String>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StubError::LoaderClosed);
        }
        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for jar in &self.jars[..self.candidate_jars] {
            for name in &jar.class_names {
                if seen.insert(name.as_str()) {
                    entries.push(name.clone());
                }
            }
        }
        Ok(entries)
    }

    /// Resolves `name` to a freshly parsed representation, or `None` when no
    /// jar on this classpath contains it.
    ///
    /// Raw bytes (and absences) are cached with compute-if-absent semantics,
    /// so concurrent first lookups of one entry scan the archives at most
    /// once. The parse itself runs on every call; callers always receive
    /// their own instance.
    pub fn entry(&self, name: &str) -> Result<Option<ApiClass>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StubError::LoaderClosed);
        }
        let bytes = {
            let cached = self
                .cache
                .entry(name.to_string())
                .or_try_insert_with(|| -> Result<Option<Arc<Vec<u8>>>> {
                    if !self.has_entry(name) {
                        return Ok(None);
                    }
                    Ok(Some(Arc::new(self.read_entry(name)?)))
                })?;
            cached.value().clone()
        };
        match bytes {
            Some(bytes) => Ok(Some(ApiClass::from_bytes(name, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Resolves the class named `name` (internal form, no `.class` suffix).
    pub fn load_class(&self, name: &str) -> Result<Option<ApiClass>> {
        self.entry(&format!("{name}.class"))
    }

    fn read_entry(&self, name: &str) -> Result<Vec<u8>> {
        self.scans.fetch_add(1, Ordering::Relaxed);
        for jar in &self.jars {
            if !jar.names.contains(name) {
                continue;
            }
            let mut guard = jar
                .archive
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let Some(archive) = guard.as_mut() else {
                return Err(StubError::LoaderClosed);
            };
            let mut file = archive.by_name(name)?;
            let mut bytes = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut bytes)?;
            return Ok(bytes);
        }
        Err(StubError::MissingEntry {
            classpath: self.index,
            entry: name.to_string(),
        })
    }

    /// Releases every archive handle and drops the byte cache. Lookups after
    /// close fail with [`StubError::LoaderClosed`]. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for jar in &self.jars {
            let mut guard = jar
                .archive
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *guard = None;
        }
        self.cache.clear();
        debug!(classpath = self.index, "closed classpath");
    }

    /// Resolves the superclass chain of `class`, nearest first, ending at
    /// the root or at the first name this classpath cannot resolve.
    pub fn superclass_chain(&self, class: &ApiClass) -> Result<Vec<ApiClass>> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        visited.insert(class.name.clone());
        let mut next = class.superclass.clone();
        while let Some(name) = next {
            if !visited.insert(name.clone()) {
                break;
            }
            match self.load_class(&name)? {
                Some(parent) => {
                    next = parent.superclass.clone();
                    chain.push(parent);
                }
                None => break,
            }
        }
        Ok(chain)
    }

    /// Whether `class` implements `interface` directly or through any
    /// superinterface or superclass reachable on this classpath.
    pub fn implements(&self, class: &ApiClass, interface: &str) -> Result<bool> {
        let mut pending: Vec<String> = Vec::new();
        let mut visited = HashSet::new();
        pending.extend(class.interfaces.iter().cloned());
        if let Some(superclass) = &class.superclass {
            pending.push(superclass.clone());
        }
        while let Some(name) = pending.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }
            if name == interface {
                return Ok(true);
            }
            if let Some(parsed) = self.load_class(&name)? {
                pending.extend(parsed.interfaces.iter().cloned());
                if parsed.flags.contains(ClassAccessFlags::INTERFACE) {
                    continue;
                }
                if let Some(superclass) = &parsed.superclass {
                    pending.push(superclass.clone());
                }
            }
        }
        Ok(false)
    }
}

impl Drop for ClasspathLoader {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ristretto_classfile::{ClassAccessFlags, Version};
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    fn minimal_class(name: &str, superclass: Option<&str>) -> ApiClass {
        ApiClass {
            version: Version::Java17 { minor: 0 },
            flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            name: name.to_string(),
            superclass: superclass.map(str::to_string),
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            annotations: Vec::new(),
            inner_classes: Vec::new(),
            signature: None,
            deprecated: false,
        }
    }

    fn write_jar(dir: &TempDir, file_name: &str, classes: &[ApiClass]) -> PathBuf {
        let path = dir.path().join(file_name);
        let mut writer = ZipWriter::new(File::create(&path).unwrap());
        let options = SimpleFileOptions::default();
        for class in classes {
            writer
                .start_file(format!("{}.class", class.name), options)
                .unwrap();
            writer.write_all(&class.to_bytes().unwrap()).unwrap();
        }
        writer.finish().unwrap();
        path
    }

    #[test]
    fn test_first_jar_wins_for_duplicate_entries() {
        let dir = TempDir::new().unwrap();
        let first = write_jar(
            &dir,
            "first.jar",
            &[minimal_class("com/example/Dup", Some("java/lang/Object"))],
        );
        let second = write_jar(
            &dir,
            "second.jar",
            &[minimal_class("com/example/Dup", Some("java/lang/Exception"))],
        );

        let loader = ClasspathLoader::open(0, &[first, second], Vec::new()).unwrap();
        let class = loader.entry("com/example/Dup.class").unwrap().unwrap();
        assert_eq!(class.superclass.as_deref(), Some("java/lang/Object"));
        assert_eq!(loader.class_entries().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_entry_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let jar = write_jar(&dir, "lib.jar", &[minimal_class("com/example/A", None)]);
        let loader = ClasspathLoader::open(0, &[jar], Vec::new()).unwrap();
        assert!(loader.entry("com/example/Absent.class").unwrap().is_none());
    }

    #[test]
    fn test_absent_entries_are_cached_without_scanning() {
        let dir = TempDir::new().unwrap();
        let jar = write_jar(&dir, "lib.jar", &[minimal_class("com/example/A", None)]);
        let loader = ClasspathLoader::open(0, &[jar], Vec::new()).unwrap();

        assert!(loader.entry("com/example/Absent.class").unwrap().is_none());
        assert!(loader.entry("com/example/Absent.class").unwrap().is_none());
        assert_eq!(loader.cache.len(), 1);
        assert_eq!(loader.scans.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_load_after_close_fails() {
        let dir = TempDir::new().unwrap();
        let jar = write_jar(&dir, "lib.jar", &[minimal_class("com/example/A", None)]);
        let loader = ClasspathLoader::open(0, &[jar], Vec::new()).unwrap();
        loader.close();
        loader.close();
        assert!(matches!(
            loader.entry("com/example/A.class"),
            Err(StubError::LoaderClosed)
        ));
    }

    #[test]
    fn test_module_descriptors_are_not_candidates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lib.jar");
        let mut writer = ZipWriter::new(File::create(&path).unwrap());
        let options = SimpleFileOptions::default();
        writer.start_file("module-info.class", options).unwrap();
        writer.write_all(b"not a real class").unwrap();
        writer.start_file("META-INF/MANIFEST.MF", options).unwrap();
        writer.write_all(b"Manifest-Version: 1.0\r\n\r\n").unwrap();
        writer.finish().unwrap();

        let loader = ClasspathLoader::open(0, &[path], Vec::new()).unwrap();
        assert!(loader.class_entries().unwrap().is_empty());
        assert!(loader.has_entry("module-info.class"));
    }

    #[test]
    fn test_excluded_jars_serve_lookups_but_not_candidates() {
        let dir = TempDir::new().unwrap();
        let app = write_jar(
            &dir,
            "app.jar",
            &[minimal_class("com/example/App", Some("kotlin/Base"))],
        );
        let stdlib = write_jar(
            &dir,
            "kotlin-stdlib-1.9.0.jar",
            &[minimal_class("kotlin/Base", Some("java/lang/Object"))],
        );
        let excluded = ArtifactDescriptor::module_artifact(
            stdlib,
            "org.jetbrains.kotlin",
            "kotlin-stdlib",
            "1.9.0",
        );

        let loader = ClasspathLoader::open(0, &[app], vec![excluded]).unwrap();
        assert_eq!(
            loader.class_entries().unwrap(),
            vec!["com/example/App.class".to_string()]
        );
        assert!(loader.has_entry("kotlin/Base.class"));
        let app = loader.load_class("com/example/App").unwrap().unwrap();
        let chain = loader.superclass_chain(&app).unwrap();
        assert_eq!(chain[0].name, "kotlin/Base");
        assert_eq!(loader.excluded_artifacts().len(), 1);
    }

    #[test]
    fn test_concurrent_lookups_scan_the_archive_once() {
        let dir = TempDir::new().unwrap();
        let jar = write_jar(
            &dir,
            "lib.jar",
            &[minimal_class("com/example/Shared", Some("java/lang/Object"))],
        );
        let loader = ClasspathLoader::open(0, &[jar], Vec::new()).unwrap();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    let class = loader.entry("com/example/Shared.class").unwrap().unwrap();
                    assert_eq!(class.name, "com/example/Shared");
                });
            }
        });
        assert_eq!(loader.scans.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_superclass_chain_stops_at_unresolvable() {
        let dir = TempDir::new().unwrap();
        let jar = write_jar(
            &dir,
            "lib.jar",
            &[
                minimal_class("com/example/Leaf", Some("com/example/Mid")),
                minimal_class("com/example/Mid", Some("java/lang/Object")),
            ],
        );
        let loader = ClasspathLoader::open(0, &[jar], Vec::new()).unwrap();
        let leaf = loader.load_class("com/example/Leaf").unwrap().unwrap();
        let chain = loader.superclass_chain(&leaf).unwrap();
        let names: Vec<&str> = chain.iter().map(|c| c.name.as_str()).collect();
        // java/lang/Object is not on the classpath, so the chain ends at Mid.
        assert_eq!(names, vec!["com/example/Mid"]);
    }
}
