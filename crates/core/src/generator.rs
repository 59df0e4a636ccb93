//! End-to-end stub generation over a set of resolved classpaths.

use crate::archive::StubArchive;
use crate::artifact::{ArtifactDescriptor, ExcludeRules, ModuleId, partition_classpath};
use crate::classpath::ClasspathLoader;
use crate::error::{Result, StubError};
use crate::intersect::intersect_all;
use indexmap::IndexMap;
use rayon::prelude::*;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

/// One generation request: the classpaths whose common surface to compute,
/// where the stub jar lands, and caller exclusion prefixes on top of the
/// built-in namespace list.
#[derive(Debug, Clone)]
pub struct StubRequest {
    pub classpaths: Vec<Vec<ArtifactDescriptor>>,
    pub output: PathBuf,
    pub extra_excludes: Vec<String>,
}

/// What a finished generation produced.
#[derive(Debug)]
pub struct StubOutcome {
    /// Candidate entries scanned from the first classpath.
    pub candidates: usize,
    /// Class entries written to the stub jar.
    pub classes_written: usize,
    /// Excluded artifacts reconciled to their lowest common versions,
    /// ordered as on the first classpath.
    pub reconciled: Vec<ArtifactDescriptor>,
}

/// Computes the maximal common API surface of every classpath in the
/// request and writes it as one stub jar.
///
/// Candidates are the `.class` entries of the first classpath's included
/// jars. Each candidate must be present on every classpath and survive
/// structural intersection to reach the stub. Excluded artifacts skip
/// intersection and are reconciled by module identity instead.
///
/// On failure the partially written output file is removed; the loaders are
/// closed on every path.
pub fn generate_stub(request: &StubRequest) -> Result<StubOutcome> {
    if request.classpaths.is_empty() {
        return Err(StubError::EmptyClasspaths);
    }
    let started = Instant::now();
    let rules = ExcludeRules::with_extra(&request.extra_excludes);

    let mut loaders = Vec::with_capacity(request.classpaths.len());
    for (index, classpath) in request.classpaths.iter().enumerate() {
        let (included, excluded) = partition_classpath(classpath, &rules);
        let files: Vec<PathBuf> = included.iter().map(|a| a.file.clone()).collect();
        loaders.push(ClasspathLoader::open(index, &files, excluded)?);
    }

    let result = write_stub(request, &loaders);
    for loader in &loaders {
        loader.close();
    }
    let (candidates, classes_written) = match result {
        Ok(counts) => counts,
        Err(error) => {
            let _ = std::fs::remove_file(&request.output);
            return Err(error);
        }
    };

    let excluded_per_classpath: Vec<Vec<ArtifactDescriptor>> = loaders
        .iter()
        .map(|loader| loader.excluded_artifacts().to_vec())
        .collect();
    let reconciled = reconcile_excluded(&excluded_per_classpath);
    info!(
        candidates,
        classes_written,
        reconciled = reconciled.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "stub generated"
    );
    Ok(StubOutcome {
        candidates,
        classes_written,
        reconciled,
    })
}

fn write_stub(request: &StubRequest, loaders: &[ClasspathLoader]) -> Result<(usize, usize)> {
    let archive = StubArchive::create(&request.output)?;
    let candidates = loaders[0].class_entries()?;
    let candidate_count = candidates.len();
    let common: Vec<String> = candidates
        .into_iter()
        .filter(|entry| {
            let everywhere = loaders[1..].iter().all(|loader| loader.has_entry(entry));
            if !everywhere {
                trace!(%entry, "not present on every classpath");
            }
            everywhere
        })
        .collect();
    debug!(
        candidates = candidate_count,
        common = common.len(),
        classpaths = loaders.len(),
        "scanning common surface"
    );
    let written: usize = common
        .par_iter()
        .map(|entry| stub_entry(entry, loaders, &archive))
        .collect::<Result<Vec<usize>>>()?
        .into_iter()
        .sum();
    archive.finish()?;
    Ok((candidate_count, written))
}

fn stub_entry(entry: &str, loaders: &[ClasspathLoader], archive: &StubArchive) -> Result<usize> {
    let mut versions = Vec::with_capacity(loaders.len());
    for loader in loaders {
        match loader.entry(entry)? {
            Some(class) => versions.push(class),
            None => {
                // The common-entry filter saw this entry on every classpath.
                return Err(StubError::MissingEntry {
                    classpath: loader.index(),
                    entry: entry.to_string(),
                });
            }
        }
    }
    let Some(merged) = intersect_all(&versions, loaders)? else {
        debug!(entry, "no common surface");
        return Ok(0);
    };
    let bytes = merged.to_bytes()?;
    archive.append_class(entry, &bytes)?;
    Ok(1)
}

/// Reduces the excluded side of every classpath to one artifact set: module
/// identities present on all classpaths, each at the lowest version any
/// classpath carries. Versions order lexicographically, an absent version
/// sorting below every present one. Output order follows the first
/// classpath.
pub fn reconcile_excluded(excluded: &[Vec<ArtifactDescriptor>]) -> Vec<ArtifactDescriptor> {
    let mut per_classpath = excluded.iter().map(|artifacts| {
        let mut by_module: IndexMap<ModuleId, &ArtifactDescriptor> = IndexMap::new();
        for artifact in artifacts {
            let Some(module) = &artifact.module else {
                warn!(
                    component = %artifact.component_id,
                    "excluded artifact lacks module identity, not reconciled"
                );
                continue;
            };
            by_module.entry(module.clone()).or_insert(artifact);
        }
        by_module
    });
    let Some(first) = per_classpath.next() else {
        return Vec::new();
    };
    let common = per_classpath.fold(first, |mut acc, next| {
        acc.retain(|module, _| next.contains_key(module));
        for (module, chosen) in acc.iter_mut() {
            if let Some(candidate) = next.get(module) {
                if candidate.version < chosen.version {
                    *chosen = candidate;
                }
            }
        }
        acc
    });
    common.into_values().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactKind;

    fn module(group: &str, name: &str, version: &str) -> ArtifactDescriptor {
        ArtifactDescriptor::module_artifact(format!("{name}-{version}.jar"), group, name, version)
    }

    #[test]
    fn test_empty_request_is_rejected() {
        let request = StubRequest {
            classpaths: Vec::new(),
            output: "stub.jar".into(),
            extra_excludes: Vec::new(),
        };
        assert!(matches!(
            generate_stub(&request),
            Err(StubError::EmptyClasspaths)
        ));
    }

    #[test]
    fn test_reconcile_picks_lowest_version() {
        let reconciled = reconcile_excluded(&[
            vec![module("org.jetbrains.kotlin", "kotlin-stdlib", "1.9.0")],
            vec![module("org.jetbrains.kotlin", "kotlin-stdlib", "1.8.22")],
        ]);
        assert_eq!(reconciled.len(), 1);
        assert_eq!(reconciled[0].version.as_deref(), Some("1.8.22"));
    }

    #[test]
    fn test_reconcile_drops_modules_missing_anywhere() {
        let reconciled = reconcile_excluded(&[
            vec![
                module("org.jetbrains.kotlin", "kotlin-stdlib", "1.9.0"),
                module("org.jetbrains", "annotations", "24.0.0"),
            ],
            vec![module("org.jetbrains.kotlin", "kotlin-stdlib", "1.9.0")],
        ]);
        assert_eq!(reconciled.len(), 1);
        assert_eq!(
            reconciled[0].module,
            Some(ModuleId::new("org.jetbrains.kotlin", "kotlin-stdlib"))
        );
    }

    #[test]
    fn test_reconcile_order_follows_first_classpath() {
        let reconciled = reconcile_excluded(&[
            vec![
                module("org.jetbrains.kotlin", "kotlin-stdlib", "1.9.0"),
                module("org.jetbrains", "annotations", "24.0.0"),
            ],
            vec![
                module("org.jetbrains", "annotations", "23.0.0"),
                module("org.jetbrains.kotlin", "kotlin-stdlib", "1.9.0"),
            ],
        ]);
        let names: Vec<&str> = reconciled
            .iter()
            .map(|a| a.module.as_ref().unwrap().name.as_str())
            .collect();
        assert_eq!(names, vec!["kotlin-stdlib", "annotations"]);
        assert_eq!(reconciled[1].version.as_deref(), Some("23.0.0"));
    }

    #[test]
    fn test_reconcile_missing_version_sorts_lowest() {
        let unversioned = ArtifactDescriptor {
            file: "kotlin-stdlib.jar".into(),
            component_id: "org.jetbrains.kotlin:kotlin-stdlib".into(),
            kind: ArtifactKind::Module,
            module: Some(ModuleId::new("org.jetbrains.kotlin", "kotlin-stdlib")),
            version: None,
        };
        let reconciled = reconcile_excluded(&[
            vec![module("org.jetbrains.kotlin", "kotlin-stdlib", "1.9.0")],
            vec![unversioned],
        ]);
        assert_eq!(reconciled[0].version, None);
    }

    #[test]
    fn test_reconcile_ignores_artifacts_without_module_identity() {
        let anonymous = ArtifactDescriptor {
            file: "mystery.jar".into(),
            component_id: "org.jetbrains:mystery:1.0".into(),
            kind: ArtifactKind::Module,
            module: None,
            version: Some("1.0".into()),
        };
        let reconciled = reconcile_excluded(&[vec![anonymous.clone()], vec![anonymous]]);
        assert!(reconciled.is_empty());
    }
}
