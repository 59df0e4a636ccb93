//! Resolved dependency artifacts and the namespace rules that split each
//! classpath into an intersected set and an excluded set.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Namespace prefixes excluded from intersection by default.
///
/// These cover platform/tooling dependencies that are identical across
/// classpath variants anyway; they are version-reconciled instead of merged.
const BUILTIN_EXCLUDES: &[&str] = &[
    "org.jetbrains",
    "org.apache",
    "org.codehaus",
    "org.ow2",
    "org.lwjgl",
    "com.google",
    "net.java",
    "ca.weblite",
    "com.ibm",
    "org.scala-lang",
    "org.clojure",
    "io.netty",
    "org.slf4j",
    "org.lz4",
    "org.joml",
    "net.sf",
    "it.unimi",
    "commons-",
    "com.github",
    "org.antlr",
    "org.openjdk",
    "net.minecrell",
    "org.jline",
    "net.jodah",
    "org.checkerframework",
    "org.spongepowered",
    "net.fabricmc:sponge",
];

/// Module identity independent of version.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleId {
    pub group: String,
    pub name: String,
}

impl ModuleId {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Resolved from a module repository; carries a module identity.
    Module,
    /// Built from an in-workspace project.
    Project,
}

/// One resolved dependency on a classpath, as supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactDescriptor {
    /// Backing archive file.
    pub file: PathBuf,
    /// Component identity string, e.g. `com.example:lib:1.0` or `project :app`.
    pub component_id: String,
    pub kind: ArtifactKind,
    /// Module identity; present for `Module` artifacts.
    #[serde(default)]
    pub module: Option<ModuleId>,
    /// Module version; present for `Module` artifacts.
    #[serde(default)]
    pub version: Option<String>,
}

impl ArtifactDescriptor {
    pub fn module_artifact(
        file: impl Into<PathBuf>,
        group: &str,
        name: &str,
        version: &str,
    ) -> Self {
        Self {
            file: file.into(),
            component_id: format!("{group}:{name}:{version}"),
            kind: ArtifactKind::Module,
            module: Some(ModuleId::new(group, name)),
            version: Some(version.to_string()),
        }
    }

    pub fn project_artifact(file: impl Into<PathBuf>, path: &str) -> Self {
        Self {
            file: file.into(),
            component_id: format!("project {path}"),
            kind: ArtifactKind::Project,
            module: None,
            version: None,
        }
    }
}

/// The effective exclusion namespace set for one generation run.
///
/// Built once per invocation from the built-in list plus caller prefixes, so
/// the partitioning stays a pure function of its inputs.
#[derive(Debug, Clone)]
pub struct ExcludeRules {
    prefixes: Vec<String>,
}

impl ExcludeRules {
    pub fn with_extra(extra: &[String]) -> Self {
        let mut prefixes: Vec<String> = BUILTIN_EXCLUDES.iter().map(|p| p.to_string()).collect();
        prefixes.extend(extra.iter().cloned());
        Self { prefixes }
    }

    /// True when the artifact is kept out of intersection and routed to
    /// version reconciliation instead. Only module artifacts are excluded;
    /// project artifacts always participate in the merge.
    pub fn excludes(&self, artifact: &ArtifactDescriptor) -> bool {
        artifact.kind == ArtifactKind::Module
            && self
                .prefixes
                .iter()
                .any(|p| artifact.component_id.starts_with(p.as_str()))
    }
}

/// Splits one classpath into (included, excluded), preserving input order.
pub fn partition_classpath(
    artifacts: &[ArtifactDescriptor],
    rules: &ExcludeRules,
) -> (Vec<ArtifactDescriptor>, Vec<ArtifactDescriptor>) {
    let mut included = Vec::new();
    let mut excluded = Vec::new();
    for artifact in artifacts {
        if rules.excludes(artifact) {
            excluded.push(artifact.clone());
        } else {
            included.push(artifact.clone());
        }
    }
    (included, excluded)
}
