use apistub_core::artifact::ArtifactDescriptor;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Input document for one generation run: every resolved classpath, listed
/// in the order the comparison should treat them. The first classpath
/// drives candidate scanning and output ordering. A plan may carry its own
/// excluded-namespace prefixes on top of the built-in list.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StubPlan {
    pub classpaths: Vec<Vec<ArtifactDescriptor>>,
    #[serde(default)]
    pub excludes: Vec<String>,
}

impl StubPlan {
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let file = File::open(path)
            .map_err(|error| format!("failed to open plan {}: {error}", path.display()))?;
        let plan = serde_json::from_reader(BufReader::new(file))
            .map_err(|error| format!("failed to parse plan {}: {error}", path.display()))?;
        Ok(plan)
    }
}
