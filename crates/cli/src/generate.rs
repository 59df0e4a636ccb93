use apistub_core::archive::materialize_artifacts;
use apistub_core::{StubRequest, generate_stub};
use std::path::PathBuf;
use tracing::info;

use crate::plan::StubPlan;

pub fn run(
    plan_path: PathBuf,
    output: PathBuf,
    extras_dir: Option<PathBuf>,
    excludes: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let plan = StubPlan::load(&plan_path)?;

    info!(
        "Generating stubs for {} classpaths into {}...",
        plan.classpaths.len(),
        output.display()
    );

    let mut extra_excludes = plan.excludes;
    extra_excludes.extend(excludes);
    let request = StubRequest {
        classpaths: plan.classpaths,
        output,
        extra_excludes,
    };
    let outcome = generate_stub(&request)?;

    info!(
        "Stubbed {} of {} candidate classes",
        outcome.classes_written, outcome.candidates
    );

    match extras_dir {
        Some(extras_dir) => {
            let destinations = materialize_artifacts(&outcome.reconciled, &extras_dir)?;
            for (artifact, destination) in outcome.reconciled.iter().zip(&destinations) {
                println!("{} -> {}", artifact.component_id, destination.display());
            }
        }
        None => {
            for artifact in &outcome.reconciled {
                println!("{}", artifact.component_id);
            }
        }
    }

    Ok(())
}
