mod generate;
mod plan;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "apistub",
    version,
    about = "Generate a common API stub jar from multiple JVM classpaths",
    long_about = "Apistub compares the compiled classes of several resolved classpaths and emits \
                  one jar of API stubs covering the surface they all share. Code can then be \
                  compiled once against the stub jar instead of once per classpath variant."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate the stub jar for a set of resolved classpaths
    #[command(
        long_about = "Reads a generation plan listing every classpath's artifacts, intersects the \
                            classes present on all of them, and writes the result as a stub jar. \
                            Artifacts under excluded namespaces are reconciled to their lowest \
                            common versions and listed on stdout instead of being stubbed."
    )]
    Generate {
        /// Path to the generation plan (JSON, one artifact list per classpath)
        #[arg(long, value_name = "PLAN")]
        plan: PathBuf,
        /// Where to write the stub jar
        #[arg(long, value_name = "OUTPUT")]
        output: PathBuf,
        /// Directory to copy reconciled excluded artifacts into (optional)
        #[arg(long, value_name = "DIR")]
        extras_dir: Option<PathBuf>,
        /// Additional excluded namespace prefix (repeatable)
        #[arg(long = "exclude", value_name = "PREFIX")]
        excludes: Vec<String>,
    },
}

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    apistub_core::logging::init_logging();

    match cli.command {
        Commands::Generate {
            plan,
            output,
            extras_dir,
            excludes,
        } => generate::run(plan, output, extras_dir, excludes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_arguments_parse() {
        let cli = Cli::try_parse_from([
            "apistub",
            "generate",
            "--plan",
            "plan.json",
            "--output",
            "stub.jar",
            "--exclude",
            "com.example.internal",
            "--exclude",
            "org.acme",
        ])
        .unwrap();
        let Commands::Generate {
            plan,
            output,
            extras_dir,
            excludes,
        } = cli.command;
        assert_eq!(plan, PathBuf::from("plan.json"));
        assert_eq!(output, PathBuf::from("stub.jar"));
        assert!(extras_dir.is_none());
        assert_eq!(excludes, vec!["com.example.internal", "org.acme"]);
    }

    #[test]
    fn test_plan_and_output_are_required() {
        assert!(Cli::try_parse_from(["apistub", "generate", "--plan", "plan.json"]).is_err());
    }
}
