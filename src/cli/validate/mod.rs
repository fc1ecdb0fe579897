//! Validate command - checks a workflow template file without a server

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, ValueEnum};
use serde_json::Value;

use crate::domain::workflow::{
    validate_structure, ValidationMode, ValidationReport, WorkflowTemplate,
};
use crate::domain::{UserId, WorkflowError};

/// Placeholder owner for templates instantiated only to be checked
const VALIDATION_OWNER: &str = "cli";

#[derive(Args)]
pub struct ValidateArgs {
    /// Path to an exported template (JSON)
    pub path: PathBuf,

    /// Rules to apply
    #[arg(long, value_enum, default_value_t = ModeArg::Execution)]
    pub mode: ModeArg,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ModeArg {
    /// Rules applied when saving a draft
    Storage,
    /// Rules applied before running or publishing
    Execution,
}

impl From<ModeArg> for ValidationMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Storage => ValidationMode::Storage,
            ModeArg::Execution => ValidationMode::Execution,
        }
    }
}

pub fn run(args: ValidateArgs) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(&args.path)
        .with_context(|| format!("reading {}", args.path.display()))?;
    let document: Value = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {}", args.path.display()))?;

    let report = validate_template(document, args.mode.into())?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if report.is_ok() {
        println!("{}: no findings", args.path.display());
    } else {
        for finding in &report.findings {
            println!(
                "{:?} {:?} {:?}: {}",
                finding.severity, finding.code, finding.subject, finding.message
            );
        }
    }

    if report.has_blocking() {
        anyhow::bail!(
            "{} blocking finding(s) in {}",
            report.blocking().count(),
            args.path.display()
        );
    }

    Ok(())
}

/// Parse a template document and validate the graph it describes
pub fn validate_template(
    document: Value,
    mode: ValidationMode,
) -> Result<ValidationReport, WorkflowError> {
    let owner = UserId::new(VALIDATION_OWNER).map_err(|e| WorkflowError::validation(e.to_string()))?;
    let structure = WorkflowTemplate::from_json(document)?.instantiate(owner)?;

    Ok(validate_structure(&structure, mode))
}
