use super::core::check_all;
use super::types::{ToolCommands, ToolStatus};
use anyhow::{bail, Result};

pub fn run_check_cli(commands: &ToolCommands) -> Result<()> {
    println!("\n🔍 Checking external tools...\n");

    let mut missing = Vec::new();
    for report in check_all(commands) {
        let optional = if report.kind.is_required() { "" } else { " (optional)" };
        match &report.status {
            ToolStatus::Available { path, version_line } => {
                println!("✅ {}{}: {}", report.kind, optional, path.display());
                if let Some(line) = version_line {
                    println!("   {}", line);
                }
            }
            ToolStatus::Unavailable { reason } => {
                println!("❌ {}{}: {}", report.kind, optional, reason);
                if report.kind.is_required() {
                    missing.push(report.kind.binary_name());
                }
            }
        }
    }

    if !missing.is_empty() {
        bail!("Missing required tools: {}", missing.join(", "));
    }
    println!("\nAll required tools are available.");
    Ok(())
}
