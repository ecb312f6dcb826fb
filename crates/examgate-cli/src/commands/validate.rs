//! The `examgate validate` command.

use std::path::PathBuf;

use anyhow::Result;

use examgate_core::scenario;

pub fn execute(scenario_path: PathBuf) -> Result<()> {
    let scenarios = if scenario_path.is_dir() {
        scenario::load_scenario_directory(&scenario_path)?
    } else {
        vec![scenario::parse_scenario(&scenario_path)?]
    };

    let mut total_warnings = 0;

    for s in &scenarios {
        println!(
            "Scenario: {} ({} courses, {} principals, {} steps)",
            s.name,
            s.courses.len(),
            s.principals.len(),
            s.steps.len()
        );

        let warnings = scenario::validate_scenario(s);
        for w in &warnings {
            let prefix = w
                .step
                .map(|n| format!("  [step {n}]"))
                .unwrap_or_else(|| "  ".to_string());
            println!("{prefix} WARNING: {}", w.message);
        }
        total_warnings += warnings.len();
    }

    if total_warnings == 0 {
        println!("All scenarios valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
