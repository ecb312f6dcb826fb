//! The `examgate run` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Color, Table};

use examgate_core::replay::{replay, ScenarioReport};
use examgate_core::scenario;
use examgate_store::{create_service, load_config_from};

pub async fn execute(
    scenario_path: PathBuf,
    config_path: Option<PathBuf>,
    format: String,
    output: PathBuf,
) -> Result<()> {
    anyhow::ensure!(
        matches!(format.as_str(), "table" | "json"),
        "unknown format '{format}', expected table or json"
    );

    let config = load_config_from(config_path.as_deref())?;

    let scenarios = if scenario_path.is_dir() {
        scenario::load_scenario_directory(&scenario_path)?
    } else {
        vec![scenario::parse_scenario(&scenario_path)?]
    };
    anyhow::ensure!(!scenarios.is_empty(), "no scenarios found");
    tracing::debug!(
        store_timeout_ms = config.store_timeout_ms,
        "loaded {} scenarios from {}",
        scenarios.len(),
        scenario_path.display()
    );

    let mut mismatched = 0usize;

    for s in &scenarios {
        for w in scenario::validate_scenario(s) {
            eprintln!("Warning: {}: {}", s.id, w.message);
        }

        eprintln!("Replaying {} ({} steps)", s.name, s.steps.len());
        let service = create_service(s, &config);
        let report = replay(&service, s).await;

        match format.as_str() {
            "json" => {
                let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H%M%S");
                let path = output.join(format!("{}-{timestamp}.json", report.scenario_id));
                report.save_json(&path)?;
                println!("{}", serde_json::to_string_pretty(&report)?);
                eprintln!("Report saved to: {}", path.display());
            }
            _ => print_steps(&report),
        }

        let failed = report.steps.len() - report.passed();
        println!(
            "{}: {}/{} steps matched ({}ms)",
            report.scenario_name,
            report.passed(),
            report.steps.len(),
            report.duration_ms
        );
        mismatched += failed;
    }

    if mismatched > 0 {
        anyhow::bail!("{mismatched} step(s) did not match their expectation");
    }
    Ok(())
}

fn print_steps(report: &ScenarioReport) {
    let mut table = Table::new();
    table.set_header(vec!["#", "Actor", "Action", "Expected", "Actual", "Result"]);

    for step in &report.steps {
        let verdict = if step.passed {
            Cell::new("PASS").fg(Color::Green)
        } else {
            Cell::new("FAIL").fg(Color::Red)
        };
        let actual = match &step.note {
            Some(note) => format!("{} ({note})", step.actual.label()),
            None => step.actual.label(),
        };
        table.add_row(vec![
            Cell::new(step.step),
            Cell::new(&step.actor),
            Cell::new(step.action),
            Cell::new(step.expected),
            Cell::new(actual),
            verdict,
        ]);
    }

    println!("{table}");
}
