//! The `examgate init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    if std::path::Path::new("examgate.toml").exists() {
        println!("examgate.toml already exists, skipping.");
    } else {
        std::fs::write("examgate.toml", SAMPLE_CONFIG)?;
        println!("Created examgate.toml");
    }

    std::fs::create_dir_all("scenarios")?;
    let example_path = std::path::Path::new("scenarios/example.toml");
    if example_path.exists() {
        println!("scenarios/example.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_SCENARIO)?;
        println!("Created scenarios/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Edit examgate.toml to tune deadlines and permission grants");
    println!("  2. Run: examgate validate --scenario scenarios/example.toml");
    println!("  3. Run: examgate run --scenario scenarios/example.toml");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# examgate configuration

# Deadline for every store and relationship call.
store_timeout_ms = 2000

# Require the grants below on top of course ownership for teacher writes.
enforce_permission_strings = false

# Learners need `read_own_results` to see their own answers.
self_results_requires_permission = true

[permissions]
create_test = "course:test:add"
add_question = "test:quest:add"
manage_test = "course:test:write"
read_own_results = "test:answer:read"
"#;

const EXAMPLE_SCENARIO: &str = r#"[scenario]
id = "example"
name = "Example scenario"
description = "A teacher publishes a one-question test and a learner takes it"

[[courses]]
id = 1
teacher = "teacher"
enrolled = ["learner"]

[[principals]]
token = "teacher-token"
identity = "teacher"
permissions = ["course:test:add", "test:quest:add", "course:test:write"]

[[principals]]
token = "learner-token"
identity = "learner"
permissions = ["test:answer:read"]

[[steps]]
as = "teacher-token"
action = "create-test"
course = 1
title = "Warm-up"
save = "test"

[[steps]]
as = "teacher-token"
action = "add-question"
test = "test"
text = "What is 6 x 7?"
kind = "text"
save = "q"

[[steps]]
as = "teacher-token"
action = "activate-test"
test = "test"

[[steps]]
as = "learner-token"
action = "start-attempt"
test = "test"
save = "attempt"

[[steps]]
as = "learner-token"
action = "submit-answers"
answers = [{ attempt = "attempt", question = "q", value = "42" }]

[[steps]]
as = "learner-token"
action = "complete-attempt"
attempt = "attempt"

[[steps]]
as = "learner-token"
action = "view-results"
test = "test"
expect_len = 1
"#;
