//! Tests for requests that can't be resolved at all.

use crate::e2e::*;

#[test]
fn missing_prerequisite() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("pipeline.mk", "out: in\n\t@touch out\n")?;
    let out = space.run(&mut pipemake_command(vec!["out"]))?;
    assert_eq!(out.status.code(), Some(2));
    assert_stderr_contains(
        &out,
        "pipemake: error: no rule to make \"in\", needed by \"out\"",
    );
    assert!(!space.exists("out"));
    Ok(())
}

#[test]
fn unknown_target() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("pipeline.mk", "out:\n\t@touch out\n")?;
    let out = space.run(&mut pipemake_command(vec!["nope"]))?;
    assert_eq!(out.status.code(), Some(2));
    assert_stderr_contains(&out, "no rule to make \"nope\"");
    Ok(())
}

#[test]
fn source_file_target() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("pipeline.mk", "out:\n\t@touch out\n")?;
    space.write("schema.sql", "")?;
    let out = space.run_expect(&mut pipemake_command(vec!["schema.sql"]))?;
    assert_output_contains(&out, "pipemake: no work to do");
    Ok(())
}

#[test]
fn cycle_runs_nothing() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "pipeline.mk",
        &format!(
            "top: x\n{}x: y\n{}y: x\n{}",
            LOG_AND_TOUCH, LOG_AND_TOUCH, LOG_AND_TOUCH
        ),
    )?;
    let out = space.run(&mut pipemake_command(vec!["top"]))?;
    assert_eq!(out.status.code(), Some(3));
    assert_stderr_contains(&out, "pipemake: error: dependency cycle: x -> y -> x");
    assert!(read_log(&space).is_empty());
    Ok(())
}

#[test]
fn parse_error_location() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("pipeline.mk", "out: in\n\ttouch out\nnot a rule\n")?;
    let out = space.run(&mut pipemake_command(vec!["out"]))?;
    assert_eq!(out.status.code(), Some(1));
    assert_stderr_contains(&out, "pipeline.mk:3: not a rule");
    Ok(())
}

#[test]
fn missing_rule_file() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    let out = space.run(&mut pipemake_command(vec![]))?;
    assert_eq!(out.status.code(), Some(1));
    assert_stderr_contains(&out, "pipemake: error: read pipeline.mk:");
    Ok(())
}
