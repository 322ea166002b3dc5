use crate::e2e::*;

#[test]
fn empty_file() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("pipeline.mk", "")?;
    let out = space.run(&mut pipemake_command(vec![]))?;
    assert_eq!(out.status.code(), Some(1));
    assert_stderr_contains(&out, "pipemake: error: no target specified and no default");
    Ok(())
}

#[test]
fn basic_run() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("pipeline.mk", "out: in\n\ttouch out\n")?;
    space.write("in", "")?;

    let out = space.run_expect(&mut pipemake_command(vec!["out"]))?;
    assert!(space.read("out").is_ok());
    assert_output_contains(&out, "touch out\n");
    assert_output_contains(&out, "pipemake: ran 1 tasks, now up to date");

    let out = space.run_expect(&mut pipemake_command(vec!["out"]))?;
    assert_eq!(std::str::from_utf8(&out.stdout)?, "pipemake: no work to do\n");
    Ok(())
}

#[test]
fn silent_commands() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("pipeline.mk", "a:\n\t@touch a\nb:\n\ttouch b\n")?;

    let out = space.run_expect(&mut pipemake_command(vec!["a"]))?;
    assert_output_not_contains(&out, "touch a");

    let out = space.run_expect(&mut pipemake_command(vec!["-s", "b"]))?;
    assert_output_not_contains(&out, "touch b");
    Ok(())
}

#[test]
fn default_is_first_target() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "pipeline.mk",
        &format!("first:\n{}second:\n{}", LOG_AND_TOUCH, LOG_AND_TOUCH),
    )?;
    space.run_expect(&mut pipemake_command(vec![]))?;
    assert_eq!(read_log(&space), vec!["first"]);
    Ok(())
}

#[test]
fn diamond_runs_in_post_order() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "pipeline.mk",
        &[
            ".PHONY: all",
            "all: report.tsv",
            "report.tsv: a.tsv b.tsv",
            LOG_AND_TOUCH,
            "a.tsv: samples.db",
            LOG_AND_TOUCH,
            "b.tsv: samples.db",
            LOG_AND_TOUCH,
            "samples.db:",
            LOG_AND_TOUCH,
        ]
        .join("\n"),
    )?;

    let out = space.run_expect(&mut pipemake_command(vec!["all"]))?;
    assert_output_contains(&out, "pipemake: ran 4 tasks, now up to date");
    assert_eq!(
        read_log(&space),
        vec!["samples.db", "a.tsv", "b.tsv", "report.tsv"]
    );

    let out = space.run_expect(&mut pipemake_command(vec!["all"]))?;
    assert_output_contains(&out, "pipemake: no work to do");
    assert_eq!(read_log(&space).len(), 4);
    Ok(())
}

#[test]
fn rebuild_when_prerequisite_newer() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("pipeline.mk", &format!("out: in\n{}", LOG_AND_TOUCH))?;
    space.write("in", "")?;
    space.write("out", "")?;
    space.age("in", 10)?;
    space.age("out", 20)?;

    space.run_expect(&mut pipemake_command(vec!["out"]))?;
    assert!(read_log(&space).is_empty());

    space.age("in", 30)?;
    space.run_expect(&mut pipemake_command(vec!["out"]))?;
    assert_eq!(read_log(&space), vec!["out"]);
    Ok(())
}

#[test]
fn chdir_and_file() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.create_dir("sub")?;
    space.write("sub/rules.mk", "out:\n\t@touch out\n")?;
    space.run_expect(&mut pipemake_command(vec!["-C", "sub", "-f", "rules.mk"]))?;
    assert!(space.exists("sub/out"));
    assert!(!space.exists("out"));
    Ok(())
}

#[test]
fn dry_run() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("pipeline.mk", "out: mid\n\ttouch out\nmid:\n\t@touch mid\n")?;

    let out = space.run_expect(&mut pipemake_command(vec!["-n", "out"]))?;
    assert_output_contains(&out, "touch mid\ntouch out\n");
    assert_output_contains(&out, "pipemake: would run 2 tasks");
    assert!(!space.exists("mid"));
    assert!(!space.exists("out"));
    Ok(())
}

#[test]
fn explain() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("pipeline.mk", "out: in\n\t@touch out\n")?;
    space.write("in", "")?;

    let out = space.run_expect(&mut pipemake_command(vec!["-d", "explain", "out"]))?;
    assert_output_contains(&out, "explain: out: target is missing");

    let out = space.run_expect(&mut pipemake_command(vec!["-d", "explain", "out"]))?;
    assert_output_contains(&out, "explain: out: up to date");
    Ok(())
}

#[test]
fn list_targets() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("pipeline.mk", ".PHONY: all\nall: a b\na:\nb:\n")?;
    let out = space.run_expect(&mut pipemake_command(vec!["-t", "targets"]))?;
    assert_eq!(std::str::from_utf8(&out.stdout)?, "all\na\nb\n");
    Ok(())
}

#[test]
fn parallel() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "pipeline.mk",
        ".PHONY: all
all: a b c d
a:
\t@touch a
b:
\t@touch b
c:
\t@touch c
d: a b c
\t@touch d
",
    )?;
    let out = space.run_expect(&mut pipemake_command(vec!["-j", "4"]))?;
    assert_output_contains(&out, "pipemake: ran 4 tasks, now up to date");
    assert!(space.exists("d"));
    Ok(())
}

#[test]
fn trace_output() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("pipeline.mk", "out:\n\t@touch out\n")?;
    space.run_expect(&mut pipemake_command(vec!["-d", "trace", "out"]))?;
    let trace = String::from_utf8(space.read("trace.json")?)?;
    assert!(trace.starts_with("[\n"));
    assert!(trace.contains("\"name\": \"out\""));
    assert!(trace.trim_end().ends_with(']'));
    Ok(())
}
