use crate::e2e::*;

#[test]
fn exit_code_propagates() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("pipeline.mk", "out:\n\t@exit 7\n")?;
    let out = space.run(&mut pipemake_command(vec!["out"]))?;
    assert_eq!(out.status.code(), Some(7));
    assert_output_contains(&out, "failed: out (exit code 7)");
    assert_stderr_contains(&out, "pipemake: error: out: command failed with exit code 7: exit 7");
    Ok(())
}

#[test]
fn signal_exit_code() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("pipeline.mk", "out:\n\t@kill -TERM $$$$\n")?;
    let out = space.run(&mut pipemake_command(vec!["out"]))?;
    assert_eq!(out.status.code(), Some(128 + 15));
    Ok(())
}

#[test]
fn interrupt_stops_the_run() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    // The shell survives the ^C sent to pipemake and exits 0.
    space.write(
        "pipeline.mk",
        "out: mid
\t@echo out >> log
\t@touch out
mid:
\t@echo mid >> log
\t@kill -INT $$PPID; sleep 0.2
\t@touch mid
",
    )?;
    let out = space.run(&mut pipemake_command(vec!["out"]))?;
    assert_eq!(out.status.code(), Some(130));
    assert_output_contains(&out, "interrupted: mid");
    assert_stderr_contains(&out, "pipemake: error: interrupted by user");
    assert_eq!(read_log(&space), vec!["mid"]);
    assert!(!space.exists("mid"));
    assert!(!space.exists("out"));
    Ok(())
}

#[test]
fn failure_stops_later_commands_and_dependents() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "pipeline.mk",
        "report: db
\t@touch report
db:
\t@echo loading >> log
\t@false
\t@echo never >> log
",
    )?;
    let out = space.run(&mut pipemake_command(vec!["report"]))?;
    assert_eq!(out.status.code(), Some(1));
    assert_eq!(read_log(&space), vec!["loading"]);
    assert!(!space.exists("report"));
    Ok(())
}

#[test]
fn partial_output_deleted() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "pipeline.mk",
        "download.json:\n\t@echo partial > download.json\n\t@exit 22\n",
    )?;
    let out = space.run(&mut pipemake_command(vec!["download.json"]))?;
    assert_eq!(out.status.code(), Some(22));
    assert_output_contains(&out, "pipemake: deleting download.json");
    assert!(!space.exists("download.json"));
    Ok(())
}

#[test]
fn untouched_output_kept() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("pipeline.mk", "out: in\n\t@exit 1\n")?;
    space.write("out", "old")?;
    space.write("in", "")?;
    space.age("out", 10)?;
    space.age("in", 20)?;
    let out = space.run(&mut pipemake_command(vec!["out"]))?;
    assert_eq!(out.status.code(), Some(1));
    assert_eq!(space.read("out")?, b"old");
    Ok(())
}

#[test]
fn target_not_created() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("pipeline.mk", "out:\n\t@true\n")?;
    let out = space.run(&mut pipemake_command(vec!["out"]))?;
    assert_eq!(out.status.code(), Some(1));
    assert_stderr_contains(&out, "the target was not created");
    Ok(())
}

#[test]
fn ignored_errors() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("pipeline.mk", "out:\n\t-@rm nonexistent-file-2>/dev/null\n\t@touch out\n")?;
    let out = space.run_expect(&mut pipemake_command(vec!["out"]))?;
    assert_output_contains(&out, "ignored exit code 1");
    assert!(space.exists("out"));
    Ok(())
}

#[test]
fn keep_going() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    let rules = "
.PHONY: all
all: bad1 bad2 good
bad1:
\t@exit 3
bad2:
\t@exit 4
good:
\t@touch good
";
    space.write("pipeline.mk", rules)?;

    // Default: halt at the first failure.
    let out = space.run(&mut pipemake_command(vec![]))?;
    assert_eq!(out.status.code(), Some(3));
    assert_output_not_contains(&out, "bad2");
    assert!(!space.exists("good"));

    // -k 0: keep going, reporting the first failure.
    let out = space.run(&mut pipemake_command(vec!["-k", "0"]))?;
    assert_eq!(out.status.code(), Some(3));
    assert_output_contains(&out, "failed: bad2");
    assert!(space.exists("good"));
    Ok(())
}
