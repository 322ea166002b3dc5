use crate::e2e::*;

const RULES: &str = "
.PHONY: all
.CLEAN: data/*.db *.tsv
all: report.tsv
data/samples.db:
\t@mkdir -p data
\t@touch data/samples.db
report.tsv: data/samples.db
\t@touch report.tsv
";

#[test]
fn clean_tool() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("pipeline.mk", RULES)?;
    space.run_expect(&mut pipemake_command(vec![]))?;
    assert!(space.exists("data/samples.db"));
    space.write("data/keep.txt", "")?;

    let out = space.run_expect(&mut pipemake_command(vec!["-t", "clean"]))?;
    assert_output_contains(&out, "pipemake: removed 2 files");
    assert!(!space.exists("data/samples.db"));
    assert!(!space.exists("report.tsv"));
    assert!(space.exists("data/keep.txt"));
    assert!(space.exists("pipeline.mk"));

    // Cleaning twice is fine.
    let out = space.run_expect(&mut pipemake_command(vec!["-t", "clean"]))?;
    assert_output_contains(&out, "pipemake: removed 0 files");
    Ok(())
}

#[test]
fn clean_then_resolve_reproduces() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("pipeline.mk", RULES)?;
    space.run_expect(&mut pipemake_command(vec![]))?;

    let out = space.run_expect(&mut pipemake_command(vec!["clean", "all"]))?;
    assert_output_contains(&out, "pipemake: removed 2 files");
    assert_output_contains(&out, "pipemake: ran 2 tasks, now up to date");
    assert!(space.exists("report.tsv"));
    Ok(())
}

#[test]
fn clean_rule_takes_precedence() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "pipeline.mk",
        &format!("{}\n.PHONY: clean\nclean:\n\t@echo custom > log\n", RULES),
    )?;
    space.write("report.tsv", "")?;
    let out = space.run_expect(&mut pipemake_command(vec!["clean"]))?;
    assert_output_not_contains(&out, "removed");
    assert_eq!(read_log(&space), vec!["custom"]);
    assert!(space.exists("report.tsv"));
    Ok(())
}
