use anyhow::{anyhow, bail};
use std::path::Path;

use crate::{clean, error::BuildError, load, progress::ConsoleProgress, signal, trace, work};

#[derive(argh::FromArgs)]
/// pipemake, a dependency-driven task pipeline runner
struct Args {
    /// chdir before running
    #[argh(option, short = 'C')]
    chdir: Option<String>,

    /// input rule file [default=pipeline.mk]
    #[argh(option, short = 'f', default = "String::from(\"pipeline.mk\")")]
    file: String,

    /// debugging tools (-d list to list)
    #[argh(option, short = 'd')]
    debug: Vec<String>,

    /// subcommands (-t list to list)
    #[argh(option, short = 't')]
    tool: Option<String>,

    /// parallelism [default=1]
    #[argh(option, short = 'j', default = "1")]
    jobs: usize,

    /// keep going until at least N failures (0 means infinity) [default=1]
    #[argh(option, short = 'k', default = "1")]
    keep_going: usize,

    /// print the commands that would run, without running them
    #[argh(switch, short = 'n')]
    dry_run: bool,

    /// don't echo command lines
    #[argh(switch, short = 's')]
    silent: bool,

    /// announce each rule as it starts, and log debug output
    #[argh(switch, short = 'v')]
    verbose: bool,

    /// targets to resolve, and NAME=value variable overrides
    #[argh(positional)]
    targets: Vec<String>,
}

fn init_tracing(verbose: bool) {
    let filter = std::env::var("PIPEMAKE_LOG")
        .unwrap_or_else(|_| if verbose { "debug" } else { "warn" }.into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .try_init();
}

/// Splits `NAME=value` arguments off from target names.
fn split_overrides(args: &[String]) -> (Vec<String>, Vec<(String, String)>) {
    let mut targets = Vec::new();
    let mut overrides = Vec::new();
    for arg in args {
        match arg.split_once('=') {
            Some((name, value))
                if !name.is_empty()
                    && name
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')) =>
            {
                overrides.push((name.to_string(), value.to_string()));
            }
            _ => targets.push(arg.clone()),
        }
    }
    (targets, overrides)
}

/// Print a resolution failure and pick the exit code for it.
fn report(err: BuildError) -> i32 {
    eprintln!("pipemake: error: {}", err);
    err.exit_code()
}

fn run_clean(specs: &[clean::CleanSpec]) -> anyhow::Result<()> {
    let removed = trace::scope("clean", || clean::clean(specs))?;
    println!("pipemake: removed {} files", removed);
    Ok(())
}

fn run_impl() -> anyhow::Result<i32> {
    let args: Args = argh::from_env();
    init_tracing(args.verbose);

    let mut explain = false;
    for debug in &args.debug {
        match debug.as_str() {
            "list" => {
                println!("debug tools:");
                println!("  explain  print why each rule is or isn't run");
                println!("  trace    generate json performance trace");
                return Ok(1);
            }
            "explain" => explain = true,
            "trace" => trace::open("trace.json")?,
            _ => bail!("unknown -d {:?}, use -d list to list", debug),
        }
    }

    if let Some(dir) = &args.chdir {
        let dir = Path::new(dir);
        std::env::set_current_dir(dir).map_err(|err| anyhow!("chdir {:?}: {}", dir, err))?;
    }

    let (mut targets, overrides) = split_overrides(&args.targets);
    let state = trace::scope("load::read", || load::read(&args.file, &overrides))?;
    tracing::debug!(
        rules = state.graph.rules.len(),
        files = state.graph.files.len(),
        "loaded {}",
        args.file
    );

    if let Some(tool) = &args.tool {
        match tool.as_str() {
            "list" => {
                println!("subcommands:");
                println!("  clean    delete files matching the .CLEAN patterns");
                println!("  targets  list targets that have rules");
                return Ok(1);
            }
            "clean" => {
                run_clean(&state.clean)?;
                return Ok(0);
            }
            "targets" => {
                for target in state.graph.targets() {
                    println!("{}", target);
                }
                return Ok(0);
            }
            _ => bail!("unknown -t {:?}, use -t list to list", tool),
        }
    }

    if targets.is_empty() {
        targets = state
            .default
            .iter()
            .map(|&id| state.graph.file(id).name.clone())
            .collect();
    }
    if targets.is_empty() {
        bail!("no target specified and no default");
    }

    // "clean" without a rule of its own means the built-in clean.
    let has_clean_rule = state
        .graph
        .lookup("clean")
        .map_or(false, |id| state.graph.file(id).input.is_some());
    if !has_clean_rule && targets.iter().any(|t| t == "clean") {
        run_clean(&state.clean)?;
        targets.retain(|t| t != "clean");
        if targets.is_empty() {
            return Ok(0);
        }
    }

    let options = work::Options {
        keep_going: args.keep_going,
        parallelism: args.jobs,
        dry_run: args.dry_run,
        explain,
        echo: !args.silent,
    };
    let mut progress = ConsoleProgress::new(args.verbose);
    let mut work = work::Work::new(&state.graph, &mut progress, options);

    let planned = trace::scope("want_file", || -> Result<(), BuildError> {
        for target in &targets {
            work.want_file(target)?;
        }
        Ok(())
    });
    if let Err(err) = planned {
        return Ok(report(err));
    }

    signal::register_sigint();
    match trace::scope("work.run", || work.run()) {
        Err(err) => Ok(report(err)),
        Ok(0) => {
            // Special case: don't print numbers when no work done.
            println!("pipemake: no work to do");
            Ok(0)
        }
        Ok(n) if args.dry_run => {
            println!("pipemake: would run {} tasks", n);
            Ok(0)
        }
        Ok(n) => {
            println!("pipemake: ran {} tasks, now up to date", n);
            Ok(0)
        }
    }
}

pub fn run() -> anyhow::Result<i32> {
    let res = run_impl();
    if let Err(err) = trace::close() {
        tracing::warn!("writing trace: {}", err);
    }
    res
}
