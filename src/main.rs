use std::io::Read;

use clap::Parser as ClapParser;
use knot::{Failure, Session};
use knot_vm::{RcMode, Runtime};
use tracing_subscriber::EnvFilter;

fn main() {
    let opt = Opt::parse();
    init_logging(opt.verbose);

    let mode = if opt.rc_table {
        RcMode::Table
    } else {
        RcMode::Inline
    };
    if let Err(e) = knot_vm::set_rc_mode(mode) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }

    let status = run(&opt);
    if opt.verbose {
        eprintln!("{}", knot_vm::stats());
    }
    std::process::exit(status);
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("knot_vm=trace")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Run everything the options ask for. The session is dropped before
/// returning so the allocation report sees its objects freed.
fn run(opt: &Opt) -> i32 {
    let mut session = Session::new(Runtime::new());

    for path in &opt.paths {
        if let Err(e) = session.run_file(path) {
            return report(&e);
        }
    }

    if let Some(expr) = opt.eval.as_ref().or_else(|| opt.exec.as_ref()) {
        match session.run_source("<eval>", expr.as_str()) {
            Ok(val) if opt.eval.is_some() => println!("{}", session.runtime().repr(&val)),
            Ok(_) => {}
            Err(e) => return report(&e),
        }
    } else if opt.paths.is_empty() {
        let mut input = String::new();
        if let Err(e) = std::io::stdin().read_to_string(&mut input) {
            eprintln!("<stdin>: {}", e);
            return 1;
        }
        if let Err(e) = session.run_source("<stdin>", input) {
            return report(&e);
        }
    }
    0
}

fn report(failure: &Failure) -> i32 {
    if !matches!(failure, Failure::Exit(_)) {
        eprintln!("{}", failure);
        for frame in failure.trace() {
            eprintln!("  in {}", frame);
        }
    }
    failure.status()
}

#[derive(clap::Parser)]
#[clap(about, version, author)]
struct Opt {
    /// Source files to run, in order, sharing one top-level environment.
    paths: Vec<String>,

    /// Log allocation and reference count events, and print an allocation
    /// report on exit.
    #[clap(short, long)]
    verbose: bool,

    /// Evaluate the given expression after the files and print its value.
    #[clap(short, long, conflicts_with = "exec")]
    eval: Option<String>,

    /// Evaluate the given expression after the files without printing.
    #[clap(short = 'E', long)]
    exec: Option<String>,

    /// Keep reference counts in a side table instead of object headers.
    #[clap(long)]
    rc_table: bool,
}
