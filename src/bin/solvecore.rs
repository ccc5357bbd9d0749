//! CLI front end: `solvecore load <file>` parses and regenerates a
//! persisted document, printing a one-line summary per group and exiting
//! 1 if any group failed to solve (§6, §7).
//!
//! Grounded in `freddiehaddad-oxidized`'s `ox-bin` crate for the
//! clap-derive-plus-`env_logger`-at-startup shape: the library crate
//! never installs a logger itself (see `solvespace_kernel::regen`'s
//! `log::debug!` calls), only the binary decides the subscriber, which is
//! also how that reference crate's `main` is structured.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use solvespace_kernel::{load_and_regenerate, Tolerances, Units};

#[derive(Parser)]
#[command(name = "solvecore", about = "Headless parametric geometry kernel", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Units the CLI reports lengths in; the solver itself always works
    /// in millimeters internally (§3, SPEC_FULL §4.12).
    #[arg(long, value_enum, default_value_t = UnitsArg::Mm, global = true)]
    units: UnitsArg,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum UnitsArg {
    Mm,
    Inch,
}

impl From<UnitsArg> for Units {
    fn from(u: UnitsArg) -> Units {
        match u {
            UnitsArg::Mm => Units::Mm,
            UnitsArg::Inch => Units::Inch,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Load a persisted document, regenerate every group, and report
    /// solver/regeneration outcomes.
    Load {
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let units: Units = cli.units.into();
    match cli.command {
        Command::Load { file } => run_load(&file, units),
    }
}

fn run_load(file: &PathBuf, units: Units) -> ExitCode {
    let text = match std::fs::read_to_string(file) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("error: could not read {}: {e}", file.display());
            return ExitCode::FAILURE;
        }
    };

    let (doc, report) = match load_and_regenerate(&text, Tolerances::default()) {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if report.orphaned_requests > 0 || report.orphaned_constraints > 0 {
        println!(
            "pruned {} orphaned request(s), {} orphaned constraint(s)",
            report.orphaned_requests, report.orphaned_constraints
        );
    }

    let mut any_failed = false;
    for (group, outcome) in &report.group_outcomes {
        let status = if outcome.is_okay() { "ok" } else { "FAILED" };
        println!("group {group}: {status} ({outcome:?})");
        any_failed |= !outcome.is_okay();
    }

    let unit_label = match units {
        Units::Mm => "mm",
        Units::Inch => "in",
    };
    println!(
        "{} group(s), {} entities, {} params (lengths reported in {unit_label})",
        doc.groups.len(),
        doc.entities.len(),
        doc.params.len()
    );

    if any_failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
