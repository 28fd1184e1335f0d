//! Kiln Driver
//!
//! Builds one of the demo programs, verifies it and then runs it in the
//! execution engine, prints it, or writes it out as bitcode.

mod demos;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use demos::Demo;
use kiln_backend::{initialize, serialize, GenericValue, HostSymbols, JitEngine};
use kiln_common::TargetDescription;
use kiln_ir::{verify_module, Module};
use log::info;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(about = "Kiln IR harness - build, verify, run and serialize IR modules")]
#[command(version = "0.1.0")]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Target triple recorded in the module (defaults to the host)
    #[arg(long, global = true)]
    triple: Option<String>,

    /// Data layout recorded in the module (defaults to the host)
    #[arg(long, global = true)]
    data_layout: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute `main` of a demo and print its result
    Run {
        #[arg(value_enum)]
        demo: Demo,
    },

    /// Print a demo module
    Dump {
        #[arg(value_enum)]
        demo: Demo,

        /// Print the module as JSON instead of textual IR
        #[arg(long)]
        json: bool,
    },

    /// Write a demo module as bitcode
    Emit {
        #[arg(value_enum)]
        demo: Demo,

        /// Output bitcode file
        #[arg(short, long)]
        output: PathBuf,
    },
}

impl Cli {
    fn target(&self) -> TargetDescription {
        let host = TargetDescription::host();
        TargetDescription::new(
            self.triple.clone().unwrap_or(host.triple),
            self.data_layout.clone().unwrap_or(host.data_layout),
        )
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.verbose {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    let target = cli.target();
    match cli.command {
        Commands::Run { demo } => run_demo(demo, target),
        Commands::Dump { demo, json } => dump_demo(demo, target, json),
        Commands::Emit { demo, output } => emit_demo(demo, target, &output),
    }
}

fn build(demo: Demo, target: TargetDescription) -> Result<Module> {
    let module = demo
        .build(target)
        .with_context(|| format!("Failed to build demo '{}'", demo.name()))?;
    info!("Built '{}' with {} instruction(s)", demo.name(), module.instruction_count());
    Ok(module)
}

fn run_demo(demo: Demo, target: TargetDescription) -> Result<()> {
    let module = build(demo, target)?;
    let verified = verify_module(&module)?;

    initialize();
    let mut engine = JitEngine::new(&verified, HostSymbols::with_libc())?;
    let result = engine.run_function("main", &[])?;
    match result {
        GenericValue::Void => println!("main returned"),
        value => println!("main returned {value}"),
    }
    Ok(())
}

fn dump_demo(demo: Demo, target: TargetDescription, json: bool) -> Result<()> {
    let module = build(demo, target)?;
    verify_module(&module)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&module)?);
    } else {
        print!("{module}");
    }
    Ok(())
}

fn emit_demo(demo: Demo, target: TargetDescription, output: &Path) -> Result<()> {
    let module = build(demo, target)?;
    let verified = verify_module(&module)?;

    let file = File::create(output).with_context(|| format!("Could not create {}", output.display()))?;
    let mut sink = BufWriter::new(file);
    serialize(&verified, &mut sink).with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Bitcode written to: {}", output.display());
    Ok(())
}
