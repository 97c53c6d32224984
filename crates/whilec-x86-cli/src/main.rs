use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};

use whilec_x86::lang::WhileFile;
use whilec_x86::{CompileOptions, OptimizationFlags, Target};

mod program;

#[derive(Parser)]
#[command(name = "whilec-x86")]
#[command(about = "Native x86 code generator for the While language")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum TargetArg {
    #[value(name = "linux-x86_64")]
    LinuxX86_64,
    #[value(name = "macos-x86_64")]
    MacosX86_64,
    #[value(name = "windows-x86_64")]
    WindowsX86_64,
    #[value(name = "linux-x86_32")]
    LinuxX86_32,
}

impl From<TargetArg> for Target {
    fn from(arg: TargetArg) -> Self {
        match arg {
            TargetArg::LinuxX86_64 => Target::LINUX_X86_64,
            TargetArg::MacosX86_64 => Target::MACOS_X86_64,
            TargetArg::WindowsX86_64 => Target::WINDOWS_X86_64,
            TargetArg::LinuxX86_32 => Target::LINUX_X86_32,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Translate a typed program into AT&T assembly.
    Compile {
        #[arg(help = "Typed While program encoded as JSON")]
        input: PathBuf,

        #[arg(short, long, help = "Output assembly file (stdout if omitted)")]
        output: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value = "linux-x86_64")]
        target: TargetArg,

        #[arg(long, default_value = "main", help = "Function the entry point calls")]
        entry: String,

        #[arg(long, help = "Skip the peephole pass")]
        no_peephole: bool,
    },
    /// Compile for linux-x86_64 and execute the result in the simulator.
    Run {
        #[arg(help = "Typed While program encoded as JSON")]
        input: PathBuf,

        #[arg(long, default_value = "main", help = "Function the entry point calls")]
        entry: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Compile {
            input,
            output,
            target,
            entry,
            no_peephole,
        } => {
            let file = read_program(&input)?;
            let options = CompileOptions {
                target: target.into(),
                entry_point: entry,
                optimizations: OptimizationFlags {
                    peephole: !no_peephole,
                },
            };

            let asm = whilec_x86::compile_with_options(&file, &options)
                .context("Failed to compile")?;
            let text = asm.to_string();

            match output {
                Some(path) => {
                    fs::write(&path, &text)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!(
                        "Compiled {} -> {} ({} instructions, {} data items)",
                        input.display(),
                        path.display(),
                        asm.code.len(),
                        asm.data.len()
                    );
                }
                None => print!("{text}"),
            }
        }
        Commands::Run { input, entry } => {
            let file = read_program(&input)?;
            let options = CompileOptions {
                entry_point: entry,
                ..CompileOptions::default()
            };
            let execution = whilec_x86::test_harness::run_with_options(&file, &options)
                .context("Failed to run")?;
            for line in &execution.output {
                println!("{line}");
            }
            tracing::debug!(
                steps = execution.steps,
                max_stack_depth = execution.max_stack_depth,
                "execution finished"
            );
        }
    }

    Ok(())
}

fn read_program(path: &Path) -> Result<WhileFile> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    program::parse(&text).with_context(|| format!("Failed to decode {}", path.display()))
}
