//! covmap CLI: compile TIR modules with coverage instrumentation.
//!
//! ## Usage
//!
//! ```bash
//! covmap compile app.tir --coverage -o app.o             # native object
//! covmap compile app.tir --coverage --emit llvm-ir -o app.ll
//! covmap compile app.tir --coverage --library-to-cover stdlib --dump-regions
//! covmap show app.o                                      # decode coverage sections
//! ```

use bumpalo::Bump;
use clap::{Parser, Subcommand, ValueEnum};
use inkwell::context::Context;
use object::{Object as _, ObjectSection as _};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use covmap::core::{CompileResult, CoverageError, CoverageSession};
use covmap::coverage::{CoverageConfig, CoverageManager, RegionGranularity};
use covmap::mapping::{read_coverage_mapping, DescriptorKind, ObjectFormat};
use covmap::test_ir::{TestIR, TestIRAdaptor};

/// covmap: source coverage instrumentation for TIR modules
#[derive(Parser, Debug)]
#[command(name = "covmap")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile a TIR module
    Compile(CompileArgs),

    /// Decode the coverage mapping of an object file
    Show(ShowArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Emit {
    Object,
    LlvmIr,
    Bitcode,
}

impl Emit {
    fn extension(self) -> &'static str {
        match self {
            Emit::Object => "o",
            Emit::LlvmIr => "ll",
            Emit::Bitcode => "bc",
        }
    }
}

#[derive(Parser, Debug)]
struct CompileArgs {
    /// Input TIR file
    input: PathBuf,

    /// Instrument the module for source coverage
    #[arg(long)]
    coverage: bool,

    /// Module whose files are instrumented (repeatable; default: the compiled module)
    #[arg(long = "library-to-cover", value_name = "NAME")]
    libraries_to_cover: Vec<String>,

    /// Which elements get a region of their own
    #[arg(long, value_enum, default_value_t = RegionGranularity::Leaves)]
    granularity: RegionGranularity,

    /// Print the collected regions of every function
    #[arg(long)]
    dump_regions: bool,

    /// Output kind
    #[arg(long, value_enum, default_value_t = Emit::Object)]
    emit: Emit,

    /// Target triple of LLVM output
    #[arg(long)]
    triple: Option<String>,

    /// Output file (default: input with the output kind's extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print coverage statistics
    #[arg(long)]
    stats: bool,
}

#[derive(Parser, Debug)]
struct ShowArgs {
    /// Object file produced by `covmap compile`
    input: PathBuf,
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Compile(args) => run_compile(&args),
        Commands::Show(args) => run_show(&args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e @ CoverageError::ModuleNotInitialized) => {
            // Already phrased as an internal error.
            eprintln!("{e}");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run_compile(args: &CompileArgs) -> CompileResult<()> {
    let source = fs::read_to_string(&args.input)?;
    let ir = TestIR::parse(&source).map_err(CoverageError::Parse)?;
    let adaptor = TestIRAdaptor::new(&ir);

    let config = CoverageConfig {
        enabled: args.coverage,
        libraries_to_cover: args.libraries_to_cover.clone(),
        granularity: args.granularity,
        dump_regions: args.dump_regions,
    };

    let arena = Bump::new();
    let session = CoverageSession::new(&arena);
    let mut manager = CoverageManager::new(&session, config, ir.module.as_str());
    manager.collect_regions(&adaptor);

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| args.input.with_extension(args.emit.extension()));

    match args.emit {
        Emit::Object => {
            let bytes = covmap::codegen::native::compile_to_object(&adaptor, &manager)?;
            fs::write(&output, bytes)?;
        }
        Emit::LlvmIr | Emit::Bitcode => {
            let context = Context::create();
            let module =
                covmap::llvm::lower_to_module(&context, &adaptor, &manager, args.triple.as_deref())?;
            write_llvm_output(&module, args.emit, &output)?;
        }
    }
    log::info!("Wrote {}", output.display());

    if args.stats {
        print!("{}", session.stats());
    }
    Ok(())
}

fn write_llvm_output(module: &inkwell::module::Module<'_>, emit: Emit, output: &Path) -> CompileResult<()> {
    if emit == Emit::Bitcode {
        if !module.write_bitcode_to_path(output) {
            return Err(CoverageError::Llvm {
                reason: format!("failed to write bitcode to {}", output.display()),
            });
        }
        return Ok(());
    }

    module.print_to_file(output).map_err(|e| CoverageError::Llvm {
        reason: e.to_string(),
    })
}

fn run_show(args: &ShowArgs) -> CompileResult<()> {
    let bytes = fs::read(&args.input)?;
    let file = object::File::parse(&*bytes).map_err(|e| CoverageError::MalformedMapping {
        offset: 0,
        reason: e.to_string(),
    })?;

    let sections = ObjectFormat::Elf.sections();
    let section_data = |name: &str| -> CompileResult<Vec<u8>> {
        let section = file.section_by_name(name).ok_or_else(|| CoverageError::MalformedMapping {
            offset: 0,
            reason: format!("no {} section", name),
        })?;
        let data = section.data().map_err(|e| CoverageError::MalformedMapping {
            offset: 0,
            reason: e.to_string(),
        })?;
        Ok(data.to_vec())
    };

    let mapping = read_coverage_mapping(&section_data(sections.covmap)?, &section_data(sections.covfun)?)?;

    println!("Coverage mapping version {}", mapping.version + 1);
    for (id, name) in mapping.filenames.iter().enumerate() {
        println!("  file {}: {}", id, name);
    }
    for function in &mapping.functions {
        println!("function {:016X} ({} counters)", function.name_ref, function.num_counters());
        for region in &function.regions {
            let file = function.file_ids[region.file_id as usize];
            let kind = match region.kind {
                DescriptorKind::Code => format!("Code #{}", region.counter_id),
                DescriptorKind::Gap => format!("Gap #{}", region.counter_id),
                DescriptorKind::Expansion => format!(
                    "Expansion -> file {}",
                    function.file_ids[region.expanded_file_id as usize]
                ),
            };
            println!(
                "  file {}: {} {}:{} -> {}:{}",
                file, kind, region.start_line, region.start_column, region.end_line, region.end_column
            );
        }
    }
    Ok(())
}
