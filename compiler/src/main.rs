use clap::Parser;
use std::path::PathBuf;

use dfc::op::{LatencyTable, Operator};
use dfc::pass::PassId;
use dfc::pipeline::{run_pipeline, CompilationState, CompileOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum EmitStage {
    Verilog,
    Schedule,
    Dot,
    BuildInfo,
}

#[derive(Parser, Debug)]
#[command(
    name = "dfc",
    version,
    about = "Dataflow compiler: schedules, balances, and allocates a JSON dataflow graph into a pipelined Verilog module"
)]
struct Cli {
    /// Input graph description (.json)
    graph: PathBuf,

    /// Output stage
    #[arg(long, value_enum, default_value_t = EmitStage::Verilog)]
    emit: EmitStage,

    /// Output file path (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Module name (defaults to the description's name, then the file stem)
    #[arg(long)]
    name: Option<String>,

    /// Clock port name
    #[arg(long, default_value = "CLK")]
    clock: String,

    /// Synchronous reset port name
    #[arg(long, default_value = "RST")]
    reset: String,

    /// Operator latency override, e.g. `mul=3` (repeatable)
    #[arg(long = "latency", value_parser = LatencyTable::parse_override)]
    latency: Vec<(Operator, u32)>,

    /// Print compiler passes and timing (-vv for scheduling decisions)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .format_timestamp(None)
        .filter_level(level)
        .target(env_logger::Target::Stderr)
        .init();

    log::info!("dfc: graph = {}", cli.graph.display());
    log::info!("dfc: emit  = {:?}", cli.emit);

    // ── Read and load the description ──
    let text = match std::fs::read_to_string(&cli.graph) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("dfc: error: {}: {}", cli.graph.display(), e);
            std::process::exit(2);
        }
    };
    let loaded = match dfc::load::parse_graph(&text) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("dfc: error: {}: {}", cli.graph.display(), e);
            std::process::exit(1);
        }
    };

    let module_name = cli
        .name
        .clone()
        .or(loaded.name.clone())
        .or_else(|| {
            cli.graph
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "top".to_string());
    let mut latency = loaded.latency.clone();
    for &(op, stages) in &cli.latency {
        latency.set(op, stages);
    }
    let options = CompileOptions {
        module_name,
        clock: cli.clock.clone(),
        reset: cli.reset.clone(),
        latency,
        ..CompileOptions::default()
    };

    // ── Run the pipeline ──
    let terminal = match cli.emit {
        EmitStage::Schedule => PassId::Balance,
        EmitStage::Verilog | EmitStage::Dot | EmitStage::BuildInfo => PassId::Finalize,
    };
    let mut state = CompilationState::new(&loaded.dataflow, &loaded.outputs, options);
    let result = run_pipeline(&mut state, terminal, |_, diags| {
        for d in diags {
            eprintln!("{}", d);
        }
    });
    if result.is_err() {
        std::process::exit(1);
    }

    let out = match cli.emit {
        EmitStage::Schedule => match state.stage_report() {
            Some(report) => report.to_string(),
            None => {
                eprintln!("dfc: error: schedule not available");
                std::process::exit(1);
            }
        },
        EmitStage::Verilog | EmitStage::Dot | EmitStage::BuildInfo => {
            let design = match state.into_design() {
                Ok(d) => d,
                Err(e) => {
                    eprintln!("dfc: error: {}", e);
                    std::process::exit(1);
                }
            };
            match cli.emit {
                EmitStage::Dot => dfc::dot::emit_dot(&design),
                EmitStage::BuildInfo => design.provenance.to_json(),
                _ => design.verilog(),
            }
        }
    };

    // ── Write output ──
    match &cli.output {
        Some(path) => {
            if let Err(e) = std::fs::write(path, out) {
                eprintln!("dfc: error: {}: {}", path.display(), e);
                std::process::exit(2);
            }
            log::info!("dfc: wrote {}", path.display());
        }
        None => print!("{out}"),
    }
}
