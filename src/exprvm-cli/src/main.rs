// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::error;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::result::Result as StdResult;
use std::str::FromStr;

use clap::{Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use exprvm_engine::{
    CompileOptions, ExecutionMode, Program, Type, Value, Vm, compile, decompile,
    discover_variables, translate,
};

const EXIT_FAILURE: i32 = 1;

macro_rules! die(
    ($($arg:tt)*) => { {
        eprintln!($($arg)*);
        std::process::exit(EXIT_FAILURE)
    } }
);

type CliResult<T> = StdResult<T, Box<dyn error::Error>>;

#[derive(Parser, Debug)]
#[command(name = "exprvm", version)]
#[command(about = "Translate, compile and run typed infix expressions")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the postfix translation of infix assignments
    Translate(Source),
    /// Compile, then print the decompiled program and its sizes
    Inspect {
        #[command(flatten)]
        build: BuildArgs,

        /// Also list inserted casts and each instruction's types
        #[arg(long)]
        types: bool,
    },
    /// Compile and execute, then print every output variable
    Run {
        #[command(flatten)]
        build: BuildArgs,

        /// fast, safe or debug
        #[arg(long, default_value = "fast")]
        mode: ExecutionMode,

        /// How many times to execute the program
        #[arg(long, default_value_t = 1)]
        iterations: usize,
    },
}

#[derive(Args, Debug)]
struct Source {
    /// Source text; read from --file or stdin when absent
    expr: Option<String>,

    /// Read the source text from FILE
    #[arg(short, long, value_name = "FILE")]
    file: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct BuildArgs {
    #[command(flatten)]
    source: Source,

    /// The source is postfix text rather than infix
    #[arg(long)]
    postfix: bool,

    /// Bind a variable as name=type or name=type:value
    #[arg(long = "var", value_name = "BINDING")]
    vars: Vec<VarArg>,

    /// JSON file with compile options
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq)]
enum Initial {
    Scalar(Value),
    /// row-major elements
    Matrix(Vec<f64>),
}

#[derive(Clone, Debug, PartialEq)]
struct VarArg {
    name: String,
    ty: Type,
    initial: Option<Initial>,
}

impl FromStr for VarArg {
    type Err = String;

    fn from_str(s: &str) -> StdResult<Self, Self::Err> {
        let Some((name, rest)) = s.split_once('=') else {
            return Err(format!("expected name=type[:value], got '{s}'"));
        };
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("missing variable name in '{s}'"));
        }
        let (ty_text, value_text) = match rest.split_once(':') {
            Some((ty, value)) => (ty.trim(), Some(value.trim())),
            None => (rest.trim(), None),
        };
        let ty: Type = ty_text.parse().map_err(|_| format!("unknown type '{ty_text}'"))?;

        let initial = match (ty, value_text) {
            (_, None) => None,
            (Type::Scalar(kind), Some(text)) => match Value::parse(kind, text) {
                Some(value) => Some(Initial::Scalar(value)),
                None => return Err(format!("'{text}' is not a valid {kind}")),
            },
            (Type::Matrix { .. }, Some(text)) => {
                let values = text
                    .split(',')
                    .map(|x| x.trim().parse::<f64>())
                    .collect::<StdResult<Vec<_>, _>>()
                    .map_err(|err| format!("bad matrix value in '{text}': {err}"))?;
                Some(Initial::Matrix(values))
            }
            (Type::Void, Some(_)) => return Err(format!("'{ty_text}' cannot hold a value")),
        };

        Ok(VarArg {
            name: name.to_owned(),
            ty,
            initial,
        })
    }
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn read_source(source: &Source) -> CliResult<String> {
    if let Some(ref expr) = source.expr {
        return Ok(expr.clone());
    }
    if let Some(ref path) = source.file {
        return fs::read_to_string(path)
            .map_err(|err| format!("{}: {err}", path.display()).into());
    }
    let mut text = String::new();
    io::stdin().read_to_string(&mut text)?;
    Ok(text)
}

fn load_options(path: Option<&Path>) -> CliResult<CompileOptions> {
    let Some(path) = path else {
        return Ok(CompileOptions::default());
    };
    let text =
        fs::read_to_string(path).map_err(|err| format!("{}: {err}", path.display()))?;
    let options = CompileOptions::from_json(&text)?;
    debug!(?options, "loaded compile options");
    Ok(options)
}

/// Points at the offending bytes of a syntax error.
fn syntax_error(source: &str, start: usize, end: usize, code: impl std::fmt::Display) -> String {
    let end = end.max(start + 1);
    format!(
        "syntax error ({code}):\n    {}\n    {}{}",
        source.trim_end(),
        " ".repeat(start),
        "^".repeat(end - start)
    )
}

fn to_postfix(text: &str) -> CliResult<String> {
    translate(text).map_err(|err| {
        syntax_error(text, err.start as usize, err.end as usize, err.code).into()
    })
}

fn build_program(args: &BuildArgs) -> CliResult<Program> {
    let text = read_source(&args.source)?;
    let postfix = if args.postfix {
        text
    } else {
        to_postfix(&text)?
    };

    let mut vars = discover_variables(&postfix)?;
    for var in args.vars.iter() {
        vars.bind(&var.name, var.ty, None)?;
    }
    let options = load_options(args.config.as_deref())?;
    Ok(compile(&postfix, vars, &options)?)
}

fn set_initial_values(vm: &mut Vm, bindings: &[VarArg]) -> CliResult<()> {
    for var in bindings {
        match var.initial {
            Some(Initial::Scalar(value)) => vm.set_value(&var.name, value)?,
            Some(Initial::Matrix(ref values)) => vm.set_matrix(&var.name, values)?,
            None => {}
        }
    }
    Ok(())
}

fn write_outputs(vm: &Vm, out: &mut dyn Write) -> CliResult<()> {
    for var in vm.program().outputs() {
        let name = var.name();
        if var.ty().is_matrix() {
            let values: Vec<String> = vm.matrix(name)?.iter().map(|x| x.to_string()).collect();
            writeln!(out, "{name} = [{}]", values.join(", "))?;
        } else {
            writeln!(out, "{name} = {}", vm.value(name)?)?;
        }
    }
    Ok(())
}

fn run_command(command: &Command, out: &mut dyn Write) -> CliResult<()> {
    match command {
        Command::Translate(source) => {
            let text = read_source(source)?;
            write!(out, "{}", to_postfix(&text)?)?;
        }
        Command::Inspect { build, types } => {
            let program = build_program(build)?;
            write!(out, "{}", decompile(&program, *types))?;
            writeln!(out)?;
            let sizes = program.sizes();
            writeln!(out, "constants:       {} bytes", sizes.constants)?;
            writeln!(out, "variables:       {} bytes", sizes.variables)?;
            writeln!(out, "code:            {} instructions", sizes.code)?;
            writeln!(out, "max stack depth: {}", sizes.max_stack_depth)?;
        }
        Command::Run {
            build,
            mode,
            iterations,
        } => {
            let mut vm = Vm::new(build_program(build)?);
            set_initial_values(&mut vm, &build.vars)?;
            let mut trace = String::new();
            for _ in 0..*iterations {
                trace.clear();
                vm.execute(*mode, Some(&mut trace))?;
                write!(out, "{trace}")?;
            }
            debug!(%mode, iterations, "executed program");
            write_outputs(&vm, out)?;
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if let Err(err) = run_command(&cli.command, &mut out) {
        die!("error: {err}");
    }
}
