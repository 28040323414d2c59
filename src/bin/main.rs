use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use ellis::{
    backend::Value,
    compiler::{Compiler, Options},
    session::Session,
};
use log::{warn, LevelFilter};
use rustyline::{error::ReadlineError, DefaultEditor};

const BANNER: &str = r" ____  __    __    __  ____
(  __)(  )  (  )  (  )/ ___)
 ) _) / (_/\/ (_/\ )( \___ \
(____)\____/\____/(__)(____/";

const PROMPT: &str = ">> ";
const CONTINUATION_PROMPT: &str = "   ";

/// Compiles and runs Ellis programs. Starts an interactive session when no
/// files are given.
#[derive(Parser)]
#[command(name = "ellisc", version)]
struct Cli {
    /// Source files, compiled and run in order.
    files: Vec<PathBuf>,

    /// Print the tokens and the syntax tree of every unit.
    #[arg(short, long)]
    verbose: bool,

    /// Print the generated IR.
    #[arg(long)]
    emit_ir: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    if let Err(error) = simple_logger::SimpleLogger::new()
        .with_level(level)
        .env()
        .init()
    {
        eprintln!("failed to set up logging: {error}");
    }

    let options = Options {
        verbose: cli.verbose,
        emit_ir: cli.emit_ir,
    };
    if cli.files.is_empty() {
        repl(options)
    } else {
        compile(options, &cli.files)
    }
}

fn compile(options: Options, files: &[PathBuf]) -> ExitCode {
    let compiler = Compiler::new(options);
    for file in files {
        match compiler.compile_file(file) {
            Ok(value) => report(value),
            Err(error) => {
                eprintln!("error: {}: {error}", file.display());
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}

fn repl(options: Options) -> ExitCode {
    println!("{BANNER}");
    println!("Ellis {}", env!("CARGO_PKG_VERSION"));

    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(error) => {
            eprintln!("failed to start line editor: {error}");
            return ExitCode::FAILURE;
        }
    };
    let mut session = Session::default().with_options(options);
    let mut buf = String::new();

    loop {
        let prompt = if buf.is_empty() {
            PROMPT
        } else {
            CONTINUATION_PROMPT
        };
        let line = match editor.readline(prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => return ExitCode::SUCCESS,
            Err(error) => {
                eprintln!("failed to read input: {error}");
                return ExitCode::FAILURE;
            }
        };
        let line = line.trim_end();

        if buf.is_empty() {
            match line.trim() {
                "" => continue,
                ":quit" => return ExitCode::SUCCESS,
                ":reset" => {
                    if let Err(error) = session.reset() {
                        eprintln!("error: {error}");
                    }
                    continue;
                }
                _ => {}
            }
        }
        if !line.is_empty() {
            if let Err(error) = editor.add_history_entry(line) {
                warn!("failed to record history: {error}");
            }
        }
        if !buf.is_empty() {
            buf.push('\n');
        }
        buf.push_str(line);

        match session.eval(&buf) {
            Ok(value) => report(value),
            // Keep reading until the statement is complete.
            Err(error) if error.is_incomplete_input() => continue,
            Err(error) => eprintln!("error: {error}"),
        }
        buf.clear();
    }
}

fn report(value: Option<Value>) {
    if let Some(value) = value.filter(|value| !value.is_unit()) {
        println!("{value}");
    }
}
