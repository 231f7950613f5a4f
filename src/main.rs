use anyhow::{Context, Result, anyhow};
use malxp::ast::Value;
use malxp::evaluator::{self, Env, EnvConfig};
use malxp::printer::pr_str;
use malxp::{Error, SyntaxErrorKind};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::path::{Path, PathBuf};
use std::process;
use std::thread;
use tracing_subscriber::EnvFilter;

/// Stack of the thread that runs the interpreter
const EVAL_STACK_SIZE: usize = 256 * 1024 * 1024;

/// Evaluation depth limit that fits in [`EVAL_STACK_SIZE`]
const EVAL_DEPTH_LIMIT: usize = 10_000;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    // Values are not `Send`, so the environment is created on the worker thread
    let worker = thread::Builder::new()
        .name("malxp".to_owned())
        .stack_size(EVAL_STACK_SIZE)
        .spawn(move || {
            evaluator::set_max_eval_depth(EVAL_DEPTH_LIMIT);
            run(args)
        })
        .context("Unable to start the interpreter thread")?;
    worker
        .join()
        .map_err(|_| anyhow!("interpreter thread panicked"))?
}

fn run(args: Vec<String>) -> Result<()> {
    let mut args = args.into_iter();
    match args.next() {
        Some(script) => {
            let script_args: Vec<String> = args.collect();
            if let Err(err) = run_script(Path::new(&script), script_args) {
                eprintln!("Error: {err:#}");
                process::exit(1);
            }
            Ok(())
        }
        None => run_repl(),
    }
}

/// Environment errors hold `Rc` values, so they are rendered to text before
/// crossing into `anyhow`.
fn to_anyhow(err: Error) -> anyhow::Error {
    anyhow!("{err}")
}

fn run_script(path: &Path, script_args: Vec<String>) -> Result<()> {
    let env = evaluator::create_global_env_with_config(EnvConfig::default())
        .map_err(to_anyhow)
        .context("Unable to initialize the global environment")?;
    env.define(
        "*ARGV*",
        Value::list(script_args.into_iter().map(Value::String).collect()),
    );

    let path: PathBuf = path.into();
    let load = Value::list(vec![
        malxp::ast::sym("load-file"),
        Value::String(path.display().to_string()),
    ]);
    evaluator::eval(&load, &env)
        .map_err(to_anyhow)
        .with_context(|| format!("Unable to run script {}", path.display()))?;
    Ok(())
}

fn run_repl() -> Result<()> {
    println!("malxp - a small Lisp with macros, tail calls and atoms");
    println!("Enter forms like: (+ 1 2)");
    println!("Type :help for more commands, or Ctrl+D to exit.");
    println!();

    let mut rl = DefaultEditor::new().context("Could not initialize REPL")?;
    let env = evaluator::create_global_env()
        .map_err(to_anyhow)
        .context("Unable to initialize the global environment")?;

    loop {
        match rl.readline("user> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                match line {
                    ":help" => {
                        print_help();
                        continue;
                    }
                    ":env" => {
                        print_environment(&env);
                        continue;
                    }
                    ":quit" | ":exit" => {
                        println!("Goodbye!");
                        break;
                    }
                    _ => {}
                }

                match evaluator::rep(line, &env) {
                    Ok(output) => println!("{output}"),
                    // A line holding only a comment produces no form and no output
                    Err(Error::SyntaxError(err)) if err.kind == SyntaxErrorKind::Empty => {}
                    Err(err) => {
                        tracing::debug!(input = line, error = %err, "evaluation failed");
                        println!("Error: {err}");
                    }
                }
            }

            Err(ReadlineError::Eof | ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                return Err(err).context("Failed to read input line");
            }
        }
    }
    Ok(())
}

fn print_help() {
    println!("malxp REPL commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show current environment bindings");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+D     - Exit the interpreter");
    println!();
    println!("Special forms:");
    println!("  def! let* do if fn* quote quasiquote quasiquoteexpand");
    println!("  defmacro! macroexpand");
    println!();
    println!("Examples:");
    println!("  (def! square (fn* (x) (* x x)))");
    println!("  (let* (a 1 b (+ a 1)) [a b])");
    println!("  (defmacro! unless (fn* (p a b) `(if ~p ~b ~a)))");
    println!("  (def! counter (atom 0)) (swap! counter + 1)");
    println!("  (load-file \"script.mal\")");
    println!();
}

fn print_environment(env: &Env) {
    let bindings = env.get_all_bindings();
    let (builtins, defined): (Vec<_>, Vec<_>) = bindings
        .into_iter()
        .partition(|(_, value)| matches!(value, Value::BuiltinFunction { .. }));

    println!("Builtins ({}):", builtins.len());
    for row in builtins.chunks(4) {
        let names: Vec<String> = row.iter().map(|(name, _)| format!("{name:<15}")).collect();
        println!("  {}", names.join("").trim_end());
    }
    println!();

    if defined.is_empty() {
        println!("No user definitions yet.");
        return;
    }
    println!("Definitions ({}):", defined.len());
    for (name, value) in defined {
        println!("  {name} = {}", pr_str(&value, true));
    }
}
