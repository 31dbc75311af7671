use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use ember_core::{Compiler, Target};
use tracing_subscriber::EnvFilter;

mod runner;

use runner::Toolchain;

/// Command line options of the Ember compiler.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[arg(short, long, help = "Source file (defaults to stdin)")]
    input: Option<String>,

    #[arg(short, long, help = "Output file (defaults to stdout)")]
    output: Option<String>,

    #[arg(
        long,
        value_name = "FORMAT",
        default_value = "c",
        help = "Output format: c, js"
    )]
    emit: String,

    #[arg(long, help = "Build and run the generated program")]
    run: bool,

    #[arg(
        long,
        value_name = "PATH",
        help = "File passed to the program's stdin with --run"
    )]
    stdin: Option<String>,

    #[arg(long, value_name = "CMD", default_value = "cc", help = "C compiler used by --run")]
    cc: String,

    #[arg(long, value_name = "CMD", default_value = "node", help = "JavaScript runtime used by --run")]
    node: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("ember_core=warn".parse()?))
        .init();
    let cli = Cli::parse();
    execute(cli)
}

fn execute(cli: Cli) -> Result<()> {
    let source = match &cli.input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read input file {path}"))?,
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let target = Target::from_name(&cli.emit)
        .ok_or_else(|| anyhow::anyhow!("unsupported emit format: {}", cli.emit))?;
    let compiler = Compiler::new(target);
    let code = compiler.compile(&source)?;

    match &cli.output {
        Some(path) => write_output(path, code.as_bytes())?,
        None if !cli.run => print!("{code}"),
        None => {}
    }

    if cli.run {
        let stdin = match &cli.stdin {
            Some(path) => fs::read_to_string(path)
                .with_context(|| format!("failed to read stdin file {path}"))?,
            None => String::new(),
        };
        let toolchain = Toolchain {
            cc: cli.cc,
            node: cli.node,
        };
        let output = runner::run(&code, compiler.target(), &stdin, &toolchain)?;
        print!("{}", output.stdout);
        println!("Program exited with {}", output.exit_code);
    }

    Ok(())
}

fn write_output(path: &str, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = PathBuf::from(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {parent:?}"))?;
        }
    }
    fs::write(path, bytes).with_context(|| format!("failed to write output file {path}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_cmd::Command;
    use predicates::prelude::*;
    use tempfile::tempdir;

    #[test]
    fn emits_c_to_a_file() {
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("input.em");
        fs::write(&input_path, "let x = 2; x * 3").expect("write input");
        let output_path = dir.path().join("out/program.c");

        Command::cargo_bin("ember-cli")
            .expect("binary exists")
            .arg("--input")
            .arg(&input_path)
            .arg("--output")
            .arg(&output_path)
            .assert()
            .success();

        let code = fs::read_to_string(&output_path).expect("read output");
        assert!(code.contains("int main(void)"));
        assert!(code.contains("return (int)(uint8_t)(x * 3);"));
    }

    #[test]
    fn emits_js_to_stdout() {
        Command::cargo_bin("ember-cli")
            .expect("binary exists")
            .arg("--emit")
            .arg("js")
            .write_stdin("let x = 2; x * 3")
            .assert()
            .success()
            .stdout(predicate::str::contains("process.exitCode = Number(x * 3) & 255;"));
    }

    #[test]
    fn rejects_unknown_formats() {
        Command::cargo_bin("ember-cli")
            .expect("binary exists")
            .arg("--emit")
            .arg("wasm")
            .write_stdin("1")
            .assert()
            .failure()
            .stderr(predicate::str::contains("unsupported emit format: wasm"));
    }

    #[test]
    fn reports_compile_errors() {
        Command::cargo_bin("ember-cli")
            .expect("binary exists")
            .write_stdin("let x = 5; x = 6; x")
            .assert()
            .failure()
            .stderr(predicate::str::contains("invalid assignment"));
    }

    #[test]
    fn reports_missing_input() {
        let dir = tempdir().expect("tempdir");

        Command::cargo_bin("ember-cli")
            .expect("binary exists")
            .arg("--input")
            .arg(dir.path().join("missing.em"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("failed to read input file"));
    }

    #[test]
    fn runs_js_with_program_input() {
        if !Toolchain::default().available(Target::Js) {
            return;
        }
        let dir = tempdir().expect("tempdir");
        let stdin_path = dir.path().join("stdin.txt");
        fs::write(&stdin_path, "40\n2\n").expect("write stdin");

        Command::cargo_bin("ember-cli")
            .expect("binary exists")
            .arg("--emit")
            .arg("js")
            .arg("--stdin")
            .arg(&stdin_path)
            .arg("--run")
            .write_stdin("extern fn readInt() : I32;\nreadInt() + readInt()")
            .assert()
            .success()
            .stdout(predicate::str::contains("Program exited with 42"));
    }

    #[test]
    fn runs_with_the_configured_c_compiler() {
        Command::cargo_bin("ember-cli")
            .expect("binary exists")
            .arg("--cc")
            .arg("ember-missing-cc")
            .arg("--run")
            .write_stdin("1")
            .assert()
            .failure();
    }

    #[test]
    fn runs_c_with_program_input() {
        if !Toolchain::default().available(Target::C) {
            return;
        }
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("input.em");
        fs::write(&input_path, "extern fn readInt() : I32;\nreadInt() + readInt()").expect("write input");
        let stdin_path = dir.path().join("stdin.txt");
        fs::write(&stdin_path, "5\n10\n").expect("write stdin");
        let output_path = dir.path().join("program.c");

        Command::cargo_bin("ember-cli")
            .expect("binary exists")
            .arg("--input")
            .arg(&input_path)
            .arg("--output")
            .arg(&output_path)
            .arg("--stdin")
            .arg(&stdin_path)
            .arg("--run")
            .assert()
            .success()
            .stdout(predicate::str::contains("Program exited with 15"));

        assert!(output_path.exists(), "C output was not created");
    }
}
