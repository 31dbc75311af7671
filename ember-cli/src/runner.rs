//! Builds generated programs with an external toolchain and runs them.

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::process::{Command, Output, Stdio};

use ember_core::{CoreError, Target};
use tempfile::TempDir;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub stdout: String,
    pub exit_code: i32,
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Compile(#[from] CoreError),
    #[error("target compiler rejected the program:\n{0}")]
    TargetCompiler(String),
    #[error("program terminated abnormally:\n{0}")]
    Terminated(String),
    #[error("harness I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// External commands used to build and run generated code.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub cc: String,
    pub node: String,
}

impl Default for Toolchain {
    fn default() -> Self {
        Toolchain {
            cc: "cc".to_string(),
            node: "node".to_string(),
        }
    }
}

/// Runs already generated `code` with `stdin` as its input.
pub fn run(code: &str, target: Target, stdin: &str, toolchain: &Toolchain) -> Result<RunOutput, RunError> {
    let dir = TempDir::new()?;
    match target {
        Target::C => run_c(code, stdin, &toolchain.cc, dir.path()),
        Target::Js => run_js(code, stdin, &toolchain.node, dir.path()),
    }
}

fn run_c(code: &str, stdin: &str, cc: &str, dir: &Path) -> Result<RunOutput, RunError> {
    let source = dir.join("program.c");
    let binary = dir.join("program");
    fs::write(&source, code)?;
    debug!(cc, source = %source.display(), "building generated C");
    let build = Command::new(cc)
        .arg("-std=c11")
        .arg("-o")
        .arg(&binary)
        .arg(&source)
        .output()?;
    if !build.status.success() {
        return Err(RunError::TargetCompiler(combined_output(&build)));
    }
    execute(Command::new(&binary), stdin)
}

fn run_js(code: &str, stdin: &str, node: &str, dir: &Path) -> Result<RunOutput, RunError> {
    let script = dir.join("program.js");
    fs::write(&script, code)?;
    debug!(node, script = %script.display(), "running generated JavaScript");
    let mut command = Command::new(node);
    command.arg(&script);
    execute(command, stdin)
}

fn execute(mut command: Command, stdin: &str) -> Result<RunOutput, RunError> {
    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    if let Some(mut input) = child.stdin.take() {
        match input.write_all(stdin.as_bytes()) {
            Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {}
            other => other?,
        }
    }
    let output = child.wait_with_output()?;
    match output.status.code() {
        Some(exit_code) => Ok(RunOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            exit_code,
        }),
        None => Err(RunError::Terminated(combined_output(&output))),
    }
}

fn combined_output(output: &Output) -> String {
    format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    )
}

#[cfg(test)]
impl Toolchain {
    /// Whether the command that handles `target` answers `--version`.
    pub(crate) fn available(&self, target: Target) -> bool {
        let command = match target {
            Target::C => &self.cc,
            Target::Js => &self.node,
        };
        Command::new(command)
            .arg("--version")
            .output()
            .is_ok_and(|output| output.status.success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRELUDE: &str = "extern fn readInt() : I32;\n";
    const TARGETS: [Target; 2] = [Target::C, Target::Js];

    fn compile_and_run(
        source: &str,
        target: Target,
        stdin: &str,
        toolchain: &Toolchain,
    ) -> Result<RunOutput, RunError> {
        let code = ember_core::compile(source, target)?;
        run(&code, target, stdin, toolchain)
    }

    /// Exit codes of `source` on every target whose toolchain is installed.
    fn exit_codes(source: &str, stdin: &str) -> Vec<(Target, i32)> {
        let toolchain = Toolchain::default();
        let mut codes = Vec::new();
        for target in TARGETS {
            if !toolchain.available(target) {
                eprintln!("skipping {target:?}: toolchain not on PATH");
                continue;
            }
            let output = compile_and_run(&format!("{PRELUDE}{source}"), target, stdin, &toolchain)
                .unwrap_or_else(|err| panic!("{target:?} program should build and run: {err}"));
            codes.push((target, output.exit_code));
        }
        codes
    }

    fn assert_exit(source: &str, stdin: &str, expected: i32) {
        for (target, code) in exit_codes(source, stdin) {
            assert_eq!(code, expected, "{target:?} program: {source}");
        }
    }

    #[test]
    fn returns_a_single_read() {
        assert_exit("readInt()", "10", 10);
    }

    #[test]
    fn reads_in_call_order() {
        assert_exit("readInt() + readInt()", "5\n10", 15);
    }

    #[test]
    fn stores_reads_in_bindings() {
        assert_exit("let x : I32 = readInt(); x", "100", 100);
        assert_exit("let mut x = 5; x = readInt(); x", "10", 10);
    }

    #[test]
    fn calls_functions() {
        assert_exit("fn get(x : I32) : I32 => x; get(readInt())", "100", 100);
        assert_exit("fn fact(n : I32) : I32 => if (n <= 1) 1 else n * fact(n - 1); fact(5)", "", 120);
    }

    #[test]
    fn reads_struct_fields() {
        assert_exit("struct Wrapper {field : I32} let instance = Wrapper {readInt()}; instance.field", "100", 100);
    }

    #[test]
    fn truncates_the_result_to_a_byte() {
        assert_exit("let x = 3; let y = x * 100; y", "", 300 % 256);
    }

    #[test]
    fn closures_keep_their_captures() {
        assert_exit("let base = readInt(); fn add(x : I32) => base + x; add(2)", "40", 42);
        assert_exit("fn make(p : I32) => { let x = p * 2; this }; make(readInt()).x", "4", 8);
        assert_exit(
            "fn counter(start : I32) => { fn next() => start + 1; this }; counter(6).next()",
            "",
            7,
        );
    }

    #[test]
    fn this_carries_enclosing_bindings() {
        assert_exit(
            "fn get() => { let value = readInt(); fn inner() => this; inner() }; get().value",
            "100",
            100,
        );
    }

    #[test]
    fn blocks_yield_their_last_value() {
        assert_exit("{readInt()}", "100", 100);
        assert_exit("let x = readInt(); {x}", "7", 7);
        assert_exit("let y = { let a = readInt(); a + 1 }; y", "41", 42);
    }

    #[test]
    fn read_int_is_a_function_value() {
        assert_exit("let func : () => I32 = readInt; func()", "100", 100);
        assert_exit("let f = readInt; let a = f(); let b = f(); a * 10 + b", "1\n2", 12);
    }

    #[test]
    fn inner_functions_update_enclosing_bindings() {
        assert_exit("let mut x = 0; fn inc() => x += readInt(); inc(); x", "10", 10);
        assert_exit("let mut n = 1; fn twice() => { n = n * 2; }; twice(); twice(); n", "", 4);
    }

    #[test]
    fn strings_dereference_to_their_first_byte() {
        assert_exit("let s = \"abc\"; *s", "", 97);
    }

    #[test]
    fn narrow_arithmetic_wraps() {
        assert_exit("let a = 200U8; let b = 100U8; (a + b) / 2", "", 22);
        assert_exit("let mut c = 250U8; c += 10U8; c", "", 4);
    }

    #[test]
    fn loops_and_pointers() {
        assert_exit(
            "let mut sum = 0; let mut i = 0; while (i < 5) { i += 1; sum += i; } let p = &mut sum; *p += 1; sum",
            "",
            16,
        );
    }

    #[test]
    fn arrays_copy_by_value() {
        assert_exit("let a = [1, 2, 3]; let mut b = a; b[0] = 9; a[0] + b[0]", "", 10);
    }

    #[test]
    fn compile_errors_are_reported() {
        let err = compile_and_run(
            &format!("{PRELUDE}let x = 5; x = readInt(); x"),
            Target::C,
            "10",
            &Toolchain::default(),
        )
        .expect_err("immutable reassignment should not compile");
        assert!(matches!(err, RunError::Compile(CoreError::Mutability(_))));
    }

    #[test]
    fn rejected_code_reports_the_compiler_output() {
        let toolchain = Toolchain::default();
        if !toolchain.available(Target::C) {
            return;
        }
        let err = run("int main(void) { return undefined_name; }", Target::C, "", &toolchain)
            .expect_err("invalid C should not build");
        assert!(matches!(err, RunError::TargetCompiler(output) if output.contains("undefined_name")));
    }

    #[test]
    fn availability_follows_the_configured_commands() {
        let toolchain = Toolchain {
            cc: "ember-missing-cc".to_string(),
            node: "ember-missing-node".to_string(),
        };
        assert!(!toolchain.available(Target::C));
        assert!(!toolchain.available(Target::Js));
    }
}
