//! The interactive read-eval-print loop.

use rlox::vm::VM;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

/// Runs the REPL until the user sends EOF (Ctrl-D) or interrupts (Ctrl-C).
///
/// Each line is compiled and run against the same [VM], so a variable defined
/// on one line stays visible on later lines — unlike a script file, which
/// only ever compiles once.
pub fn run() {
    let mut vm = VM::new();
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(err) => {
            eprintln!("Could not start the interactive prompt: {err}");
            return;
        }
    };

    loop {
        match editor.readline("> ") {
            Ok(line) => {
                let _ = editor.add_history_entry(line.as_str());
                // A single bad line shouldn't end the session: report the
                // error and keep reading.
                if let Err(err) = vm.interpret(&line) {
                    eprintln!("{err}");
                }
            }
            Err(ReadlineError::Interrupted) => break,
            Err(ReadlineError::Eof) => {
                println!("Goodbye.");
                break;
            }
            Err(err) => {
                eprintln!("Error reading line: {err}");
                break;
            }
        }
    }
}
