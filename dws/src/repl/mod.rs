//! REPL (Read-Eval-Print Loop) for DWS

use crate::ast::{Item, Stmt};
use crate::error::CompileError;
use crate::interp::{Interpreter, Value};
use crate::parser::parse_source;
use rustyline::error::ReadlineError;
use rustyline::{DefaultEditor, Result as RlResult};
use std::io::Write;
use std::path::PathBuf;
use std::rc::Rc;

const PROMPT: &str = "> ";
const CONTINUATION_PROMPT: &str = ".. ";
const HISTORY_FILE: &str = ".dws_history";

/// REPL state
pub struct Repl {
    editor: DefaultEditor,
    interpreter: Interpreter,
    history_path: Option<PathBuf>,
    /// Lines of an unfinished multi-line input
    pending: String,
}

impl Repl {
    /// Create a new REPL
    pub fn new() -> RlResult<Self> {
        let editor = DefaultEditor::new()?;
        let interpreter = Interpreter::new();

        // Try to find history file in home directory
        let history_path = dirs_home().map(|h| h.join(HISTORY_FILE));

        let mut repl = Repl {
            editor,
            interpreter,
            history_path,
            pending: String::new(),
        };

        if let Some(ref path) = repl.history_path {
            let _ = repl.editor.load_history(path);
        }

        Ok(repl)
    }

    /// Run the REPL
    pub fn run(&mut self) -> RlResult<()> {
        println!("DWS REPL v{}", env!("CARGO_PKG_VERSION"));
        println!("Type :help for help, :quit to exit.\n");

        loop {
            let prompt = if self.pending.is_empty() { PROMPT } else { CONTINUATION_PROMPT };
            match self.editor.readline(prompt) {
                Ok(line) => {
                    let trimmed = line.trim();

                    if trimmed.is_empty() && self.pending.is_empty() {
                        continue;
                    }

                    let _ = self.editor.add_history_entry(trimmed);

                    if self.pending.is_empty() && trimmed.starts_with(':') {
                        if self.handle_command(trimmed) {
                            break;
                        }
                        continue;
                    }

                    self.feed(&line);
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    self.pending.clear();
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!("Goodbye!");
                    break;
                }
                Err(err) => {
                    eprintln!("Error: {err}");
                    break;
                }
            }
        }

        if let Some(ref path) = self.history_path {
            let _ = self.editor.save_history(path);
        }

        Ok(())
    }

    /// Handle REPL commands (starting with :)
    fn handle_command(&mut self, cmd: &str) -> bool {
        match cmd {
            ":quit" | ":q" | ":exit" => {
                println!("Goodbye!");
                true
            }
            ":help" | ":h" | ":?" => {
                self.print_help();
                false
            }
            ":clear" => {
                print!("\x1B[2J\x1B[1;1H");
                false
            }
            _ => {
                println!("Unknown command: {cmd}");
                println!("Type :help for help.");
                false
            }
        }
    }

    fn print_help(&self) {
        println!("DWS REPL Commands:");
        println!("  :help, :h, :?   Show this help");
        println!("  :quit, :q       Exit the REPL");
        println!("  :clear          Clear the screen");
        println!();
        println!("You can enter:");
        println!("  - Statements: var x := 10; PrintLn(x * 2);");
        println!("  - Expressions (value is echoed): 1 + 2");
        println!("  - Declarations: type, procedure and function blocks");
        println!();
        println!("Input continues on the next line while a block is open");
        println!("(begin/end, class/end, try/end, ...).");
    }

    /// Add a line; evaluates once the accumulated input is complete.
    /// Returns `true` when the input was evaluated.
    fn feed(&mut self, line: &str) -> bool {
        if !self.pending.is_empty() {
            self.pending.push('\n');
        }
        self.pending.push_str(line);

        if needs_more(&self.pending) {
            return false;
        }
        let source = std::mem::take(&mut self.pending);
        self.eval_source(&source);
        true
    }

    /// Parse and run a complete input; a lone expression has its value echoed
    fn eval_source(&mut self, source: &str) {
        let program = match parse_source(source) {
            Ok(program) => program,
            Err(err) => {
                eprintln!("Parse error: {}", err.message());
                return;
            }
        };

        if let [Item::Stmt(stmt)] = program.items.as_slice()
            && let Stmt::Expr(expr) = &stmt.node
        {
            let env = Rc::clone(self.interpreter.global_env());
            match self.interpreter.eval(expr, &env) {
                Ok(Value::Nil) => {}
                Ok(Value::Variant(v)) if v.value.is_none() => {}
                Ok(value) => println!("{value}"),
                Err(err) => eprintln!("{err}"),
            }
        } else if let Err(err) = self.interpreter.run(&program) {
            eprintln!("{err}");
        }
        let _ = std::io::stdout().flush();
    }
}

/// Input whose parse fails only because it ends too early
fn needs_more(source: &str) -> bool {
    match parse_source(source) {
        Err(CompileError::Parser { span, .. }) => span.start >= source.trim_end().len(),
        _ => false,
    }
}

/// Get home directory
fn dirs_home() -> Option<PathBuf> {
    #[cfg(windows)]
    {
        std::env::var("USERPROFILE").ok().map(PathBuf::from)
    }
    #[cfg(not(windows))]
    {
        std::env::var("HOME").ok().map(PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::Output;
    use std::cell::RefCell;

    fn captured() -> (Repl, Rc<RefCell<String>>) {
        let mut repl = Repl::new().unwrap();
        let buffer = Rc::new(RefCell::new(String::new()));
        repl.interpreter.set_output(Output::Buffer(Rc::clone(&buffer)));
        (repl, buffer)
    }

    #[test]
    fn test_handle_command_quit() {
        let mut repl = Repl::new().unwrap();
        assert!(repl.handle_command(":quit"));
        assert!(repl.handle_command(":q"));
        assert!(repl.handle_command(":exit"));
    }

    #[test]
    fn test_handle_command_non_quit() {
        let mut repl = Repl::new().unwrap();
        assert!(!repl.handle_command(":help"));
        assert!(!repl.handle_command(":clear"));
        assert!(!repl.handle_command(":unknown"));
    }

    #[test]
    fn test_needs_more() {
        assert!(needs_more("begin"));
        assert!(needs_more("type TFoo = class"));
        assert!(needs_more("procedure P;\nbegin\n  PrintLn(1);"));
        assert!(!needs_more("PrintLn(1);"));
        assert!(!needs_more("begin PrintLn(1); end;"));
        // a genuine syntax error is reported, not continued
        assert!(!needs_more("PrintLn(1 +;) end"));
    }

    #[test]
    fn test_state_survives_between_inputs() {
        let (mut repl, out) = captured();
        assert!(repl.feed("var x := 20;"));
        assert!(repl.feed("function Twice(n: Integer): Integer; begin Result := n * 2; end;"));
        assert!(repl.feed("PrintLn(Twice(x) + 2);"));
        assert_eq!(out.borrow().as_str(), "42\n");
    }

    #[test]
    fn test_multi_line_block() {
        let (mut repl, out) = captured();
        assert!(!repl.feed("begin"));
        assert!(!repl.feed("  PrintLn('inside');"));
        assert!(repl.feed("end;"));
        assert_eq!(out.borrow().as_str(), "inside\n");
        assert!(repl.pending.is_empty());
    }

    #[test]
    fn test_errors_do_not_end_the_session() {
        let (mut repl, out) = captured();
        assert!(repl.feed("PrintLn(Missing);"));
        assert!(repl.feed("raise Exception.Create('boom');"));
        assert!(repl.feed("PrintLn('still here');"));
        assert_eq!(out.borrow().as_str(), "still here\n");
    }

    #[test]
    fn test_history_file_name() {
        let repl = Repl::new().unwrap();
        if let Some(path) = repl.history_path {
            assert!(path.to_string_lossy().ends_with(HISTORY_FILE));
        }
    }
}
