use rill_debugger::debugger::breakpoints::ToggleMode;
use rill_debugger::debugger::render::{Command, DebugView, FrameView, InputSource};
use rill_debugger::debugger::Debugger;
use rill_debugger::executor::Outcome;
use rill_debugger::surface;
use std::fs;
use std::io::{self, BufRead, Write};

fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let serve_mode = args.iter().any(|a| a == "--serve");
    let script = args.iter().find(|a| !a.starts_with("--"));

    let source = match script {
        Some(path) => fs::read_to_string(path)?,
        None => String::new(),
    };
    let debugger = match Debugger::load(&source) {
        Ok(debugger) => debugger,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    };

    if serve_mode {
        surface::serve(debugger)
    } else {
        run_interactive(debugger)
    }
}

fn run_interactive(mut debugger: Debugger) -> io::Result<()> {
    let names = debugger.program.function_names();
    eprintln!("rill debugger — {} function(s) loaded", names.len());
    if !names.is_empty() {
        eprintln!("  {}", names.join(", "));
    }
    print_help();

    let stdin = io::stdin();
    loop {
        if let Some(warning) = debugger.store.header.take_warning() {
            eprintln!("warning: {warning}");
        }
        eprint!("rdb> ");
        io::stderr().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let Some(parts) = shlex::split(line.trim()) else {
            eprintln!("unbalanced quotes");
            continue;
        };
        let Some((command, rest)) = parts.split_first() else {
            continue;
        };
        match (command.as_str(), rest) {
            ("quit", _) | ("q", _) => break,
            ("help", _) | ("?", _) => print_help(),
            ("stashes", _) => {
                for id in debugger.store.ids() {
                    eprintln!("  {id}");
                }
            }
            ("capture", [text, cursor]) => {
                let cursor = cursor.parse().unwrap_or(0);
                if let Some(replacement) = debugger.capture_or_warn(text, cursor) {
                    eprintln!("replacement for `{}`:", replacement.callee);
                    println!("{}", replacement.text);
                }
            }
            ("trace", [text]) => match debugger.capture_stacktrace(text) {
                Ok(replacements) if replacements.is_empty() => {
                    eprintln!("no fault: nothing captured");
                }
                Ok(replacements) => {
                    for r in replacements {
                        eprintln!("-- {} ({})", r.callee, r.stash_id);
                        println!("{}", r.text);
                    }
                }
                Err(err) => eprintln!("warning: {err}"),
            },
            ("eval", [text]) => match debugger.eval(text) {
                Ok(value) => println!("{value}"),
                Err(err) => eprintln!("warning: {err}"),
            },
            ("debug", [text]) => {
                let mut input = TerminalInput;
                let mut view = TerminalView;
                match debugger.run_session(text, &mut input, &mut view) {
                    Ok(Outcome::Value(Some(value))) => println!("{value}"),
                    Ok(Outcome::Value(None)) => eprintln!("aborted"),
                    Ok(Outcome::Fault(fault)) => eprintln!("fault: {fault}"),
                    Err(err) => eprintln!("warning: {err}"),
                }
            }
            _ => eprintln!("unknown command (try `help`)"),
        }
    }
    Ok(())
}

fn print_help() {
    eprintln!("commands:");
    eprintln!("  capture \"<buffer>\" <cursor>   capture the call under the cursor");
    eprintln!("  trace \"<buffer>\"              capture every level of a faulting run");
    eprintln!("  debug \"<buffer>\"              step through a buffer or bind-expression");
    eprintln!("  eval \"<buffer>\"               evaluate a buffer");
    eprintln!("  stashes | help | quit");
}

/// Blocking keyboard decode for the stepping loop. Arrow keys arrive as
/// escape sequences; single-letter fallbacks cover line-buffered input.
struct TerminalInput;

impl InputSource for TerminalInput {
    fn next_command(&mut self, _view: &FrameView) -> Command {
        let stdin = io::stdin();
        loop {
            eprint!("step> ");
            let _ = io::stderr().flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) => return Command::Abort,
                Ok(_) => {}
                Err(_) => return Command::Abort,
            }
            match decode_key(line.trim_end_matches(['\r', '\n'])) {
                Some(command) => return command,
                None => eprintln!("unknown key (? for help)"),
            }
        }
    }
}

fn decode_key(line: &str) -> Option<Command> {
    match line {
        "" | " " => return Some(Command::Step),
        "c" => return Some(Command::Continue),
        "\x1b[C" | "i" => return Some(Command::StepIn),
        "\x1b[D" | "f" => return Some(Command::Finish),
        "\x1b[A" | "u" => return Some(Command::ViewCaller),
        "\x1b[B" | "v" => return Some(Command::ViewCallee),
        "q" => return Some(Command::Abort),
        "?" => return Some(Command::Help),
        _ => {}
    }
    let mut parts = line.split_whitespace();
    let head = parts.next()?;
    let rest: Vec<&str> = parts.collect();
    match head {
        "b" => Some(Command::SetBreakpoint {
            condition: if rest.is_empty() {
                None
            } else {
                Some(rest.join(" "))
            },
        }),
        "r" | "d" | "e" => {
            let mode = match head {
                "r" => ToggleMode::Remove,
                "d" => ToggleMode::Disable,
                _ => ToggleMode::Enable,
            };
            let line = match rest.first() {
                Some(text) => Some(text.parse().ok()?),
                None => None,
            };
            Some(Command::Toggle { mode, line })
        }
        _ => None,
    }
}

/// Draws the frame window on stderr, clearing the previous draw, and
/// reports the lines consumed (plus one for the input prompt echo).
struct TerminalView;

impl DebugView for TerminalView {
    fn render(&mut self, view: &FrameView, clear: usize) -> usize {
        if clear > 0 {
            eprint!("\x1b[{clear}A\x1b[J");
        }
        let mut consumed = 0;
        let offset_note = if view.view_offset > 0 {
            format!(" (viewing {} above)", view.view_offset)
        } else {
            String::new()
        };
        eprintln!("[{}] depth {}{}", view.callee, view.depth, offset_note);
        consumed += 1;
        for line in &view.window {
            eprintln!(
                "{}{}{:>4} | {}",
                if line.current { ">" } else { " " },
                if line.breakpoint { "*" } else { " " },
                line.number,
                line.text
            );
            consumed += 1;
        }
        if !view.locals.is_empty() {
            let locals: Vec<String> = view
                .locals
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect();
            eprintln!("  locals: {}", locals.join("  "));
            consumed += 1;
        }
        if let Some(status) = &view.status {
            eprintln!("-- {status}");
            consumed += 1;
        }
        consumed + 1
    }
}
