// Output formatting helpers for CLI commands

/// Print a status message: "  Status message"
pub fn status(action: &str, message: &str) {
    eprintln!("\x1b[1;36m{:>12}\x1b[0m {}", action, message);
}

/// Print a success message with checkmark
pub fn success(message: &str) {
    eprintln!("\x1b[1;32m  \u{2713}\x1b[0m {}", message);
}

/// Print a check/pass item
pub fn check(message: &str) {
    eprintln!("\x1b[32m  \u{2713}\x1b[0m {}", message);
}

/// Print a warning message
pub fn warning(message: &str) {
    eprintln!("\x1b[33m  !\x1b[0m {}", message);
}

/// Print an error message
pub fn error(message: &str) {
    eprintln!("\x1b[1;31merror:\x1b[0m {}", message);
}

/// Print an info message
pub fn info(message: &str) {
    eprintln!("\x1b[36m  i\x1b[0m {}", message);
}

/// Print a level header
pub fn level_header(index: usize, actions: usize) {
    println!("\x1b[1;34m  Level {}\x1b[0m ({} actions)", index, actions);
}

/// Print an action line within a level
pub fn action_line(id: &str, detail: &str) {
    println!("    \x1b[1m{}\x1b[0m {}", id, detail);
}

/// Print an indented detail line
pub fn detail(label: &str, value: &str) {
    println!("        \x1b[2m{:<14}\x1b[0m {}", label, value);
}

/// Print a header line
pub fn header(message: &str) {
    eprintln!("\x1b[1m==> {}\x1b[0m", message);
}
