//! Terminal styling for `reposync` output.

use console::{style, Style};

/// Outcome marker printed in front of a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    Ok,
    Warn,
    Fail,
}

impl Mark {
    fn glyph(self) -> console::StyledObject<&'static str> {
        match self {
            Mark::Ok => style("✓").green(),
            Mark::Warn => style("⚠").yellow(),
            Mark::Fail => style("✗").red(),
        }
    }
}

/// `<glyph> <msg>`
pub fn status(mark: Mark, msg: &str) -> String {
    format!("{} {msg}", mark.glyph())
}

/// `<glyph> <repo>: <msg>`, with the repository name in bold.
pub fn repo_line(mark: Mark, repo: &str, msg: &str) -> String {
    format!("{} {}: {msg}", mark.glyph(), style(repo).bold())
}

pub fn heading(msg: &str) -> String {
    Style::new().bold().apply_to(msg).to_string()
}

pub fn note(msg: &str) -> String {
    Style::new().dim().apply_to(msg).to_string()
}
