// opstool/src/utils/log.rs
use std::env;
use std::sync::OnceLock;

use colored::Colorize;
use regex::{Captures, Regex};

fn bracket_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[([^\]]*)\]").expect("bracket pattern is a valid regex"))
}

/// Applies console styling to the marker conventions used in progress
/// messages: `--->` arrows render blue and bold, `[bracketed]` segments get
/// blue brackets around magenta content. Styling resets after each segment,
/// so the surrounding text keeps the terminal default.
pub fn colorize(msg: &str) -> String {
    let msg = bracket_pattern().replace_all(msg, |caps: &Captures| {
        format!(
            "{}{}{}",
            "[".blue().bold(),
            caps[1].magenta(),
            "]".blue().bold()
        )
    });
    msg.replace("--->", &format!("{}", "--->".blue().bold()))
}

pub fn info(msg: &str) {
    println!("{}", colorize(msg));
}

/// Chatty diagnostics, printed only when DEBUG is set in the environment.
pub fn debug(msg: &str) {
    if env::var("DEBUG").is_ok() {
        println!("{}", colorize(msg));
    }
}

pub fn error(msg: &str) {
    eprintln!("{}", msg.red());
}
