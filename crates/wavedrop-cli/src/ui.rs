//! UI utilities for the Wavedrop CLI.

use std::io::Write;

use wavedrop_core::progress::{format_eta, format_size, format_speed, ProgressSnapshot};

const BOX_WIDTH: usize = 37;

/// A formatted box for displaying share tokens.
pub struct TokenBox<'a> {
    token: &'a str,
    expire: Option<&'a str>,
}

impl<'a> TokenBox<'a> {
    /// Create a new token box.
    #[must_use]
    pub const fn new(token: &'a str) -> Self {
        Self {
            token,
            expire: None,
        }
    }

    /// Add expiration time to the box.
    #[must_use]
    pub const fn with_expire(mut self, expire: &'a str) -> Self {
        self.expire = Some(expire);
        self
    }

    /// Display the token box to stdout.
    pub fn display(&self) {
        let token_line = format!("Token:  {}", self.token);

        println!("  ┌{}┐", "─".repeat(BOX_WIDTH));
        println!("  │{}│", " ".repeat(BOX_WIDTH));
        println!("  │{}│", center_in_box(&token_line, BOX_WIDTH));
        println!("  │{}│", " ".repeat(BOX_WIDTH));

        if let Some(expire) = self.expire {
            let expire_line = format!("Expires in {}", expire);
            println!("  │{}│", center_in_box(&expire_line, BOX_WIDTH));
            println!("  │{}│", " ".repeat(BOX_WIDTH));
        }

        println!("  └{}┘", "─".repeat(BOX_WIDTH));
    }
}

fn center_in_box(content: &str, width: usize) -> String {
    let content_len = content.chars().count();
    let padding = width.saturating_sub(content_len);
    let left = padding / 2;
    let right = padding - left;
    format!("{}{}{}", " ".repeat(left), content, " ".repeat(right))
}

/// Render one progress line in place.
pub fn print_progress(snapshot: &ProgressSnapshot) {
    eprint!(
        "\r  {:5.1}%  {} / {}  {}  ETA {}   ",
        snapshot.percentage,
        format_size(snapshot.bytes_transferred),
        format_size(snapshot.total_bytes),
        format_speed(snapshot.speed_bps),
        format_eta(snapshot.eta),
    );
    let _ = std::io::stderr().flush();
}

/// End the progress line.
pub fn finish_progress() {
    eprintln!();
}
