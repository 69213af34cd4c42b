/// Terminal prompting
///
/// Plain stdin line reads; the decision logic that consumes the answers
/// lives behind the `Confirm` capability so it stays testable.

use std::io::{self, BufRead, Write};

use crate::core::restore::Confirm;

/// Print `prompt` and read one trimmed line from stdin.
pub fn prompt_line(prompt: &str) -> io::Result<String> {
    print!("{} ", prompt);
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Yes/no question, defaulting to no. Re-asks on anything else.
pub fn prompt_yes_no(prompt: &str) -> bool {
    loop {
        let answer = match prompt_line(&format!("{} [y/N]", prompt)) {
            Ok(answer) => answer.to_lowercase(),
            Err(_) => return false,
        };
        match answer.as_str() {
            "y" | "yes" => return true,
            "n" | "no" | "" => return false,
            _ => println!("Please answer 'y' or 'n'."),
        }
    }
}

/// Parse a selection like `2`, `1,3` or `all` against a list of `len`
/// numbered items (1-based). Returns 0-based indices, or `None` when any
/// part of the input is not a valid choice.
pub fn parse_selection(input: &str, len: usize) -> Option<Vec<usize>> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if input.eq_ignore_ascii_case("all") {
        return Some((0..len).collect());
    }

    let mut indices = Vec::new();
    for part in input.split(',') {
        let number: usize = part.trim().parse().ok()?;
        if number < 1 || number > len {
            return None;
        }
        let index = number - 1;
        if !indices.contains(&index) {
            indices.push(index);
        }
    }
    Some(indices)
}

/// Stdin-backed confirmation provider for destructive restore steps.
pub struct TermConfirm;

impl Confirm for TermConfirm {
    fn confirm(&mut self, prompt: &str) -> bool {
        prompt_yes_no(prompt)
    }
}
