//! Interactive confirmation.

use std::io::{self, BufRead, Write};

/// Ask a yes/no question on stdout and read the answer from stdin.
///
/// Returns `default` on an empty answer; with no default, asks again.
pub fn confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    confirm_with(&mut stdin.lock(), &mut stdout.lock(), prompt, default)
}

/// [`confirm`] over arbitrary streams. End of input counts as "no".
pub fn confirm_with<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    prompt: &str,
    default: Option<bool>,
) -> io::Result<bool> {
    let hint = match default {
        Some(true) => "(Y/n)",
        Some(false) | None => "(y/N)",
    };
    let mut line = String::new();

    loop {
        write!(output, "{prompt} {hint}: ")?;
        output.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Ok(false);
        }

        match line.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            "" => {
                if let Some(answer) = default {
                    return Ok(answer);
                }
            }
            _ => {}
        }
    }
}
