//! Asking the user to confirm a destructive operation.

use std::fmt::Write;
use std::io::{BufRead, BufReader, Read};

use crate::core::effects::Effects;

/// Print `question` followed by `[yN]` and read a single line of input from
/// `in_`. Only `y` or `Y` count as confirmation; anything else, including
/// end-of-file or a read error, is a refusal.
///
/// If `skip_confirmation` is set, nothing is printed or read.
pub fn prompt_confirmation(
    effects: &Effects,
    in_: impl Read,
    question: &str,
    skip_confirmation: bool,
) -> eyre::Result<bool> {
    if skip_confirmation {
        return Ok(true);
    }

    write!(effects.get_output_stream(), "{question} [yN] ")?;
    let mut user_input = String::new();
    let mut reader = BufReader::new(in_);
    let confirmed = match reader.read_line(&mut user_input) {
        Ok(_size) => {
            let user_input = user_input.trim();
            user_input == "y" || user_input == "Y"
        }
        Err(_) => false,
    };
    Ok(confirmed)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::core::formatting::Glyphs;

    fn prompt_with_input(input: &str, skip: bool) -> eyre::Result<(bool, String)> {
        let stdout = Arc::new(Mutex::new(Vec::new()));
        let stderr = Arc::new(Mutex::new(Vec::new()));
        let effects = Effects::new_from_buffer_for_test(Glyphs::text(), &stdout, &stderr);
        let confirmed = prompt_confirmation(&effects, input.as_bytes(), "Squash?", skip)?;
        let output = String::from_utf8(stdout.lock().unwrap().clone())?;
        Ok((confirmed, output))
    }

    #[test]
    fn test_prompt_confirmation() -> eyre::Result<()> {
        assert_eq!(prompt_with_input("y\n", false)?, (true, "Squash? [yN] ".to_string()));
        assert!(prompt_with_input(" Y \n", false)?.0);
        assert!(!prompt_with_input("yes\n", false)?.0);
        assert!(!prompt_with_input("", false)?.0);
        assert!(!prompt_with_input("n\n", false)?.0);
        assert_eq!(prompt_with_input("", true)?, (true, String::new()));
        Ok(())
    }
}
