//! Interactive resource selection with a bounded number of attempts.

use super::{open_session, Session};
use crate::error::{Result, ScopeError};
use std::io::{BufRead, Write};
use std::time::Duration;

/// Ask the user to pick one of `candidates`.
///
/// A single candidate is chosen without prompting. Entries are numbered from 1.
/// Invalid input re-prompts until `max_attempts` answers have been rejected, then
/// fails with `SelectionExhausted`. End of input counts as exhausting the attempts.
pub fn select_resource<R: BufRead, W: Write>(
    candidates: &[String],
    mut input: R,
    mut output: W,
    max_attempts: u32,
) -> Result<String> {
    match candidates {
        [] => {
            return Err(ScopeError::ResourceUnavailable {
                resource: String::new(),
                reason: "no candidate resources to select from".into(),
            })
        }
        [only] => return Ok(only.clone()),
        _ => {}
    }

    for attempt in 1..=max_attempts {
        writeln!(output, "Select a resource from the following list:")?;
        for (idx, resource) in candidates.iter().enumerate() {
            writeln!(output, "{}: {}", idx + 1, resource)?;
        }
        write!(output, "\nType the number of the resource desired: ")?;
        output.flush()?;

        let mut answer = String::new();
        if input.read_line(&mut answer)? == 0 {
            return Err(ScopeError::SelectionExhausted { attempts: attempt });
        }

        match answer.trim().parse::<usize>() {
            Ok(n) if (1..=candidates.len()).contains(&n) => return Ok(candidates[n - 1].clone()),
            _ => {
                tracing::warn!(attempt, answer = answer.trim(), "not a selectable resource");
                writeln!(output, "'{}' is not a selectable resource.", answer.trim())?;
            }
        }
    }

    Err(ScopeError::SelectionExhausted {
        attempts: max_attempts,
    })
}

/// Open `preferred` if given, falling back to interactive selection among
/// `candidates` when it is missing or unavailable.
pub fn open_with_fallback<R: BufRead, W: Write>(
    preferred: Option<&str>,
    candidates: &[String],
    timeout: Duration,
    input: R,
    output: W,
    max_attempts: u32,
) -> Result<Box<dyn Session>> {
    if let Some(resource) = preferred {
        match open_session(resource, timeout) {
            Ok(session) => return Ok(session),
            Err(e @ ScopeError::ResourceUnavailable { .. }) => {
                tracing::warn!(resource, "Resource identifier is unusable: {}", e);
            }
            Err(e) => return Err(e),
        }
    }

    let selected = select_resource(candidates, input, output, max_attempts)?;
    open_session(&selected, timeout)
}
