//! Input handling for the command-line picker and one-shot lookups.

use crate::location::{SessionView, Step};

/// One line of picker input, decoded against the candidates on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickCommand {
    Quit,
    Back,
    Retry,
    Search(String),
    Select(String),
    /// Blank line: redraw.
    Nothing,
}

/// `q` quits, `..` goes back, `r` retries, `/text` searches (a bare `/`
/// clears the search), a 1-based number picks from `candidates`, anything
/// else is taken as a name.
pub fn parse_input(line: &str, candidates: &[String]) -> PickCommand {
    let input = line.trim();
    match input {
        "" => PickCommand::Nothing,
        "q" => PickCommand::Quit,
        ".." => PickCommand::Back,
        "r" => PickCommand::Retry,
        _ => {
            if let Some(query) = input.strip_prefix('/') {
                return PickCommand::Search(query.trim().to_string());
            }
            match input.parse::<usize>() {
                Ok(n) if (1..=candidates.len()).contains(&n) => PickCommand::Select(candidates[n - 1].clone()),
                _ => PickCommand::Select(input.to_string()),
            }
        }
    }
}

/// Why a one-shot lookup produced no usable list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupFailure {
    /// A fetch failed and nothing could be shown.
    Unavailable(String),
    /// A country or province argument matched nothing; the session stopped here.
    NoMatch(Step),
}

/// Decide whether a session opened from command-line hints reached `target`
/// with something to show.
pub fn check_lookup(view: &SessionView, target: Step) -> Result<(), LookupFailure> {
    if view.total_candidates == 0 {
        if let Some(err) = &view.last_error {
            return Err(LookupFailure::Unavailable(err.clone()));
        }
    }
    if view.step != target {
        return Err(LookupFailure::NoMatch(view.step));
    }
    Ok(())
}
