//! Parse the item selections typed at the prompt, such as `1-3,5`.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SelectionError {
    #[error("Nothing selected")]
    Empty,

    #[error("'{0}' is not a number")]
    NotANumber(String),

    #[error("Range '{0}' runs backwards")]
    Reversed(String),

    #[error("Item {item} is out of range (1-{len})")]
    OutOfRange { item: usize, len: usize },
}

/// Turn `"1-3,5"` into zero-based indices `[0, 1, 2, 4]`, checking every
/// item against `len`. Order is kept and duplicates are allowed.
pub fn parse_selection(predicate: &str, len: usize) -> Result<Vec<usize>, SelectionError> {
    let mut indices = Vec::new();
    for token in predicate.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let (start, end) = match token.split_once('-') {
            Some((a, b)) => (number(a)?, number(b)?),
            None => {
                let n = number(token)?;
                (n, n)
            }
        };
        if end < start {
            return Err(SelectionError::Reversed(token.to_string()));
        }
        for item in start..=end {
            if item == 0 || item > len {
                return Err(SelectionError::OutOfRange { item, len });
            }
            indices.push(item - 1);
        }
    }
    if indices.is_empty() {
        return Err(SelectionError::Empty);
    }
    Ok(indices)
}

fn number(s: &str) -> Result<usize, SelectionError> {
    let s = s.trim();
    s.parse::<usize>()
        .map_err(|_| SelectionError::NotANumber(s.to_string()))
}
