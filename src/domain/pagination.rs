// Page navigation for the display client
use std::fmt;
use std::str::FromStr;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PaginationError {
    #[error("unknown action: {0}")]
    UnknownAction(String),
}

/// Navigation request sent by the display on each poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Refresh,
    NextPage,
    PrevPage,
    FirstPage,
    LastPage,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Refresh => "refresh",
            Action::NextPage => "next_page",
            Action::PrevPage => "prev_page",
            Action::FirstPage => "first_page",
            Action::LastPage => "last_page",
        }
    }
}

impl FromStr for Action {
    type Err = PaginationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "refresh" => Ok(Action::Refresh),
            "next_page" => Ok(Action::NextPage),
            "prev_page" => Ok(Action::PrevPage),
            "first_page" => Ok(Action::FirstPage),
            "last_page" => Ok(Action::LastPage),
            other => Err(PaginationError::UnknownAction(other.to_string())),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compute the page to show after `action`, wrapping around `page_count`.
///
/// `current` may be out of range (a stale client); `refresh` hands it back
/// untouched while the relative moves normalise it first.
pub fn next_page_index(current: i64, action: Action, page_count: usize) -> i64 {
    let count = page_count.max(1) as i64;
    let index = current.rem_euclid(count);
    match action {
        Action::Refresh => current,
        Action::NextPage => (index + 1) % count,
        Action::PrevPage => (index + count - 1) % count,
        Action::FirstPage => 0,
        Action::LastPage => count - 1,
    }
}
