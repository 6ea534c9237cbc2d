//! Defines the [`Termination`] trait.

use std::{convert::Infallible, fmt::Debug, process};

/// Extends [`std::process::Termination`] so that [`gui::run`][crate::gui::run] can pick an exit
/// code.
///
/// The GUI event loop owns the main thread and never returns, so the application result has to
/// be inspected and turned into a [`process::exit`] call by hand.
pub trait Termination: process::Termination {
    fn is_success(&self) -> bool;
}

impl Termination for Infallible {
    fn is_success(&self) -> bool {
        match *self {}
    }
}

impl Termination for () {
    fn is_success(&self) -> bool {
        true
    }
}

impl<T: Termination, E: Debug> Termination for Result<T, E> {
    fn is_success(&self) -> bool {
        match self {
            Ok(term) => term.is_success(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results() {
        assert!(().is_success());
        assert!(Ok::<(), &str>(()).is_success());
        assert!(!Err::<(), &str>("camera unplugged").is_success());
        assert!(!Ok::<Result<(), &str>, &str>(Err("nested")).is_success());
    }
}
