//! Game-over popup state.
//!
//! [`ResultOverlay`] watches the winner field across snapshots and opens once
//! per newly decided result. Later snapshots that repeat the same result do
//! not reopen a dismissed popup. A snapshot that clears the result (a restart)
//! hides it.

use std::fmt;

use crate::protocol::{Player, Symbol, Winner};

/// Visibility of the result popup, keyed on the last observed winner.
#[derive(Debug, Clone, Default)]
pub struct ResultOverlay {
    previous: Winner,
    visible: bool,
}

impl ResultOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the winner of a new snapshot. Returns `true` if this opened the popup.
    pub fn observe(&mut self, winner: Winner) -> bool {
        let previous = std::mem::replace(&mut self.previous, winner);
        if winner.is_decided() && winner != previous {
            self.visible = true;
            return true;
        }
        if !winner.is_decided() && previous.is_decided() {
            self.visible = false;
        }
        false
    }

    /// Close button, backdrop click or Escape.
    pub fn dismiss(&mut self) {
        self.visible = false;
    }

    /// Hide immediately when the host asks for a rematch, before the server
    /// confirms with a cleared snapshot.
    pub fn restart_requested(&mut self) {
        self.visible = false;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }
}

/// A decided result phrased for one viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Pending,
    Won,
    Lost { winner_name: String },
    Draw,
    /// Decided, but the viewer holds no seat.
    Finished { winner_name: String },
}

impl Outcome {
    /// Name shown when the winning seat cannot be resolved to a player.
    pub const FALLBACK_NAME: &'static str = "Player";

    pub fn for_viewer(winner: Winner, players: &[Player], my_symbol: Option<Symbol>) -> Self {
        let symbol = match winner {
            Winner::None => return Self::Pending,
            Winner::Draw => return Self::Draw,
            Winner::Win(symbol) => symbol,
        };
        if my_symbol == Some(symbol) {
            return Self::Won;
        }
        let winner_name = players
            .iter()
            .find(|p| p.symbol == Some(symbol))
            .map_or_else(|| Self::FALLBACK_NAME.to_string(), |p| p.name.clone());
        match my_symbol {
            Some(_) => Self::Lost { winner_name },
            None => Self::Finished { winner_name },
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Game in progress"),
            Self::Won => write!(f, "You won!"),
            Self::Lost { winner_name } => write!(f, "You lost. {winner_name} won."),
            Self::Draw => write!(f, "Draw!"),
            Self::Finished { winner_name } => write!(f, "{winner_name} won."),
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn opens_once_per_decided_result() {
        let mut overlay = ResultOverlay::new();
        assert!(!overlay.observe(Winner::None));
        assert!(!overlay.is_visible());

        assert!(overlay.observe(Winner::Win(Symbol::X)));
        assert!(overlay.is_visible());

        overlay.dismiss();
        assert!(!overlay.observe(Winner::Win(Symbol::X)));
        assert!(!overlay.is_visible());
    }

    #[test]
    fn restart_hides_and_rearms() {
        let mut overlay = ResultOverlay::new();
        overlay.observe(Winner::Draw);
        assert!(overlay.is_visible());

        assert!(!overlay.observe(Winner::None));
        assert!(!overlay.is_visible());

        assert!(overlay.observe(Winner::Draw));
        assert!(overlay.is_visible());
    }

    #[test]
    fn restart_request_hides_optimistically() {
        let mut overlay = ResultOverlay::new();
        overlay.observe(Winner::Win(Symbol::O));
        overlay.restart_requested();
        assert!(!overlay.is_visible());
        // The tracked winner is kept: a repeat of the old result stays hidden.
        assert!(!overlay.observe(Winner::Win(Symbol::O)));
        assert!(!overlay.is_visible());
    }

    #[test]
    fn switching_decided_results_reopens() {
        let mut overlay = ResultOverlay::new();
        overlay.observe(Winner::Win(Symbol::X));
        overlay.dismiss();
        assert!(overlay.observe(Winner::Win(Symbol::O)));
    }

    fn seats() -> Vec<Player> {
        vec![
            Player {
                id: "a".into(),
                name: "Alice".into(),
                symbol: Some(Symbol::X),
            },
            Player {
                id: "b".into(),
                name: "Bob".into(),
                symbol: Some(Symbol::O),
            },
        ]
    }

    #[test]
    fn outcome_per_viewer() {
        let players = seats();
        let x_won = Winner::Win(Symbol::X);

        assert_eq!(
            Outcome::for_viewer(x_won, &players, Some(Symbol::X)),
            Outcome::Won
        );
        assert_eq!(
            Outcome::for_viewer(x_won, &players, Some(Symbol::O)),
            Outcome::Lost {
                winner_name: "Alice".into()
            }
        );
        assert_eq!(
            Outcome::for_viewer(x_won, &players, None),
            Outcome::Finished {
                winner_name: "Alice".into()
            }
        );
        assert_eq!(
            Outcome::for_viewer(Winner::Draw, &players, Some(Symbol::X)),
            Outcome::Draw
        );
        assert_eq!(
            Outcome::for_viewer(Winner::None, &players, Some(Symbol::X)),
            Outcome::Pending
        );
    }

    #[test]
    fn unknown_winner_falls_back_to_generic_name() {
        let outcome = Outcome::for_viewer(Winner::Win(Symbol::O), &[], Some(Symbol::X));
        assert_eq!(
            outcome,
            Outcome::Lost {
                winner_name: Outcome::FALLBACK_NAME.into()
            }
        );
        assert_eq!(outcome.to_string(), "You lost. Player won.");
    }
}
