use anyhow::Result;

pub mod darts;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

// A game state for sequential games with n players who take turns in a fixed
// cyclic order until one of them wins.
pub trait GameState {
    fn n_players(&self) -> usize;

    // Index of the player whose turn it is. Once the game is over this stays on
    // the winner.
    fn current_player(&self) -> usize;

    fn is_game_over(&self) -> bool;
}
