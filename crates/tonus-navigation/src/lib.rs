//! Stateless browse navigation for the reading history.
//!
//! Every menu button carries an encoded [`NavAction`]; the full path to a leaf
//! is recoverable from the token alone, so no session state is kept.

pub mod nav_state_machine;
pub mod nav_token;

pub use nav_state_machine::{
    DateScope, LeafRequest, Menu, MenuOption, NavOutcome, NavigationStateMachine, DAYS_PER_ROW,
};
pub use nav_token::{ActionTag, DecodeError, NavAction, MAX_TOKEN_BYTES, TOKEN_DELIMITER};
