//! Data models shared by the silver, SCD2 and gold stages

pub mod game;
pub mod rating;

pub use game::{Color, GameResult, GameRow, TimeClass};
pub use rating::{RatingAttributes, RatingSnapshot, RatingVersion};
