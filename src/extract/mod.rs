//! Turning raw upstream documents into outcome rows and a meeting date.

pub mod meeting_date;
pub mod outcomes;
pub mod rules;
pub mod text;

pub use meeting_date::{DateOrigin, MeetingDate, MeetingDateExtractor};
pub use outcomes::{OutcomeExtraction, OutcomeExtractor};
