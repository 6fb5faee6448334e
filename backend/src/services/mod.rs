//! Services module
//!
//! Business logic services that coordinate between commands and repository.

pub mod images;
pub mod notes;
pub mod reviews;
pub mod tags;

pub use images::ImagesService;
pub use notes::{NoteOperation, NotesService};
pub use reviews::ReviewScheduler;
pub use tags::TagsService;
