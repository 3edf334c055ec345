// Schedule module - THE PLAYBACK CALENDAR
// Queued schedule entries, overlap detection and the text exchange format

mod entry;
mod format;
mod store;

pub use entry::{ScheduleEntry, ScheduleError, TimeOfDay};
pub use format::{parse_line, ImportLineError, ImportLineReason, ImportReport, EXPORT_TITLE};
pub use store::ScheduleStore;
