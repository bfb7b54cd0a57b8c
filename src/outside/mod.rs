mod airtable;
mod browser;
mod drive;

pub use airtable::{Airtable, RecordFields, RecordId, RecordStore};
pub use browser::{Browser, Element, Lookup, WebDriver, WindowHandle};
pub use drive::{Drive, FileHost};
