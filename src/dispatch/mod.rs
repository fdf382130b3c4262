//! Classification and dispatch of provider events.

mod dispatcher;
mod formatter;

pub use dispatcher::{DispatchError, EventDispatcher};
pub use formatter::{CanonicalFormatter, FormatError, FormatRequest, Formatter};
