mod license;
mod webhook_event;

pub use license::*;
pub use webhook_event::*;
