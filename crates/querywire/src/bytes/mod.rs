//! The shared byte region and the cursor the codec reads and writes through.

mod cursor;
mod stop_char;
mod store;

pub use cursor::Bytes;
pub use stop_char::StopCharTester;
pub use store::BytesStore;
