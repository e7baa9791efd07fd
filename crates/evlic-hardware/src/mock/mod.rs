//! Mock reader and cards for testing and development.
//!
//! The mock speaks the same pseudo-APDUs as an ACR122U, so sessions, the
//! poller, and the bridge run unchanged on top of it without hardware.

pub mod card;
pub mod reader;

pub use card::MockCard;
pub use reader::{MOCK_FIRMWARE, MOCK_FRONT_END, MockReader, MockReaderHandle};
