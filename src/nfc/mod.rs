pub mod card_trait;
pub mod host;
pub mod ndef;
pub mod reader;
pub mod session;
pub mod type2;

pub use card_trait::NfcCard;
pub use host::{HostError, InvalidationReason, NdefStatus, SessionEvent, SessionHost, SessionMode, StatusSink, TagStatus};
pub use ndef::{NdefError, NdefMessage, NdefRecord};
pub use reader::{run_session, CardHost, TagHandle, TagReader};
pub use session::{SessionOperation, SessionOutcome, SessionState, TagSession};
pub use type2::Type2Tag;

#[cfg(feature = "pcsc")]
pub use reader::PcscReader;
