pub mod complaint;
pub mod contact;
pub mod outbound_message;
pub mod recipient;
pub mod reply;
pub mod roll_call;
pub mod unmatched;

// Re-export core models for easy access
pub use complaint::ComplaintRecord;
pub use contact::{Channel, Contact, NewContact};
pub use outbound_message::{NewOutboundMessage, OutboundMessage};
pub use recipient::{Recipient, ResponseStatus};
pub use reply::{NewReply, Reply};
pub use roll_call::{NewRollCall, RollCall, RollCallStatus};
pub use unmatched::{NewUnmatchedInbound, UnmatchedInbound};
