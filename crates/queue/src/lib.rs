pub mod channel;
pub mod consumer;
pub mod error;
pub mod parser;
pub mod sqs;

pub use channel::{ChannelConsumer, ChannelProducer};
pub use consumer::{QueueConsumer, QueueHealth, QueueMessage};
pub use error::{ParseError, QueueError};
pub use parser::{parse_batch, parse_message, parse_user_event};
pub use sqs::SqsConsumer;
