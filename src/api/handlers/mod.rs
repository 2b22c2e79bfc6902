pub mod chat;
pub mod chat_stream;
pub mod cross_chain;
