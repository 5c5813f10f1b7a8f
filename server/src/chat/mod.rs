pub mod fanout;
pub mod friends;
pub mod typing;
