pub mod dispatcher;
pub mod result;
pub mod settings;
mod worker;
