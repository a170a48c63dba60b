pub mod dispatcher;
pub mod engine;
pub mod queue;
pub mod resolver;
pub mod storage;
pub mod validation;
