/// Console logger setup
pub mod logger;
